//! Token validation backends.
//!
//! The relay never interprets bearer tokens itself. A validator turns a token
//! into the pairing it grants access to, or refuses it.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use pairlink_common::{Error, ValidatedToken, ValidationError};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

/// Resolves an opaque token to `{pairingId, role, expiry}`.
///
/// Calls may suspend (network or database round trip). The relay does not
/// hold any of its own locks while a call is pending.
pub trait TokenValidator: Send + Sync {
    fn validate<'a>(&'a self, token: &'a str)
        -> BoxFuture<'a, Result<ValidatedToken, ValidationError>>;
}

/// Validator backed by a fixed token table. Intended for development and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, ValidatedToken>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, claims: ValidatedToken) -> Self {
        self.insert(token, claims);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, claims: ValidatedToken) {
        self.tokens.insert(token.into(), claims);
    }

    /// Load a JSON object mapping token strings to claims.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let tokens: HashMap<String, ValidatedToken> = serde_json::from_str(&contents)
            .map_err(|e| Error::config(format!("invalid token file {}: {e}", path.display())))?;
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ValidatedToken, ValidationError>> {
        Box::pin(async move {
            self.tokens
                .get(token)
                .cloned()
                .ok_or_else(|| ValidationError::Rejected("unknown token".into()))
        })
    }
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

/// Validator that asks a remote backend: `POST {url}` with `{"token": ..}`.
///
/// A 2xx response must carry `{pairingId, role, expiry}`. 401/403/404 mean
/// the token was refused; anything else is treated as the backend being
/// unavailable.
#[derive(Debug, Clone)]
pub struct HttpTokenValidator {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenValidator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, token: &str) -> Result<ValidatedToken, ValidationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ValidateRequest { token })
            .send()
            .await
            .map_err(|e| {
                warn!("token validator request failed: {}", e);
                ValidationError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!("token validator refused token: {}", status);
                return Err(ValidationError::Rejected(status.to_string()));
            }
            _ => {
                warn!("token validator returned {}", status);
                return Err(ValidationError::Unavailable(status.to_string()));
            }
        }

        response
            .json::<ValidatedToken>()
            .await
            .map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

impl TokenValidator for HttpTokenValidator {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<ValidatedToken, ValidationError>> {
        Box::pin(self.request(token))
    }
}
