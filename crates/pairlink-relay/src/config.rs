//! Command line and environment configuration for the relay binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pairlink_common::Error;
use tracing::{info, warn};

use crate::signal::{TransportLimits, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_OUTBOX_CAPACITY};
use crate::validator::{HttpTokenValidator, StaticTokenValidator, TokenValidator};

#[derive(Parser, Debug, Clone)]
#[command(name = "pairlink-relay")]
#[command(about = "Pairlink signaling relay", version)]
pub struct RelayConfig {
    /// Address to listen on
    #[arg(long, env = "PAIRLINK_BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Allow binding a non-loopback address
    #[arg(long, env = "PAIRLINK_ALLOW_PUBLIC_BIND")]
    pub allow_public_bind: bool,

    /// Token validation endpoint (POST {"token": ..})
    #[arg(long, env = "PAIRLINK_VALIDATOR_URL")]
    pub validator_url: Option<String>,

    /// JSON file mapping tokens to claims (development only)
    #[arg(long, env = "PAIRLINK_STATIC_TOKENS")]
    pub static_tokens: Option<PathBuf>,

    /// Largest accepted WebSocket message, in bytes
    #[arg(long, env = "PAIRLINK_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Frames queued per connection before sends start failing
    #[arg(long, env = "PAIRLINK_OUTBOX_CAPACITY", default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    #[arg(long, env = "PAIRLINK_VALIDATOR_TIMEOUT_SECS", default_value_t = 10)]
    pub validator_timeout_secs: u64,
}

impl RelayConfig {
    pub fn limits(&self) -> TransportLimits {
        TransportLimits {
            max_message_bytes: self.max_message_bytes,
            outbox_capacity: self.outbox_capacity,
        }
    }

    /// Refuse a non-loopback bind unless explicitly allowed.
    pub fn check_bind(&self) -> Result<(), Error> {
        if self.bind.ip().is_loopback() || self.allow_public_bind {
            return Ok(());
        }
        Err(Error::config(format!(
            "refusing non-loopback bind {} without PAIRLINK_ALLOW_PUBLIC_BIND=1",
            self.bind
        )))
    }

    /// Build the configured validator. Exactly one source must be set.
    pub fn build_validator(&self) -> Result<Arc<dyn TokenValidator>, Error> {
        match (&self.validator_url, &self.static_tokens) {
            (Some(url), None) => {
                let timeout = Duration::from_secs(self.validator_timeout_secs);
                let validator = HttpTokenValidator::new(url.clone(), timeout)?;
                info!("validating tokens against {}", validator.url());
                Ok(Arc::new(validator))
            }
            (None, Some(path)) => {
                let validator = StaticTokenValidator::from_file(path)?;
                warn!(
                    "using {} static tokens from {} (development only)",
                    validator.len(),
                    path.display()
                );
                Ok(Arc::new(validator))
            }
            (Some(_), Some(_)) => Err(Error::config(
                "set only one of --validator-url and --static-tokens",
            )),
            (None, None) => Err(Error::config(
                "no token validator configured; set --validator-url or --static-tokens",
            )),
        }
    }
}
