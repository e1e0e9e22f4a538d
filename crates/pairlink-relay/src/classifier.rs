//! Classification of inbound text frames.
//!
//! A frame is either an `auth` request, a recognised content frame that the
//! relay forwards untouched, or rejected.

use pairlink_common::{AuthMessage, ClassificationError};
use serde_json::Value;

/// `type` value of the authentication request.
pub const AUTH_TYPE: &str = "auth";

/// Content frame types relayed between paired peers. `content` is the generic
/// kind; the others name session-setup traffic.
pub const CONTENT_TYPES: [&str; 5] = ["content", "offer", "answer", "candidate", "message"];

/// Result of classifying one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Auth(AuthMessage),
    Content { message_type: String, raw: String },
}

/// Receiver for classified frames.
pub trait MessageHandler {
    type Output;

    fn handle_auth_message(&mut self, auth: AuthMessage) -> Self::Output;
    fn handle_content_message(&mut self, raw: String) -> Self::Output;
}

/// Classify a raw text frame.
pub fn classify(raw: &str) -> Result<Classified, ClassificationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ClassificationError::InvalidJson(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ClassificationError::InvalidJson(
            "expected a JSON object".into(),
        ));
    };

    let message_type = match fields.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(other) => return Err(ClassificationError::UnknownType(other.to_string())),
        None => return Err(ClassificationError::UnknownType("<missing>".into())),
    };

    if message_type == AUTH_TYPE {
        let token = fields.get("token").and_then(Value::as_str);
        let nonce = fields.get("nonce").and_then(Value::as_str);
        return match (token, nonce) {
            (Some(token), Some(nonce)) => Ok(Classified::Auth(AuthMessage {
                token: token.to_string(),
                nonce: nonce.to_string(),
            })),
            _ => Err(ClassificationError::InvalidAuthMessage),
        };
    }

    if CONTENT_TYPES.contains(&message_type) {
        return Ok(Classified::Content {
            message_type: message_type.to_string(),
            raw: raw.to_string(),
        });
    }

    Err(ClassificationError::UnknownType(message_type.to_string()))
}

/// Classify `raw` and hand it to the matching handler method.
pub fn dispatch<H: MessageHandler>(
    raw: &str,
    handler: &mut H,
) -> Result<H::Output, ClassificationError> {
    Ok(match classify(raw)? {
        Classified::Auth(auth) => handler.handle_auth_message(auth),
        Classified::Content { raw, .. } => handler.handle_content_message(raw),
    })
}
