//! Error taxonomy for the relay side of Pairlink.

use thiserror::Error;

use crate::protocol::Role;

/// Result type alias using Pairlink's relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for relay operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A single inbound frame could not be classified.
    #[error("classification error: {0}")]
    Classification(#[from] ClassificationError),

    /// A connection broke the pairing protocol and was disconnected.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The token validator refused or could not check a token.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Whether the offending connection has been (or must be) disconnected.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Rejections from the message classifier. Aborts the one message only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Invalid auth message")]
    InvalidAuthMessage,
}

/// Pairing protocol violations. Fatal to the offending connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Connection reference already exists")]
    AlreadyRegistered,

    #[error("Role already connected: {role} for pairing {pairing_id}")]
    RoleAlreadyConnected { pairing_id: String, role: Role },

    #[error("Received message from unknown connection")]
    UnknownConnection,

    #[error("Received message without being authed")]
    NotAuthenticated,

    #[error("Connection already authed")]
    AlreadyAuthenticated,

    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// Token validator failures. The connection stays unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("validator unavailable: {0}")]
    Unavailable(String),

    #[error("malformed validator response: {0}")]
    Malformed(String),
}
