use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which side of a pairing a connection speaks for.
///
/// A pairing identifier admits exactly one connection per role at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The counterpart role within the same pairing.
    pub fn opposite(self) -> Self {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiator" => Ok(Role::Initiator),
            "responder" => Ok(Role::Responder),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Client request to authenticate a connection: `{"type":"auth","token":..,"nonce":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    /// Opaque bearer token handed to the token validator.
    pub token: String,
    /// Session nonce forwarded to the counterpart once both sides are present.
    pub nonce: String,
}

/// Claims returned by a token validator for an accepted token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedToken {
    pub pairing_id: String,
    pub role: Role,
    /// Expiry as Unix seconds. Carried through, never enforced by the relay.
    pub expiry: u64,
}

/// Frames the relay itself originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Both roles are present; carries the counterpart's session nonce.
    PeerConnect { nonce: String },

    /// The counterpart left the pairing.
    PeerDisconnect,

    /// Sent by the transport adapter right before a forced close.
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
