//! Protocol Types
//!
//! Shapes exchanged with the connection layer, shared by the relay server and
//! bridge implementations.

mod contact;
mod message;

pub use contact::*;
pub use message::*;

use serde::{Deserialize, Serialize};

/// Status reason reported while no close has been observed.
pub const STATUS_OK: u16 = 200;

/// Close reason of an authenticated logout (terminal).
pub const STATUS_LOGGED_OUT: u16 = 401;

/// Close reason used when the transport drops underneath the session.
pub const STATUS_CONNECTION_CLOSED: u16 = 428;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    #[default]
    Close,
}

impl ConnectionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw connection update as emitted by the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,
    /// Pairing challenge, present while the session awaits a scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    /// Numeric reason attached to a close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Account the connection authenticated as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedUser {
    /// Raw id, possibly carrying a device suffix.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
