//! Legacy connectionless ("out-of-band") packets.
//!
//! Every packet starts with four `0xFF` bytes followed by ASCII text. The relay
//! only speaks the handful of commands it needs for moderation.

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use secrecy::{ExposeSecret, SecretString};

pub use status::{PlayerRecord, RosterEntry, StatusResponse, parse_roster};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const OOB_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

// -----------------------------------------------------------------------------
// ----- OobCommand ------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum OobCommand {
    /// `getstatus [challenge]`
    GetStatus { challenge: Option<String> },

    /// `rcon <password> <command>`
    Rcon {
        password: SecretString,
        command: String,
    },
}

impl OobCommand {
    pub fn get_status(challenge: impl Into<String>) -> Self {
        OobCommand::GetStatus {
            challenge: Some(challenge.into()),
        }
    }

    pub fn rcon(password: SecretString, command: impl Into<String>) -> Self {
        OobCommand::Rcon {
            password,
            command: command.into(),
        }
    }

    /// Short name for logs. Never includes the rcon password.
    pub fn label(&self) -> &str {
        match self {
            OobCommand::GetStatus { .. } => "getstatus",
            OobCommand::Rcon { command, .. } => command,
        }
    }

    /// Build the full datagram, marker included.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            OobCommand::GetStatus { challenge: None } => encode_oob("getstatus"),
            OobCommand::GetStatus {
                challenge: Some(challenge),
            } => encode_oob(&format!("getstatus {challenge}")),
            OobCommand::Rcon { password, command } => {
                encode_oob(&format!("rcon {} {command}", password.expose_secret()))
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Codec -----------------------------------------------------------------

pub fn encode_oob(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(OOB_MARKER.len() + text.len());
    buf.put_slice(&OOB_MARKER);
    buf.put_slice(text.as_bytes());
    buf.freeze()
}

/// Decode a reply datagram to text. The marker is stripped when present; any
/// invalid UTF-8 is replaced rather than rejected.
pub fn decode_oob(datagram: &[u8]) -> String {
    let payload = datagram.strip_prefix(&OOB_MARKER[..]).unwrap_or(datagram);
    String::from_utf8_lossy(payload).into_owned()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
