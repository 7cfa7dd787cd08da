use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use thiserror::Error;
use url::Url;

// -----------------------------------------------------------------------------
// ----- BridgeTarget ----------------------------------------------------------

/// The UDP endpoint one bridge talks to. The host may be a name; it is only
/// resolved when the first datagram goes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTarget {
    pub host: String,
    pub port: u16,
}

impl BridgeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Wildcard local address of the same family as the target.
    pub fn local_bind_addr(&self) -> SocketAddr {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        }
    }
}

impl fmt::Display for BridgeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TargetPolicy ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPolicy {
    Fixed(BridgeTarget),
    Query,
}

impl TargetPolicy {
    /// `request_uri` is the origin-form target of the upgrade request
    /// (`/path?query`).
    pub fn resolve(&self, request_uri: &str) -> Result<BridgeTarget, ConnectionSetupError> {
        match self {
            TargetPolicy::Fixed(target) => Ok(target.clone()),
            TargetPolicy::Query => target_from_query(request_uri),
        }
    }
}

pub fn target_from_query(request_uri: &str) -> Result<BridgeTarget, ConnectionSetupError> {
    let base = Url::parse("ws://relay.invalid/").map_err(|_| ConnectionSetupError::BadUrl)?;
    let url = base
        .join(request_uri)
        .map_err(|_| ConnectionSetupError::BadUrl)?;

    let mut host = None;
    let mut port = None;

    // First occurrence wins.
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "host" if host.is_none() => host = Some(value.into_owned()),
            "port" if port.is_none() => port = Some(value.into_owned()),
            _ => {}
        }
    }

    let host = host
        .map(|h| h.trim().trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|h| !h.is_empty())
        .ok_or(ConnectionSetupError::MissingTarget)?;

    let raw_port = port.ok_or(ConnectionSetupError::MissingTarget)?;
    let port = match raw_port.trim().parse::<u16>() {
        Ok(p) if p != 0 => p,
        _ => return Err(ConnectionSetupError::InvalidPort(raw_port)),
    };

    Ok(BridgeTarget { host, port })
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionSetupError {
    #[error("bad request url")]
    BadUrl,

    #[error("missing host/port query parameters")]
    MissingTarget,

    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

impl ConnectionSetupError {
    /// Text for the close frame. Kept short; close reasons are capped at 123
    /// bytes.
    pub fn close_reason(&self) -> &'static str {
        match self {
            ConnectionSetupError::BadUrl => "bad url",
            ConnectionSetupError::MissingTarget | ConnectionSetupError::InvalidPort(_) => {
                "missing host/port"
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
