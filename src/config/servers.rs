use secrecy::SecretString;
use serde::Deserialize;
use std::{collections::HashSet, path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

// -----------------------------------------------------------------------------
// ----- ServerRecord ----------------------------------------------------------

/// One game server the relay moderates. Each record gets its own poller.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub rcon_password: SecretString,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub kick_threshold: u32,
}

/// Fallbacks for fields a `[[servers]]` entry leaves out.
#[derive(Debug, Clone, Copy)]
pub struct ServerDefaults {
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub kick_threshold: u32,
}

// -----------------------------------------------------------------------------
// ----- ServersFile: Public ---------------------------------------------------

pub async fn load_servers_file(
    path: &Path,
    defaults: ServerDefaults,
) -> Result<Vec<ServerRecord>, ServersError> {
    let raw = fs::read_to_string(path).await.map_err(|e| ServersError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_servers(&raw, defaults)
}

pub fn parse_servers(raw: &str, defaults: ServerDefaults) -> Result<Vec<ServerRecord>, ServersError> {
    let doc: ServersFile = toml::from_str(raw).map_err(|e| ServersError::Toml { source: e })?;

    let mut seen = HashSet::with_capacity(doc.servers.len());
    let mut records = Vec::with_capacity(doc.servers.len());

    for entry in doc.servers {
        validate(&entry)?;

        if !seen.insert(entry.name.clone()) {
            return Err(ServersError::DuplicateServer { name: entry.name });
        }

        records.push(ServerRecord {
            name: entry.name,
            host: entry.host,
            port: entry.port,
            rcon_password: SecretString::new(entry.rcon_password.into_boxed_str()),
            poll_interval: entry.poll_interval.unwrap_or(defaults.poll_interval),
            response_timeout: entry.response_timeout.unwrap_or(defaults.response_timeout),
            kick_threshold: entry.kick_threshold.unwrap_or(defaults.kick_threshold),
        });
    }

    Ok(records)
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ServersFile {
    #[serde(default)]
    servers: Vec<ServersFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServersFileEntry {
    name: String,
    host: String,
    port: u16,

    #[serde(alias = "rcon_pass")]
    rcon_password: String,

    #[serde(default, deserialize_with = "de_ms")]
    poll_interval: Option<Duration>,

    #[serde(default, deserialize_with = "de_ms")]
    response_timeout: Option<Duration>,

    #[serde(default)]
    kick_threshold: Option<u32>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(entry: &ServersFileEntry) -> Result<(), ServersError> {
    if entry.name.trim().is_empty() {
        return Err(ServersError::InvalidField("name".into()));
    }
    if entry.host.trim().is_empty() {
        return Err(ServersError::InvalidField("host".into()));
    }
    if entry.port == 0 {
        return Err(ServersError::InvalidField("port".into()));
    }
    if entry.rcon_password.is_empty() {
        return Err(ServersError::InvalidField("rcon_password".into()));
    }
    if entry.kick_threshold == Some(0) {
        return Err(ServersError::InvalidField("kick_threshold".into()));
    }
    if entry.poll_interval == Some(Duration::ZERO) {
        return Err(ServersError::InvalidField("poll_interval".into()));
    }
    Ok(())
}

fn de_ms<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Unexpected, Visitor};
    use std::fmt;

    struct MsVisitor;

    impl<'de> Visitor<'de> for MsVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("integer milliseconds (e.g., 5000) or a duration string (e.g., \"5s\")")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_millis(v)))
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
            if v < 0 {
                return Err(E::invalid_value(Unexpected::Signed(v), &self));
            }
            Ok(Some(Duration::from_millis(v as u64)))
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(MsVisitor)
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServersError {
    #[error("duplicate [[servers]] entry for server '{name}'")]
    DuplicateServer { name: String },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
