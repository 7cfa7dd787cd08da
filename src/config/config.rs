use once_cell::sync::OnceCell;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

use super::{
    cli::CliConfig,
    servers::{ServerDefaults, ServerRecord, ServersError, load_servers_file},
    types::{LogLevel, TargetMode},
};
use crate::listener::{BridgeTarget, TargetPolicy};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceCell<Config> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub target_policy: TargetPolicy,
    pub moderated_servers: Vec<ServerRecord>,
    pub heartbeat: Option<HeartbeatSettings>,
    pub tls: Option<TlsSettings>,
}

#[derive(Clone, Debug)]
pub struct HeartbeatSettings {
    pub master_url: Url,
    pub interval: Duration,
    pub proxy_port: u16,
    pub target: Option<BridgeTarget>,
}

#[derive(Clone, Debug)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the servers file is read with non-blocking IO.
    pub async fn init() -> Result<(), ConfigError> {
        let next = Self::from_cli(CliConfig::from_env()).await?;

        ROOT_CONFIG
            .set(next)
            .map_err(|_| ConfigError::AlreadyInitialized)
    }

    pub fn snapshot() -> Config {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    async fn from_cli(cli: CliConfig) -> Result<Config, ConfigError> {
        let game_target = BridgeTarget::new(cli.game_host.clone(), cli.game_port);

        let target_policy = match cli.target_mode {
            TargetMode::Fixed => TargetPolicy::Fixed(game_target.clone()),
            TargetMode::Query => TargetPolicy::Query,
        };

        let defaults = ServerDefaults {
            poll_interval: cli.poll_interval,
            response_timeout: cli.response_timeout,
            kick_threshold: cli.kick_threshold,
        };

        let mut moderated_servers = Vec::new();

        if let Some(password) = cli.rcon_password.clone() {
            moderated_servers.push(ServerRecord {
                name: "default".to_string(),
                host: cli.game_host.clone(),
                port: cli.game_port,
                rcon_password: password,
                poll_interval: defaults.poll_interval,
                response_timeout: defaults.response_timeout,
                kick_threshold: defaults.kick_threshold,
            });
        }

        if let Some(path) = cli.servers_file_location.as_deref() {
            for record in load_servers_file(path, defaults).await? {
                if moderated_servers.iter().any(|s| s.name == record.name) {
                    return Err(ServersError::DuplicateServer { name: record.name }.into());
                }
                moderated_servers.push(record);
            }
        }

        let heartbeat = cli.master_url.clone().map(|master_url| HeartbeatSettings {
            master_url,
            interval: cli.heartbeat_interval,
            proxy_port: cli.listen_addr.port(),
            target: match cli.target_mode {
                TargetMode::Fixed => Some(game_target.clone()),
                TargetMode::Query => None,
            },
        });

        let tls = match (cli.tls_cert_location, cli.tls_key_location) {
            (None, None) => None,
            (Some(cert_path), Some(key_path)) => Some(TlsSettings {
                cert_path,
                key_path,
            }),
            (Some(_), None) => return Err(ConfigError::IncompleteTls("--tls-key / RELAY_TLS_KEY")),
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteTls("--tls-cert / RELAY_TLS_CERT"));
            }
        };

        Ok(Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            target_policy,
            moderated_servers,
            heartbeat,
            tls,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config already initialized")]
    AlreadyInitialized,

    #[error("tls needs both a certificate and a key; missing {0}")]
    IncompleteTls(&'static str),

    #[error(transparent)]
    Servers(#[from] ServersError),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let mut full = vec!["q3relay"];
        full.extend_from_slice(args);
        Config::from_cli(CliConfig::from_iter(full).unwrap()).await
    }

    #[tokio::test]
    async fn no_password_means_no_pollers() {
        let cfg = build(&[]).await.unwrap();
        assert!(cfg.moderated_servers.is_empty());
        assert!(cfg.heartbeat.is_none());
        assert!(cfg.tls.is_none());
        assert_eq!(
            cfg.target_policy,
            TargetPolicy::Fixed(BridgeTarget::new("127.0.0.1", 27960))
        );
    }

    #[tokio::test]
    async fn password_enables_default_poller() {
        let cfg = build(&["--rcon-pass", "pw", "--q3-host", "game.local"]).await.unwrap();
        assert_eq!(cfg.moderated_servers.len(), 1);
        assert_eq!(cfg.moderated_servers[0].name, "default");
        assert_eq!(cfg.moderated_servers[0].host, "game.local");
    }

    #[tokio::test]
    async fn servers_file_adds_pollers() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
            [[servers]]
            name = "ctf"
            host = "10.0.0.7"
            port = 27962
            rcon_password = "pw2"
            "#,
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cfg = build(&["--rcon-pass", "pw", "--servers", path.as_str()]).await.unwrap();
        let names: Vec<_> = cfg.moderated_servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["default", "ctf"]);
    }

    #[tokio::test]
    async fn query_mode_heartbeat_has_no_target() {
        let cfg = build(&[
            "--target-mode",
            "query",
            "--master-url",
            "https://master.example.org",
        ])
        .await
        .unwrap();

        assert_eq!(cfg.target_policy, TargetPolicy::Query);
        let hb = cfg.heartbeat.unwrap();
        assert_eq!(hb.proxy_port, 27961);
        assert!(hb.target.is_none());
    }

    #[tokio::test]
    async fn half_configured_tls_is_rejected() {
        let err = build(&["--tls-cert", "/tmp/cert.pem"]).await.unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteTls(_)));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
