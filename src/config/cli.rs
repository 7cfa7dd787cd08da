use clap::Parser;
use secrecy::SecretString;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};
use url::Url;

use super::types::{LogLevel, TargetMode, parse_duration, parse_interval};

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub target_mode: TargetMode,
    pub game_host: String,
    pub game_port: u16,
    pub rcon_password: Option<SecretString>,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub kick_threshold: u32,
    pub servers_file_location: Option<PathBuf>,
    pub master_url: Option<Url>,
    pub heartbeat_interval: Duration,
    pub tls_cert_location: Option<PathBuf>,
    pub tls_key_location: Option<PathBuf>,
    pub log_level: LogLevel,
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Static -----------------------------------------------------

impl CliConfig {
    /// Parse process args and environment. Exits with clap's usage message on
    /// bad input.
    pub fn from_env() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| e.exit());
        Self::from_args(args)
    }

    #[cfg(test)]
    pub(crate) fn from_iter<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Args::try_parse_from(iter).map(Self::from_args)
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args(args: Args) -> Self {
        let rcon_password = args
            .rcon_password
            .filter(|p| !p.is_empty())
            .map(|p| SecretString::new(p.into_boxed_str()));

        Self {
            listen_addr: SocketAddr::from((args.listen_host, args.port)),
            target_mode: args.target_mode,
            game_host: args.game_host,
            game_port: args.game_port,
            rcon_password,
            poll_interval: args.poll_interval,
            response_timeout: args.response_timeout,
            kick_threshold: args.kick_threshold,
            servers_file_location: args.servers_file,
            master_url: args.master_url,
            heartbeat_interval: args.heartbeat_interval,
            tls_cert_location: args.tls_cert,
            tls_key_location: args.tls_key,
            log_level: args.log_level,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "q3relay", version, about = "WebSocket to UDP relay for Quake III servers")]
struct Args {
    // IPv4 or IPv6 literal the WebSocket listener binds to.
    #[arg(long = "listen-host", env = "RELAY_LISTEN_HOST", default_value = "0.0.0.0")]
    listen_host: IpAddr,

    #[arg(long = "port", short = 'p', env = "WS_PORT", default_value_t = 27961)]
    port: u16,

    #[arg(long = "target-mode", env = "RELAY_TARGET_MODE", value_enum, default_value = "fixed")]
    target_mode: TargetMode,

    // Bridge target in fixed mode, and the server the default poller watches.
    #[arg(long = "q3-host", env = "Q3_HOST", default_value = "127.0.0.1")]
    game_host: String,

    #[arg(long = "q3-port", env = "Q3_PORT", default_value_t = 27960)]
    game_port: u16,

    // Unset or empty disables auto-kick for the default server.
    #[arg(long = "rcon-pass", env = "RCON_PASS", hide_env_values = true)]
    rcon_password: Option<String>,

    #[arg(long = "poll", env = "POLL_MS", default_value = "5000", value_parser = parse_interval)]
    poll_interval: Duration,

    #[arg(
        long = "response-timeout",
        env = "RESP_TIMEOUT_MS",
        default_value = "1500",
        value_parser = parse_duration
    )]
    response_timeout: Duration,

    #[arg(
        long = "consec-required",
        env = "CONSEC_REQUIRED",
        default_value_t = 2,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    kick_threshold: u32,

    // Optional TOML file with additional [[servers]] to moderate.
    #[arg(long = "servers", env = "RELAY_SERVERS_FILE")]
    servers_file: Option<PathBuf>,

    // Heartbeats are only sent when this is set.
    #[arg(long = "master-url", env = "MASTER_SERVER_URL")]
    master_url: Option<Url>,

    #[arg(
        long = "heartbeat",
        env = "HEARTBEAT_MS",
        default_value = "30000",
        value_parser = parse_interval
    )]
    heartbeat_interval: Duration,

    #[arg(long = "tls-cert", env = "RELAY_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    #[arg(long = "tls-key", env = "RELAY_TLS_KEY")]
    tls_key: Option<PathBuf>,

    #[arg(long = "log", env = "RELAY_LOG", default_value = "info")]
    log_level: LogLevel,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
