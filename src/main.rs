use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use q3relay::{
    Config, HeartbeatReporter, RelayError, analytics, poller::spawn_pollers, serve_connection, tls,
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "q3relay";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    setup().await?;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() -> Result<(), RelayError> {
    // Everything below reads the config, so it goes first.
    Config::init().await?;

    init_tracing()
}

fn init_tracing() -> Result<(), RelayError> {
    let config = Config::snapshot();
    let level = config.log_level.as_str();
    let filter = EnvFilter::try_new(level).map_err(|_| RelayError::LogFilter(level.to_string()))?;
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    Ok(())
}

fn start_background_tasks(config: &Config) -> Result<(), RelayError> {
    if config.moderated_servers.is_empty() {
        info!("auto-kick disabled; set RCON_PASS to enable");
    } else {
        spawn_pollers(config.moderated_servers.clone());
    }

    if let Some(settings) = &config.heartbeat {
        let reporter = HeartbeatReporter::from_settings(settings)?;
        tokio::spawn(reporter.run());
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> Result<(), RelayError> {
    let config = Config::snapshot();

    let tls = config.tls.as_ref().map(tls::acceptor).transpose()?;

    let socket = if config.listen_addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    socket.bind(config.listen_addr)?;

    let listener: TcpListener = socket.listen(1024)?;

    let scheme = if tls.is_some() { "wss" } else { "ws" };
    info!("{} listening on {scheme}://{}", APP_NAME, config.listen_addr);

    start_background_tasks(&config)?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("{} shutting down", APP_NAME);
                break;
            }

            accept_res = listener.accept() => {
                let (stream, peer) = match accept_res {
                    Ok(v) => v,
                    Err(e) => { error!("accept error: {e}"); continue; }
                };

                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    config.target_policy.clone(),
                    tls.clone(),
                ));
            }
        }
    }

    info!("{}", analytics::snapshot());

    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
