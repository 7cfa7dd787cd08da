use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::HeartbeatSettings;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const HEARTBEAT_PATH: &str = "api/servers/heartbeat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// -----------------------------------------------------------------------------
// ----- HeartbeatRequest ------------------------------------------------------

/// Body of the registry's heartbeat call. Target fields are left out when the
/// relay lets clients pick their own server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub proxy_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
}

impl HeartbeatRequest {
    pub fn from_settings(settings: &HeartbeatSettings) -> Self {
        Self {
            proxy_port: settings.proxy_port,
            target_host: settings.target.as_ref().map(|t| t.host.clone()),
            target_port: settings.target.as_ref().map(|t| t.port),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- HeartbeatReporter -----------------------------------------------------

/// Tells the master registry this relay is alive.
#[derive(Debug, Clone)]
pub struct HeartbeatReporter {
    http: reqwest::Client,
    endpoint: Url,
    payload: HeartbeatRequest,
    interval: Duration,
}

// -----------------------------------------------------------------------------
// ----- HeartbeatReporter: Static ---------------------------------------------

impl HeartbeatReporter {
    pub fn from_settings(settings: &HeartbeatSettings) -> Result<Self, HeartbeatError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("q3relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(HeartbeatError::Http)?;

        Ok(Self {
            http,
            endpoint: endpoint_url(&settings.master_url, settings.proxy_port)?,
            payload: HeartbeatRequest::from_settings(settings),
            interval: settings.interval,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- HeartbeatReporter: Public ---------------------------------------------

impl HeartbeatReporter {
    /// Beat forever; the first beat goes out immediately. Failures are logged
    /// and the next beat proceeds as usual.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("heartbeat to {} every {:?}", self.endpoint, self.interval);

        loop {
            ticker.tick().await;

            match self.beat().await {
                Ok(()) => debug!("heartbeat accepted by {}", self.endpoint),
                Err(e) => warn!("heartbeat failed: {e}"),
            }
        }
    }

    pub async fn beat(&self) -> Result<(), HeartbeatError> {
        let response = self
            .http
            .put(self.endpoint.clone())
            .json(&self.payload)
            .send()
            .await
            .map_err(HeartbeatError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HeartbeatError::Status(status));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// `{base}/api/servers/heartbeat?port=N`, keeping any path prefix on `base`.
pub fn endpoint_url(base: &Url, proxy_port: u16) -> Result<Url, HeartbeatError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut endpoint = base
        .join(HEARTBEAT_PATH)
        .map_err(|e| HeartbeatError::Url(e.to_string()))?;
    endpoint.set_query(None);
    endpoint
        .query_pairs_mut()
        .append_pair("port", &proxy_port.to_string());

    Ok(endpoint)
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("request failed: {0}")]
    Http(reqwest::Error),

    #[error("registry answered {0}")]
    Status(StatusCode),

    #[error("bad master url: {0}")]
    Url(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::BridgeTarget;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    fn settings(master_url: &str, target: Option<BridgeTarget>) -> HeartbeatSettings {
        HeartbeatSettings {
            master_url: Url::parse(master_url).unwrap(),
            interval: Duration::from_secs(30),
            proxy_port: 27961,
            target,
        }
    }

    /// Accepts one HTTP request, answers with `status_line`, and hands back the
    /// raw request text.
    async fn one_shot_registry(status_line: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 1024];

            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                if request_complete(&raw) {
                    break;
                }
            }

            let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            String::from_utf8(raw).unwrap()
        });

        (url, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };

        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        body.len() >= content_length
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("https://master.example.com/registry").unwrap();
        let url = endpoint_url(&base, 27961).unwrap();
        assert_eq!(
            url.as_str(),
            "https://master.example.com/registry/api/servers/heartbeat?port=27961"
        );

        let base = Url::parse("http://10.0.0.1:8080").unwrap();
        let url = endpoint_url(&base, 80).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:8080/api/servers/heartbeat?port=80");
    }

    #[test]
    fn body_omits_target_in_query_mode() {
        let fixed = HeartbeatRequest::from_settings(&settings(
            "http://m/",
            Some(BridgeTarget::new("10.0.0.5", 27960)),
        ));
        assert_eq!(
            serde_json::to_string(&fixed).unwrap(),
            r#"{"proxyPort":27961,"targetHost":"10.0.0.5","targetPort":27960}"#
        );

        let open = HeartbeatRequest::from_settings(&settings("http://m/", None));
        assert_eq!(serde_json::to_string(&open).unwrap(), r#"{"proxyPort":27961}"#);
    }

    #[tokio::test]
    async fn beat_puts_json_to_registry() {
        let (url, registry) = one_shot_registry("HTTP/1.1 204 No Content").await;
        let reporter = HeartbeatReporter::from_settings(&settings(
            url.as_str(),
            Some(BridgeTarget::new("127.0.0.1", 27960)),
        ))
        .unwrap();

        reporter.beat().await.unwrap();

        let request = registry.await.unwrap();
        assert!(request.starts_with("PUT /api/servers/heartbeat?port=27961 HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"proxyPort":27961,"targetHost":"127.0.0.1","targetPort":27960}"#));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, registry) = one_shot_registry("HTTP/1.1 503 Service Unavailable").await;
        let reporter = HeartbeatReporter::from_settings(&settings(url.as_str(), None)).unwrap();

        let err = reporter.beat().await.unwrap_err();
        assert!(matches!(err, HeartbeatError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
        registry.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_registry_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let reporter =
            HeartbeatReporter::from_settings(&settings(&format!("http://127.0.0.1:{port}/"), None))
                .unwrap();

        assert!(matches!(reporter.beat().await, Err(HeartbeatError::Http(_))));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
