pub mod analytics;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod listener;
pub mod poller;
pub mod tls;
pub mod wire;

pub use bridge::ConnectionBridge;
pub use config::Config;
pub use errors::RelayError;
pub use heartbeat::HeartbeatReporter;
pub use listener::serve_connection;
pub use poller::StatusPoller;
