pub mod moderation;
pub mod query;

use rand::{Rng, distr::Alphanumeric};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::analytics;
use crate::config::ServerRecord;
use crate::wire::{OobCommand, StatusResponse};

pub use moderation::{KickOrder, ModerationPolicy, ModerationState};
pub use query::{QueryChannel, QueryError};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const CHALLENGE_LEN: usize = 12;

// -----------------------------------------------------------------------------
// ----- StatusPoller ----------------------------------------------------------

/// Polls one game server and kicks slots that keep reporting the ghost ping.
///
/// The poller owns its socket and its moderation state outright, so any
/// number of them can run side by side.
#[derive(Debug)]
pub struct StatusPoller {
    server: ServerRecord,
    policy: ModerationPolicy,
    state: ModerationState,
    channel: Option<QueryChannel>,
}

// -----------------------------------------------------------------------------
// ----- StatusPoller: Static --------------------------------------------------

impl StatusPoller {
    pub fn new(server: ServerRecord) -> Self {
        let policy = ModerationPolicy::with_threshold(server.kick_threshold);

        Self {
            server,
            policy,
            state: ModerationState::new(),
            channel: None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- StatusPoller: Public --------------------------------------------------

impl StatusPoller {
    pub fn state(&self) -> &ModerationState {
        &self.state
    }

    /// Poll forever. The first cycle runs right away.
    pub async fn run(mut self) {
        let mut ticker = interval(self.server.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "poller '{}' watching {}:{} every {:?}",
            self.server.name, self.server.host, self.server.port, self.server.poll_interval
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.poll_once().await {
                debug!("poller '{}': cycle skipped: {e}", self.server.name);
            }
        }
    }

    /// One full cycle: query status, update moderation state, send kicks.
    pub async fn poll_once(&mut self) -> Result<Vec<KickOrder>, QueryError> {
        let challenge = new_challenge();
        let text = self
            .query(&OobCommand::get_status(challenge.as_str()))
            .await?;

        let status = StatusResponse::parse(&text);

        match status.rule("challenge") {
            Some(got) if got != challenge => {
                return Err(QueryError::StaleReply {
                    expected: challenge,
                    got: got.to_string(),
                });
            }
            _ => {}
        }

        let kicks = self
            .state
            .observe(&status.roster, Instant::now(), &self.policy);

        for kick in &kicks {
            info!(
                "poller '{}': kicking slot {} \"{}\" (ping 999)",
                self.server.name, kick.slot, kick.name
            );
            analytics::inc_kick_issued();
            self.issue_admin_command(&kick.command()).await;
        }

        Ok(kicks)
    }

    /// Send `rcon <password> <command>`. The reply is not inspected.
    pub async fn issue_admin_command(&mut self, command: &str) {
        let rcon = OobCommand::rcon(self.server.rcon_password.clone(), command);

        if let Err(e) = self.query(&rcon).await {
            debug!("poller '{}': {} got no reply: {e}", self.server.name, rcon.label());
        }
    }
}

// -----------------------------------------------------------------------------
// ----- StatusPoller: Private -------------------------------------------------

impl StatusPoller {
    /// Opens the socket on first use, so a failed open is retried next cycle.
    async fn query(&mut self, command: &OobCommand) -> Result<String, QueryError> {
        let mut channel = match self.channel.take() {
            Some(channel) => channel,
            None => match QueryChannel::open(&self.server.host, self.server.port).await {
                Ok(channel) => {
                    debug!("poller '{}' bound to {}", self.server.name, channel.server());
                    channel
                }
                Err(e) => {
                    warn!("poller '{}': cannot reach game server: {e}", self.server.name);
                    return Err(e);
                }
            },
        };

        let reply = channel.query(command, self.server.response_timeout).await;
        self.channel = Some(channel);
        reply
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// One task per moderated server.
pub fn spawn_pollers(servers: Vec<ServerRecord>) -> Vec<JoinHandle<()>> {
    servers
        .into_iter()
        .map(|server| tokio::spawn(StatusPoller::new(server).run()))
        .collect()
}

fn new_challenge() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CHALLENGE_LEN)
        .map(char::from)
        .collect()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
