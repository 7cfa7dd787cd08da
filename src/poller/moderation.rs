use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::wire::RosterEntry;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Ping the server reports for a client that stopped sending packets.
pub const GHOST_PING: i32 = 999;

pub const KICK_COOLDOWN: Duration = Duration::from_secs(30);
pub const KICK_RETENTION: Duration = Duration::from_secs(5 * 60);

// -----------------------------------------------------------------------------
// ----- ModerationPolicy ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Consecutive ghost polls before a kick.
    pub threshold: u32,
    pub cooldown: Duration,
    pub retention: Duration,
}

impl ModerationPolicy {
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown: KICK_COOLDOWN,
            retention: KICK_RETENTION,
        }
    }
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self::with_threshold(2)
    }
}

// -----------------------------------------------------------------------------
// ----- ModerationState -------------------------------------------------------

/// A kick the poller should send this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickOrder {
    pub slot: usize,
    pub name: String,
}

impl KickOrder {
    pub fn command(&self) -> String {
        format!("kicknum {}", self.slot)
    }
}

/// Per-slot bookkeeping for one game server. Slots are roster positions, so
/// this is best-effort: a player leaving shifts everyone behind them.
#[derive(Debug, Default)]
pub struct ModerationState {
    streaks: HashMap<usize, u32>,
    last_kicks: HashMap<usize, Instant>,
}

// -----------------------------------------------------------------------------
// ----- ModerationState: Public -----------------------------------------------

impl ModerationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one roster into the state and return the kicks it triggers. The
    /// kicks are recorded as issued at `now`.
    pub fn observe(
        &mut self,
        roster: &[RosterEntry],
        now: Instant,
        policy: &ModerationPolicy,
    ) -> Vec<KickOrder> {
        self.prune(roster, now, policy);

        let mut kicks = Vec::new();

        for entry in roster {
            let slot = entry.slot();

            if entry.ping() != Some(GHOST_PING) {
                self.streaks.insert(slot, 0);
                continue;
            }

            let streak = self.streaks.entry(slot).or_insert(0);
            *streak += 1;

            if *streak < policy.threshold {
                continue;
            }

            let cooled_down = match self.last_kicks.get(&slot) {
                Some(at) => now.saturating_duration_since(*at) > policy.cooldown,
                None => true,
            };

            if cooled_down {
                *streak = 0;
                self.last_kicks.insert(slot, now);
                kicks.push(KickOrder {
                    slot,
                    name: entry.name().unwrap_or_default().to_string(),
                });
            }
        }

        kicks
    }

    pub fn streak(&self, slot: usize) -> Option<u32> {
        self.streaks.get(&slot).copied()
    }

    pub fn last_kick(&self, slot: usize) -> Option<Instant> {
        self.last_kicks.get(&slot).copied()
    }

    pub fn tracked_slots(&self) -> usize {
        self.streaks.len()
    }
}

// -----------------------------------------------------------------------------
// ----- ModerationState: Private ----------------------------------------------

impl ModerationState {
    fn prune(&mut self, roster: &[RosterEntry], now: Instant, policy: &ModerationPolicy) {
        self.streaks
            .retain(|slot, _| roster.iter().any(|entry| entry.slot() == *slot));

        self.last_kicks
            .retain(|_, at| now.saturating_duration_since(*at) <= policy.retention);
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
