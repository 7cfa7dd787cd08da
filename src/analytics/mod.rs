use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    pub bridges_opened: u64,
    pub bridges_closed: u64,
    pub datagrams_to_server: u64,
    pub datagrams_to_client: u64,
    pub datagrams_dropped: u64,
    pub kicks_issued: u64,
}

static BRIDGES_OPENED: AtomicU64 = AtomicU64::new(0);
static BRIDGES_CLOSED: AtomicU64 = AtomicU64::new(0);
static DATAGRAMS_TO_SERVER: AtomicU64 = AtomicU64::new(0);
static DATAGRAMS_TO_CLIENT: AtomicU64 = AtomicU64::new(0);
static DATAGRAMS_DROPPED: AtomicU64 = AtomicU64::new(0);
static KICKS_ISSUED: AtomicU64 = AtomicU64::new(0);

pub fn inc_bridge_opened() {
    BRIDGES_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_bridge_closed() {
    BRIDGES_CLOSED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_datagram_to_server() {
    DATAGRAMS_TO_SERVER.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_datagram_to_client() {
    DATAGRAMS_TO_CLIENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_datagram_dropped() {
    DATAGRAMS_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_kick_issued() {
    KICKS_ISSUED.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> RelayStats {
    RelayStats {
        bridges_opened: BRIDGES_OPENED.load(Ordering::Relaxed),
        bridges_closed: BRIDGES_CLOSED.load(Ordering::Relaxed),
        datagrams_to_server: DATAGRAMS_TO_SERVER.load(Ordering::Relaxed),
        datagrams_to_client: DATAGRAMS_TO_CLIENT.load(Ordering::Relaxed),
        datagrams_dropped: DATAGRAMS_DROPPED.load(Ordering::Relaxed),
        kicks_issued: KICKS_ISSUED.load(Ordering::Relaxed),
    }
}

impl RelayStats {
    pub fn active_bridges(&self) -> u64 {
        self.bridges_opened.saturating_sub(self.bridges_closed)
    }
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bridges_opened={} bridges_closed={} datagrams_to_server={} datagrams_to_client={} datagrams_dropped={} kicks_issued={}",
            self.bridges_opened,
            self.bridges_closed,
            self.datagrams_to_server,
            self.datagrams_to_client,
            self.datagrams_dropped,
            self.kicks_issued
        )
    }
}
