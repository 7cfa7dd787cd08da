use memchr::memmem;
use once_cell::sync::Lazy;
use regex::Regex;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const STATUS_RESPONSE_TAG: &str = "statusResponse\n";

static PLAYER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(-?\d+)\s+(-?\d+)\s+"(.*)""#).expect("player line pattern must compile")
});

// -----------------------------------------------------------------------------
// ----- Roster ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub slot: usize,
    pub score: i32,
    pub ping: i32,
    pub name: String,
}

/// One line of the roster. Lines that don't look like a player still take a
/// slot so later indices stay aligned with what the server printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEntry {
    Player(PlayerRecord),
    Unparsed { slot: usize, raw: String },
}

impl RosterEntry {
    pub fn slot(&self) -> usize {
        match self {
            RosterEntry::Player(p) => p.slot,
            RosterEntry::Unparsed { slot, .. } => *slot,
        }
    }

    pub fn ping(&self) -> Option<i32> {
        match self {
            RosterEntry::Player(p) => Some(p.ping),
            RosterEntry::Unparsed { .. } => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            RosterEntry::Player(p) => Some(&p.name),
            RosterEntry::Unparsed { .. } => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- StatusResponse --------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusResponse {
    /// `\key\value\...` server rules line, if a tagged reply was found.
    pub rules: Option<String>,
    pub roster: Vec<RosterEntry>,
}

impl StatusResponse {
    /// A reply without the `statusResponse` tag is an empty response, not an
    /// error.
    pub fn parse(text: &str) -> Self {
        let Some(start) = memmem::find(text.as_bytes(), STATUS_RESPONSE_TAG.as_bytes()) else {
            return Self::default();
        };

        let body = &text[start + STATUS_RESPONSE_TAG.len()..];
        let mut lines = body
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty());

        let rules = lines.next().map(str::to_string);
        let roster = lines
            .enumerate()
            .map(|(slot, line)| parse_player_line(slot, line))
            .collect();

        Self { rules, roster }
    }

    pub fn is_tagged(&self) -> bool {
        self.rules.is_some()
    }

    /// Look up one key in the rules info string.
    pub fn rule(&self, key: &str) -> Option<&str> {
        let rules = self.rules.as_deref()?;
        let mut parts = rules.strip_prefix('\\').unwrap_or(rules).split('\\');

        while let Some(k) = parts.next() {
            let v = parts.next()?;
            if k.eq_ignore_ascii_case(key) {
                return Some(v);
            }
        }

        None
    }
}

pub fn parse_roster(text: &str) -> Vec<RosterEntry> {
    StatusResponse::parse(text).roster
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn parse_player_line(slot: usize, line: &str) -> RosterEntry {
    let parsed = PLAYER_LINE.captures(line).and_then(|caps| {
        let score = caps[1].parse::<i32>().ok()?;
        let ping = caps[2].parse::<i32>().ok()?;
        Some(PlayerRecord {
            slot,
            score,
            ping,
            name: caps[3].to_string(),
        })
    });

    match parsed {
        Some(player) => RosterEntry::Player(player),
        None => RosterEntry::Unparsed {
            slot,
            raw: line.to_string(),
        },
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
