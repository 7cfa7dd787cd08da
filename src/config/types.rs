use std::time::Duration;

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- TargetMode ---------------------------------------------------------------------------------

/// Where a bridge learns its UDP target from.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetMode {
    /// One game server for the whole process.
    Fixed,
    /// `?host=..&port=..` on every upgrade request.
    Query,
}

// -------------------------------------------------------------------------------------------------
// ---- Durations ----------------------------------------------------------------------------------

/// Accepts bare milliseconds (`5000`) or a humantime string (`5s`, `1500ms`).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();

    if let Ok(ms) = raw.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    humantime::parse_duration(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

/// Like [`parse_duration`], but for timer periods, which must be non-zero.
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let interval = parse_duration(raw)?;
    if interval.is_zero() {
        return Err(format!("interval '{}' must be greater than zero", raw.trim()));
    }
    Ok(interval)
}

// -------------------------------------------------------------------------------------------------
// ---- Tests --------------------------------------------------------------------------------------


// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
