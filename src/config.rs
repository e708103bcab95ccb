use std::path::PathBuf;
use std::time::Duration;

/// Default history ring capacity in bytes.
pub const DEFAULT_RING_CAPACITY: usize = 1 << 20;

/// Default PTY dimensions when the caller does not request a size.
pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 40;

/// Default shutdown linger: how long the endpoint stays open to late
/// connectors after the child has exited.
pub const DEFAULT_LINGER: Duration = Duration::from_millis(5000);

/// Smallest accepted linger. Zero and negative `HOLDPTY_LINGER_MS` values
/// clamp here so tests can shrink the window without eliminating it.
pub const MIN_LINGER: Duration = Duration::from_millis(25);

/// Post-exit drain interval, letting the PTY flush trailing output before
/// shutdown begins. The Windows PTY completes child exit before all output
/// has surfaced, hence the longer wait there.
#[cfg(unix)]
pub const DRAIN: Duration = Duration::from_millis(100);
#[cfg(windows)]
pub const DRAIN: Duration = Duration::from_millis(200);

/// Connect timeout used when probing whether a stale-looking endpoint is
/// still accepting.
pub const STALE_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Process-scoped configuration, read once at holder construction and never
/// mutated afterwards. Tests construct this directly instead of touching the
/// process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Session directory override (`HOLDPTY_DIR`). `None` means the
    /// platform default resolution in [`crate::registry::resolve_session_dir`].
    pub session_dir: Option<PathBuf>,
    /// Shutdown linger (`HOLDPTY_LINGER_MS`, default 5000).
    pub linger: Duration,
    /// Post-exit drain interval.
    pub drain: Duration,
    /// History ring capacity in bytes.
    pub ring_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_dir: None,
            linger: DEFAULT_LINGER,
            drain: DRAIN,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    ///
    /// `HOLDPTY_DIR` overrides the session directory verbatim.
    /// `HOLDPTY_LINGER_MS` sets the linger; unparsable values fall back to
    /// the default, zero and negative values clamp to [`MIN_LINGER`].
    pub fn from_env() -> Self {
        let session_dir = std::env::var_os("HOLDPTY_DIR").map(PathBuf::from);
        let linger = match std::env::var("HOLDPTY_LINGER_MS") {
            Ok(raw) => match raw.trim().parse::<i64>() {
                Ok(ms) => clamp_linger(ms),
                Err(_) => DEFAULT_LINGER,
            },
            Err(_) => DEFAULT_LINGER,
        };
        Self {
            session_dir,
            linger,
            ..Self::default()
        }
    }
}

fn clamp_linger(ms: i64) -> Duration {
    if ms <= 0 {
        MIN_LINGER
    } else {
        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.linger, DEFAULT_LINGER);
        assert_eq!(config.ring_capacity, DEFAULT_RING_CAPACITY);
        assert!(config.session_dir.is_none());
    }

    #[test]
    fn linger_clamps_zero_and_negative() {
        assert_eq!(clamp_linger(0), MIN_LINGER);
        assert_eq!(clamp_linger(-500), MIN_LINGER);
    }

    #[test]
    fn linger_accepts_positive() {
        assert_eq!(clamp_linger(200), Duration::from_millis(200));
        assert_eq!(clamp_linger(1), Duration::from_millis(1));
    }
}
