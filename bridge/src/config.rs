//! Runtime tunables for the bridge.
//!
//! The binary fills these from the command line and environment; tests
//! shrink the timings so a whole game lifecycle runs in milliseconds.

use std::fmt;
use std::time::Duration;

/// Default interval between game lookups after a challenge is created.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of game lookups before giving up (about 30 s).
pub const DEFAULT_DETECTION_ATTEMPTS: u32 = 60;

/// Default number of attempts for a remote call failing transiently.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;

/// Default time `quit` waits for the worker before exiting anyway.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub const ENGINE_NAME: &str = concat!("Lichess Bridge ", env!("CARGO_PKG_VERSION"));
pub const ENGINE_AUTHOR: &str = "lichess-uci contributors";

#[derive(Clone)]
pub struct BridgeConfig {
    pub poll_interval: Duration,
    pub detection_attempts: u32,
    pub retry: RetryPolicy,
    pub shutdown_grace: Duration,
    /// Token used when the GUI never sets `LichessToken`
    pub default_token: Option<String>,
    /// Start with `debug on`
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            detection_attempts: DEFAULT_DETECTION_ATTEMPTS,
            retry: RetryPolicy::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            default_token: None,
            debug: false,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("poll_interval", &self.poll_interval)
            .field("detection_attempts", &self.detection_attempts)
            .field("retry", &self.retry)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("default_token", &self.default_token.as_ref().map(|_| "<redacted>"))
            .field("debug", &self.debug)
            .finish()
    }
}

/// Exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1));
        assert_eq!(policy.delay_for(10), Duration::from_secs(4));
        assert_eq!(policy.delay_for(40), Duration::from_secs(4));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = BridgeConfig {
            default_token: Some("lip_secret".to_string()),
            ..BridgeConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("lip_secret"));
        assert!(debug.contains("<redacted>"));
    }
}
