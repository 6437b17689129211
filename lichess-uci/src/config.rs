//! Runtime configuration for lichess-uci.
//!
//! GUIs usually launch engines without arguments, so every tunable can also
//! come from an environment variable. Command-line flags win over the
//! environment; a value that does not parse falls back to the default.

use std::path::PathBuf;
use std::time::Duration;

use bridge::{
    BridgeConfig, RetryPolicy, DEFAULT_DETECTION_ATTEMPTS, DEFAULT_POLL_INTERVAL,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_SHUTDOWN_GRACE,
};
use lichess_client::DEFAULT_BASE_URL;

/// Get the API token to use when the GUI never sets `LichessToken`.
///
/// Reads `LICHESS_TOKEN`; an empty value counts as unset.
pub fn get_token() -> Option<String> {
    std::env::var("LICHESS_TOKEN")
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Get the Lichess server URL.
///
/// Priority:
/// 1. `LICHESS_UCI_BASE_URL` env variable if set
/// 2. `https://lichess.org` as fallback
pub fn get_base_url() -> String {
    if let Ok(url) = std::env::var("LICHESS_UCI_BASE_URL") {
        return url;
    }

    DEFAULT_BASE_URL.to_string()
}

/// Get the directory for rolling log files, if file logging is wanted.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("LICHESS_UCI_LOG_DIR").ok().map(PathBuf::from)
}

/// Get the interval between game lookups in milliseconds.
pub fn get_poll_interval_ms() -> u64 {
    poll_interval_ms(std::env::var("LICHESS_UCI_POLL_INTERVAL_MS").ok().as_deref())
}

/// A zero interval would make the lookup timer panic, so 1 ms is the floor.
fn poll_interval_ms(raw: Option<&str>) -> u64 {
    let default = DEFAULT_POLL_INTERVAL.as_millis() as u64;
    raw.and_then(|ms| ms.trim().parse().ok())
        .unwrap_or(default)
        .max(1)
}

/// Get the number of game lookups before a challenge is given up.
pub fn get_detection_attempts() -> u32 {
    if let Ok(attempts) = std::env::var("LICHESS_UCI_DETECTION_ATTEMPTS") {
        return attempts.parse().unwrap_or(DEFAULT_DETECTION_ATTEMPTS);
    }

    DEFAULT_DETECTION_ATTEMPTS
}

/// Get the number of attempts for a remote call that fails transiently.
pub fn get_retry_attempts() -> u32 {
    if let Ok(attempts) = std::env::var("LICHESS_UCI_RETRY_ATTEMPTS") {
        return attempts.parse().unwrap_or(DEFAULT_RETRY_ATTEMPTS);
    }

    DEFAULT_RETRY_ATTEMPTS
}

/// Get how long `quit` waits for the current game to be left, in
/// milliseconds.
pub fn get_shutdown_grace_ms() -> u64 {
    let default = DEFAULT_SHUTDOWN_GRACE.as_millis() as u64;
    if let Ok(ms) = std::env::var("LICHESS_UCI_SHUTDOWN_GRACE_MS") {
        return ms.parse().unwrap_or(default);
    }

    default
}

/// Assemble the bridge configuration from the environment.
pub fn bridge_config(token: Option<String>, debug: bool) -> BridgeConfig {
    BridgeConfig {
        poll_interval: Duration::from_millis(get_poll_interval_ms()),
        detection_attempts: get_detection_attempts(),
        retry: RetryPolicy {
            attempts: get_retry_attempts(),
            ..RetryPolicy::default()
        },
        shutdown_grace: Duration::from_millis(get_shutdown_grace_ms()),
        default_token: token,
        debug,
    }
}
