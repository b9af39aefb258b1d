//! Server configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:23333";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `KAD_LISTEN`
    pub listen: String,
    /// `KAD_DB_PATH`: SQLite database file. Unset means in-memory storage.
    pub db_path: Option<PathBuf>,
    /// `KAD_FETCH_TIMEOUT_MS`: upper bound on one lifecycle store fetch.
    pub fetch_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let listen = lookup("KAD_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let db_path = lookup("KAD_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let fetch_timeout = lookup("KAD_FETCH_TIMEOUT_MS").and_then(|ms| parse_timeout(&ms));
        Self {
            listen,
            db_path,
            fetch_timeout,
        }
    }
}

/// Milliseconds; `0` disables the timeout.
fn parse_timeout(ms: &str) -> Option<Duration> {
    match ms.trim().parse::<u64>() {
        Ok(0) => None,
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            tracing::warn!(value = %ms, error = %e, "ignoring invalid KAD_FETCH_TIMEOUT_MS");
            None
        }
    }
}
