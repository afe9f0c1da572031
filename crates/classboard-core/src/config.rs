//! Sync engine timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default outbound delta throttle window (about 12.5 deltas per second).
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 80;

/// Default delay before the authority sends its opening snapshot.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 800;

/// Default debounce before the session cache is written.
pub const DEFAULT_CACHE_DEBOUNCE_MS: u64 = 700;

/// Tunables for a whiteboard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between two outbound deltas.
    pub throttle_interval_ms: u64,
    /// Delay between opening the whiteboard and the authority's first snapshot.
    pub settle_delay_ms: u64,
    /// Quiet period after the last change before the session cache is written.
    pub cache_debounce_ms: u64,
    /// When set, the authority re-broadcasts a snapshot at this interval.
    /// Off by default: only the opening snapshot is sent.
    pub resnapshot_interval_ms: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: DEFAULT_THROTTLE_INTERVAL_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            cache_debounce_ms: DEFAULT_CACHE_DEBOUNCE_MS,
            resnapshot_interval_ms: None,
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cache_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_debounce_ms)
    }

    pub fn resnapshot_interval(&self) -> Option<Duration> {
        self.resnapshot_interval_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.throttle_interval(), Duration::from_millis(80));
        assert_eq!(config.settle_delay(), Duration::from_millis(800));
        assert_eq!(config.cache_debounce(), Duration::from_millis(700));
        assert!(config.resnapshot_interval().is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SyncConfig::from_json(r#"{"throttle_interval_ms": 50, "resnapshot_interval_ms": 10000}"#).unwrap();
        assert_eq!(config.throttle_interval_ms, 50);
        assert_eq!(config.settle_delay_ms, DEFAULT_SETTLE_DELAY_MS);
        assert_eq!(config.resnapshot_interval(), Some(Duration::from_secs(10)));
    }
}
