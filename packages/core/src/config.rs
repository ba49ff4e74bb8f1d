//! Hierarchy manager configuration
//!
//! Tunables shared by the store, the mutator's content debounce, and the
//! persistence scheduler. Built once per session; `from_env` lets the dev tool
//! and tests shorten the debounce windows.

use std::env;
use std::time::Duration;

/// Short tier: derived-state refresh after typing pauses
pub const DEFAULT_CONTENT_REFRESH_MS: u64 = 300;

/// Long tier: durable write and downstream indexing
pub const DEFAULT_CONTENT_PERSIST_MS: u64 = 2000;

/// Broadcast channel capacity for async event consumers
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Maximum writes flushed per scheduler pass
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyConfig {
    /// Delay before the lightweight derived-state refresh of a content edit
    pub content_refresh_debounce: Duration,

    /// Delay before a content edit is written to the persistence store
    pub content_persist_debounce: Duration,

    /// Capacity of the NodeStore broadcast channel
    pub event_channel_capacity: usize,

    /// Maximum writes flushed per scheduler pass
    pub flush_batch_size: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            content_refresh_debounce: Duration::from_millis(DEFAULT_CONTENT_REFRESH_MS),
            content_persist_debounce: Duration::from_millis(DEFAULT_CONTENT_PERSIST_MS),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
        }
    }
}

impl HierarchyConfig {
    /// Defaults overridden by `NODESPACE_CONTENT_REFRESH_MS` and
    /// `NODESPACE_CONTENT_PERSIST_MS`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_millis("NODESPACE_CONTENT_REFRESH_MS") {
            config.content_refresh_debounce = ms;
        }
        if let Some(ms) = env_millis("NODESPACE_CONTENT_PERSIST_MS") {
            config.content_persist_debounce = ms;
        }

        if config.content_persist_debounce < config.content_refresh_debounce {
            tracing::warn!(
                "Persist debounce ({:?}) shorter than refresh debounce ({:?}); using refresh value for both",
                config.content_persist_debounce,
                config.content_refresh_debounce
            );
            config.content_persist_debounce = config.content_refresh_debounce;
        }

        config
    }

    pub fn with_debounce(mut self, refresh: Duration, persist: Duration) -> Self {
        self.content_refresh_debounce = refresh;
        self.content_persist_debounce = persist;
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HierarchyConfig::default();
        assert_eq!(config.content_refresh_debounce, Duration::from_millis(300));
        assert_eq!(config.content_persist_debounce, Duration::from_millis(2000));
        assert_eq!(config.event_channel_capacity, 128);
        assert_eq!(config.flush_batch_size, 64);
    }

    #[test]
    fn test_with_debounce() {
        let config = HierarchyConfig::default()
            .with_debounce(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(config.content_refresh_debounce, Duration::from_millis(10));
        assert_eq!(config.content_persist_debounce, Duration::from_millis(50));
    }

    // Single test touching the environment to avoid races between parallel tests
    #[test]
    fn test_from_env_overrides() {
        env::set_var("NODESPACE_CONTENT_REFRESH_MS", "50");
        env::set_var("NODESPACE_CONTENT_PERSIST_MS", "not-a-number");
        let config = HierarchyConfig::from_env();
        assert_eq!(config.content_refresh_debounce, Duration::from_millis(50));
        assert_eq!(config.content_persist_debounce, Duration::from_millis(2000));

        env::set_var("NODESPACE_CONTENT_PERSIST_MS", "10");
        let config = HierarchyConfig::from_env();
        assert_eq!(config.content_persist_debounce, Duration::from_millis(50));

        env::remove_var("NODESPACE_CONTENT_REFRESH_MS");
        env::remove_var("NODESPACE_CONTENT_PERSIST_MS");
    }
}
