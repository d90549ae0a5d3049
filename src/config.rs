//! Configuration for the strategy engine and memory store.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::memory::RecordKind;
use crate::types::hours;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reserved for future parallel stage execution; currently advisory.
    pub enable_parallel_processing: bool,
    /// Maximum stage retries before the error path is taken.
    pub max_retries: u32,
    /// Per-stage timeout applied to classification, selection and delegation.
    #[serde(with = "duration_millis")]
    pub stage_timeout: Duration,
    /// Convert stage errors into a low-confidence completed result.
    pub fallback_on_error: bool,
    /// Default tracing filter used when RUST_LOG is unset.
    pub log_level: LogLevel,
    pub memory: MemoryStoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_parallel_processing: false,
            max_retries: 1,
            stage_timeout: Duration::from_secs(30),
            fallback_on_error: true,
            log_level: LogLevel::Info,
            memory: MemoryStoreConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_fallback_on_error(mut self, enabled: bool) -> Self {
        self.fallback_on_error = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Memory store configuration: per-kind default TTLs and sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    #[serde(with = "duration_millis")]
    pub content_analysis_ttl: Duration,
    #[serde(with = "duration_millis")]
    pub strategy_performance_ttl: Duration,
    #[serde(with = "duration_millis")]
    pub user_preferences_ttl: Duration,
    #[serde(with = "duration_millis")]
    pub content_pattern_ttl: Duration,
    #[serde(with = "duration_millis")]
    pub sweep_interval: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            content_analysis_ttl: hours(24),
            strategy_performance_ttl: hours(7 * 24),
            user_preferences_ttl: hours(30 * 24),
            content_pattern_ttl: hours(7 * 24),
            sweep_interval: hours(1),
        }
    }
}

impl MemoryStoreConfig {
    /// Default TTL applied when a `put` does not pass one explicitly.
    pub fn default_ttl(&self, kind: RecordKind) -> Duration {
        match kind {
            RecordKind::ContentAnalysis => self.content_analysis_ttl,
            RecordKind::StrategyPerformance => self.strategy_performance_ttl,
            RecordKind::UserPreferences => self.user_preferences_ttl,
            RecordKind::ContentPattern => self.content_pattern_ttl,
        }
    }
}

/// Serde module for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.fallback_on_error);
        assert_eq!(config.stage_timeout, Duration::from_secs(30));
        assert_eq!(config.memory.content_analysis_ttl, hours(24));
        assert_eq!(config.memory.strategy_performance_ttl, hours(168));
        assert_eq!(config.memory.user_preferences_ttl, hours(720));
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_stage_timeout(Duration::from_secs(5))
            .with_fallback_on_error(false);
        assert_eq!(config.stage_timeout, Duration::from_secs(5));
        assert!(!config.fallback_on_error);
    }

    #[test]
    fn test_per_kind_ttl() {
        let config = MemoryStoreConfig::default();
        assert_eq!(config.default_ttl(RecordKind::ContentAnalysis), hours(24));
        assert_eq!(
            config.default_ttl(RecordKind::UserPreferences),
            hours(30 * 24)
        );
    }
}
