//! Configuration settings structs.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::refine::RefinementPolicy;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub refinement: RefinementSettings,
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub logging: LoggingSettings,
}

/// `[refinement]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementSettings {
    /// Metric above which tiles subdivide
    pub threshold: f64,
    /// Deepest level to subdivide to; the layer's `zoom.max` when unset
    pub max_depth: Option<u32>,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub cleanup_delay_ms: u64,
    pub event_capacity: usize,
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Cap on concurrent transport requests
    pub max_in_flight: usize,
    pub timeout_secs: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl EngineConfig {
    /// Refinement policy described by `[refinement]`.
    pub fn policy(&self) -> RefinementPolicy {
        let policy = RefinementPolicy::new(self.refinement.threshold);
        match self.refinement.max_depth {
            Some(depth) => policy.with_max_depth(depth),
            None => policy,
        }
    }

    /// Cache configuration described by `[cache]`.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_cleanup_delay(Duration::from_millis(self.cache.cleanup_delay_ms))
            .with_event_capacity(self.cache.event_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_refinement_section() {
        let mut config = EngineConfig::default();
        assert_eq!(config.policy().explicit_max_depth(), None);

        config.refinement.threshold = 2.5;
        config.refinement.max_depth = Some(12);
        let policy = config.policy();
        assert_eq!(policy.threshold(), 2.5);
        assert_eq!(policy.explicit_max_depth(), Some(12));
    }

    #[test]
    fn test_cache_config_from_cache_section() {
        let mut config = EngineConfig::default();
        config.cache.cleanup_delay_ms = 250;
        config.cache.event_capacity = 8;

        let cache = config.cache_config();
        assert_eq!(cache.cleanup_delay, Duration::from_millis(250));
        assert_eq!(cache.event_capacity, 8);
    }
}
