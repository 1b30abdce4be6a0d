//! Core application configuration types.
//!
//! Provides [`Config`] and [`PipelineConfig`], the gateway's equivalent of the
//! upstream codebase's `Config`/`StreamingConfig` split: a small validated
//! block for the prefetch pipeline's concurrency knobs, nested inside the
//! flat top-level configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Configuration for the prefetch pipeline's concurrency behavior.
///
/// Groups the two knobs that control how aggressively a single stream reads
/// ahead of its consumer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Depth of the bounded delivery queue between producer and consumer.
    ///
    /// Named `prefetch` to match the historical `Telegram.PARALLEL` setting
    /// it is sourced from — see `apps/server/src/config.rs` for the name
    /// inversion this preserves.
    pub prefetch: usize,

    /// Number of chunk fetches allowed in flight at once per stream.
    ///
    /// Named `parallelism` to match the historical `Telegram.PRE_FETCH`
    /// setting it is sourced from.
    pub parallelism: usize,
}

impl PipelineConfig {
    /// Creates a new `PipelineConfig` with validated values.
    pub fn new(prefetch: usize, parallelism: usize) -> Result<Self, String> {
        let config = Self {
            prefetch,
            parallelism,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.prefetch == 0 {
            return Err("prefetch must be >= 1".to_string());
        }
        if self.parallelism == 0 {
            return Err("parallelism must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prefetch: 3,
            parallelism: 2,
        }
    }
}

/// Configuration for the media gateway core.
///
/// All fields have sensible defaults; the binary layers environment and CLI
/// overrides on top (see `apps/server/src/config.rs`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Preferred bind port for the HTTP server (0 = let the OS choose).
    pub preferred_port: u16,

    /// Prefetch pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Interval at which the file-property cache is fully cleared (seconds).
    pub file_cache_clean_interval_secs: u64,

    /// Upstream session I/O timeout (seconds).
    pub session_timeout_secs: u64,

    /// Upstream session idle-sleep threshold (seconds).
    pub session_sleep_threshold_secs: u64,

    /// Maps client index to its home datacenter.
    ///
    /// Populated from deployment configuration; the pool has one
    /// authenticated client identity per entry.
    pub client_dc_map: HashMap<usize, u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            pipeline: PipelineConfig::default(),
            file_cache_clean_interval_secs: 30 * 60,
            session_timeout_secs: 30,
            session_sleep_threshold_secs: 60,
            client_dc_map: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_config_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pipeline_config_rejects_zero_values() {
        assert!(PipelineConfig::new(0, 2).is_err());
        assert!(PipelineConfig::new(3, 0).is_err());
    }

    #[test]
    fn config_default_is_sensible() {
        let config = Config::default();
        assert_eq!(config.preferred_port, 0);
        assert_eq!(config.pipeline.prefetch, 3);
        assert_eq!(config.pipeline.parallelism, 2);
        assert!(config.client_dc_map.is_empty());
    }
}
