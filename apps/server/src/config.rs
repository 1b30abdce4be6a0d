//! Server configuration.
//!
//! Supports loading from an optional YAML file, then environment-variable
//! overrides, then CLI-flag overrides (applied by `main.rs`), highest
//! precedence last.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `MEDIAGATE_BIND_PORT`
    pub bind_port: u16,

    /// Depth of the bounded delivery queue between producer and consumer.
    ///
    /// Confusingly sourced from the historical `PARALLEL` setting name
    /// despite controlling queue *depth*, not parallelism — preserved
    /// verbatim for backward compatibility. See `PRE_FETCH` below.
    /// Override: `MEDIAGATE_PARALLEL`
    pub parallel: usize,

    /// Number of chunk fetches allowed in flight at once per stream.
    ///
    /// Sourced from the historical `PRE_FETCH` setting name despite
    /// controlling fetch *parallelism*, not prefetch depth — the two names
    /// are swapped relative to their effect; see `parallel` above.
    /// Override: `MEDIAGATE_PRE_FETCH`
    pub pre_fetch: usize,

    /// Interval at which the file-property cache is fully cleared (seconds).
    pub file_cache_clean_interval_secs: u64,

    /// Upstream session I/O timeout (seconds).
    pub session_timeout_secs: u64,

    /// Upstream session idle-sleep threshold (seconds).
    pub session_sleep_threshold_secs: u64,

    /// Maps client index to its home datacenter.
    pub client_dc_map: HashMap<usize, u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            parallel: 3,
            pre_fetch: 2,
            file_cache_clean_interval_secs: 30 * 60,
            session_timeout_secs: 30,
            session_sleep_threshold_secs: 60,
            client_dc_map: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEDIAGATE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(val) = std::env::var("MEDIAGATE_PARALLEL") {
            if let Ok(n) = val.parse() {
                self.parallel = n;
            }
        }
        if let Ok(val) = std::env::var("MEDIAGATE_PRE_FETCH") {
            if let Ok(n) = val.parse() {
                self.pre_fetch = n;
            }
        }
    }

    /// Converts to mediagate-core's `Config` type.
    pub fn to_core_config(&self) -> mediagate_core::Config {
        mediagate_core::Config {
            preferred_port: self.bind_port,
            pipeline: mediagate_core::PipelineConfig {
                prefetch: self.parallel,
                parallelism: self.pre_fetch,
            },
            file_cache_clean_interval_secs: self.file_cache_clean_interval_secs,
            session_timeout_secs: self.session_timeout_secs,
            session_sleep_threshold_secs: self.session_sleep_threshold_secs,
            client_dc_map: self.client_dc_map.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preserves_inverted_parallel_prefetch_mapping() {
        let config = ServerConfig::default();
        let core = config.to_core_config();
        assert_eq!(core.pipeline.prefetch, config.parallel);
        assert_eq!(core.pipeline.parallelism, config.pre_fetch);
    }
}
