//! Engine configuration, loadable from TOML.

use crate::error::Result;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Tunables for the shard store and query engine.
///
/// Every field has a default, so an empty TOML document is a valid config.
///
/// ```toml
/// min_results = 8
/// negative_cache_ttl_ms = 2000
/// load_timeout_ms = 5000
/// default_page_size = 20
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Below this many prefix matches the engine falls back to substring matching.
    pub min_results: usize,
    /// How long a failed shard load is remembered before it may be retried.
    pub negative_cache_ttl_ms: u64,
    /// Shard loads slower than this are treated as unavailable.
    pub load_timeout_ms: u64,
    /// Page size used by `ResultCursor::next_default`.
    pub default_page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_results: 8,
            negative_cache_ttl_ms: 2_000,
            load_timeout_ms: 5_000,
            default_page_size: 20,
        }
    }
}

impl SearchConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse search config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file from disk.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid search config at {}", path.display()))
    }

    pub const fn negative_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.negative_cache_ttl_ms)
    }

    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.load_timeout_ms == 0 {
            anyhow::bail!("load_timeout_ms must be greater than zero");
        }
        if self.default_page_size == 0 {
            anyhow::bail!("default_page_size must be greater than zero");
        }
        Ok(())
    }
}
