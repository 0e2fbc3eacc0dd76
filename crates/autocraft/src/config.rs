//! # Resolver Configuration
//!
//! Tunables for cost accounting and cooperative scheduling, loaded once at
//! startup from TOML:
//!
//! ```toml
//! node_overhead_bytes = 8
//! step_overhead_bytes = 8
//! checkpoints_per_tick = 4096
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, ResolveResult};

/// Default fixed cost of every demand node.
pub const DEFAULT_NODE_OVERHEAD_BYTES: u64 = 8;

/// Default fixed cost of every production step.
pub const DEFAULT_STEP_OVERHEAD_BYTES: u64 = 8;

/// Default number of `resolve`/`apply` entries allowed per host tick.
pub const DEFAULT_CHECKPOINTS_PER_TICK: u32 = 4096;

/// Resolver settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Bytes charged per demand node on top of its measured bytes.
    pub node_overhead_bytes: u64,
    /// Bytes charged per production step on top of crafts and container bytes.
    pub step_overhead_bytes: u64,
    /// Checkpoints a task may pass in one tick before it suspends.
    pub checkpoints_per_tick: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            node_overhead_bytes: DEFAULT_NODE_OVERHEAD_BYTES,
            step_overhead_bytes: DEFAULT_STEP_OVERHEAD_BYTES,
            checkpoints_per_tick: DEFAULT_CHECKPOINTS_PER_TICK,
        }
    }
}

impl ResolverConfig {
    /// Parses a configuration from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML, unknown keys or a zero tick budget.
    pub fn from_toml_str(text: &str) -> ResolveResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ResolveError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ResolveResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ResolveError::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a task could never make progress.
    pub fn validate(&self) -> ResolveResult<()> {
        if self.checkpoints_per_tick == 0 {
            return Err(ResolveError::InvalidConfig(
                "checkpoints_per_tick must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::from_toml_str("").unwrap();
        assert_eq!(config, ResolverConfig::default());
        assert_eq!(config.node_overhead_bytes, 8);
    }

    #[test]
    fn test_partial_override() {
        let config = ResolverConfig::from_toml_str("step_overhead_bytes = 32").unwrap();
        assert_eq!(config.step_overhead_bytes, 32);
        assert_eq!(config.node_overhead_bytes, DEFAULT_NODE_OVERHEAD_BYTES);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ResolverConfig::from_toml_str("checkpoints_per_tick = 0"),
            Err(ResolveError::InvalidConfig(_))
        ));
        assert!(ResolverConfig::from_toml_str("unknown_key = 1").is_err());
        assert!(ResolverConfig::from_toml_str("node_overhead_bytes = \"eight\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("test_resolver_config_{id}.toml"));
        std::fs::write(&path, "checkpoints_per_tick = 16\n").unwrap();

        let config = ResolverConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.checkpoints_per_tick, 16);

        std::fs::remove_file(&path).ok();
        assert!(ResolverConfig::from_toml_file(&path).is_err());
    }
}
