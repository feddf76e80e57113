//! Engine configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Query engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads for parallel operator evaluation (0 = one per CPU)
    #[serde(default)]
    pub worker_threads: usize,

    /// Marker shown on the non-participating side of a melded row
    #[serde(default = "EngineConfig::default_placeholder")]
    pub placeholder: String,

    /// Memoize operator results per (operator, window)
    #[serde(default = "EngineConfig::default_cache_operator_results")]
    pub cache_operator_results: bool,

    /// Report the trailing iteration of a loop run that never closed
    #[serde(default = "EngineConfig::default_include_incomplete_iterations")]
    pub include_incomplete_iterations: bool,

    /// Nesting limit when resolving references during reconstruction
    #[serde(default = "EngineConfig::default_max_build_depth")]
    pub max_build_depth: usize,

    /// Absolute tolerance used by numeric alignment heuristics
    #[serde(default = "EngineConfig::default_float_tolerance")]
    pub float_tolerance: f64,
}

impl EngineConfig {
    fn default_placeholder() -> String {
        "-".to_string()
    }

    const fn default_cache_operator_results() -> bool {
        true
    }

    const fn default_include_incomplete_iterations() -> bool {
        true
    }

    const fn default_max_build_depth() -> usize {
        256
    }

    const fn default_float_tolerance() -> f64 {
        1e-9
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_build_depth == 0 {
            return Err(Error::Configuration(
                "max_build_depth must be greater than zero".to_string(),
            ));
        }
        if !(self.float_tolerance >= 0.0) {
            return Err(Error::Configuration(format!(
                "float_tolerance must be a non-negative number, got {}",
                self.float_tolerance
            )));
        }
        Ok(())
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn with_operator_cache(mut self, enabled: bool) -> Self {
        self.cache_operator_results = enabled;
        self
    }

    pub fn with_incomplete_iterations(mut self, include: bool) -> Self {
        self.include_incomplete_iterations = include;
        self
    }

    pub fn with_max_build_depth(mut self, depth: usize) -> Self {
        self.max_build_depth = depth;
        self
    }

    pub fn with_float_tolerance(mut self, tolerance: f64) -> Self {
        self.float_tolerance = tolerance;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            placeholder: Self::default_placeholder(),
            cache_operator_results: Self::default_cache_operator_results(),
            include_incomplete_iterations: Self::default_include_incomplete_iterations(),
            max_build_depth: Self::default_max_build_depth(),
            float_tolerance: Self::default_float_tolerance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.placeholder, "-");
    }

    #[test]
    fn test_toml_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            worker_threads = 2
            placeholder = "~"
            cache_operator_results = false
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.placeholder, "~");
        assert!(!config.cache_operator_results);
        assert!(config.include_incomplete_iterations);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_toml_str("colour = 'blue'").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = EngineConfig::from_toml_str("max_build_depth = 0").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_builders_defer_to_validate() {
        let config = EngineConfig::default().with_max_build_depth(0);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        let config = EngineConfig::default().with_float_tolerance(-1.0);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        let config = EngineConfig::default().with_float_tolerance(f64::NAN);
        assert!(config.validate().is_err());
    }
}
