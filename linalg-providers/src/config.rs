//! Engine tuning parameters.
//!
//! Every field has a default, so a JSON document only needs the keys it
//! overrides:
//!
//! ```
//! use linalg_providers::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "sparse": { "parallel_threshold": 64 } }"#).unwrap();
//! assert_eq!(config.sparse.parallel_threshold, 64);
//! assert_eq!(config.dense.strassen_cutoff, 64);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid engine configuration: {0}")]
    Invalid(String),
}

/// CPU Dense provider parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseConfig {
    /// Element count at or above which element-wise work fans out over rayon.
    pub parallel_threshold: usize,
    /// Square power-of-two operands at least this large use Strassen.
    pub strassen_cutoff: usize,
    pub use_strassen: bool,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 1000,
            strassen_cutoff: 64,
            use_strassen: true,
        }
    }
}

impl DenseConfig {
    pub fn with_params(
        parallel_threshold: usize,
        strassen_cutoff: usize,
        use_strassen: bool,
    ) -> Self {
        Self {
            parallel_threshold,
            strassen_cutoff,
            use_strassen,
        }
    }
}

/// CPU Sparse provider parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseConfig {
    /// Result row count at or above which rows are processed in parallel.
    pub parallel_threshold: usize,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 500,
        }
    }
}

/// GPU provider parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// When false the provider never probes the device and reports unavailable.
    pub enabled: bool,
    /// Matrix products with `m * n * k` below this run on the CPU.
    pub work_size_threshold: usize,
    /// Allowed absolute error of the `1 + 2` self-test.
    pub self_test_tolerance: f64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            work_size_threshold: 1_000_000,
            self_test_tolerance: 1e-4,
        }
    }
}

impl GpuConfig {
    pub fn with_params(
        enabled: bool,
        work_size_threshold: usize,
        self_test_tolerance: f64,
    ) -> Self {
        Self {
            enabled,
            work_size_threshold,
            self_test_tolerance,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dense: DenseConfig,
    pub sparse: SparseConfig,
    pub gpu: GpuConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dense(mut self, dense: DenseConfig) -> Self {
        self.dense = dense;
        self
    }

    pub fn with_sparse(mut self, sparse: SparseConfig) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn with_gpu(mut self, gpu: GpuConfig) -> Self {
        self.gpu = gpu;
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dense.strassen_cutoff < 2 {
            return Err(ConfigError::Invalid(format!(
                "dense.strassen_cutoff must be at least 2, got {}",
                self.dense.strassen_cutoff
            )));
        }
        if !self.gpu.self_test_tolerance.is_finite() || self.gpu.self_test_tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "gpu.self_test_tolerance must be a non-negative number, got {}",
                self.gpu.self_test_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.dense.parallel_threshold, 1000);
        assert_eq!(config.dense.strassen_cutoff, 64);
        assert_eq!(config.sparse.parallel_threshold, 500);
        assert_eq!(config.gpu.work_size_threshold, 1_000_000);
        assert_eq!(config.gpu.self_test_tolerance, 1e-4);
        assert!(config.gpu.enabled);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "gpu": { "enabled": false }, "dense": { "use_strassen": false } }"#,
        )
        .unwrap();
        assert!(!config.gpu.enabled);
        assert_eq!(config.gpu.work_size_threshold, 1_000_000);
        assert!(!config.dense.use_strassen);
        assert_eq!(config.sparse, SparseConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        let err =
            EngineConfig::from_json(r#"{ "gpu": { "self_test_tolerance": -1.0 } }"#).unwrap_err();
        assert!(err.to_string().contains("self_test_tolerance"));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "dense": { "strassen_cutoff": 1 } }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_sparse(SparseConfig {
                parallel_threshold: 3,
            })
            .with_gpu(GpuConfig::with_params(false, 10, 0.5));
        assert_eq!(config.sparse.parallel_threshold, 3);
        assert_eq!(config.gpu.work_size_threshold, 10);
        assert_eq!(config.dense, DenseConfig::default());
    }
}
