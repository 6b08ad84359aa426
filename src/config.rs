//! Configuration for the HMP recognizer.

use crate::ingest::SampleScale;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for model training and stream classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gravity/body separation filters
    pub separation: SeparationConfig,

    /// Cluster count selection
    pub clustering: ClusteringConfig,

    /// Gaussian mixture training
    pub training: TrainingConfig,

    /// Raw sample remapping
    pub ingest: SampleScale,

    /// Standard deviations added to the expected curve when deriving a class threshold
    pub threshold_factor: f64,

    /// Seed for clustering; `None` draws from entropy
    pub seed: Option<u64>,

    /// Build class models on separate threads
    pub parallel_training: bool,

    /// Path for storing the validation log
    pub data_path: PathBuf,

    /// Default location of the model artifact
    pub model_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hmp-recognizer");

        Self {
            separation: SeparationConfig::default(),
            clustering: ClusteringConfig::default(),
            training: TrainingConfig::default(),
            ingest: SampleScale::default(),
            threshold_factor: 1.5,
            seed: None,
            parallel_training: true,
            model_path: data_dir.join("models.json"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hmp-recognizer")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.model_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.separation;
        if s.median_order == 0 {
            return Err(ConfigError::Invalid("median_order must be at least 1".into()));
        }
        if !(s.passband_hz > 0.0 && s.passband_hz < s.stopband_hz) {
            return Err(ConfigError::Invalid(
                "passband edge must be positive and below the stopband edge".into(),
            ));
        }
        if s.stopband_hz >= s.sample_rate_hz / 2.0 {
            return Err(ConfigError::Invalid(
                "stopband edge must be below the Nyquist frequency".into(),
            ));
        }
        if self.threshold_factor <= 0.0 {
            return Err(ConfigError::Invalid("threshold_factor must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.clustering.quality_threshold) {
            return Err(ConfigError::Invalid(
                "quality_threshold must lie in [0, 1]".into(),
            ));
        }
        if self.training.max_iterations == 0 || self.clustering.restarts == 0 {
            return Err(ConfigError::Invalid(
                "iteration and restart counts must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Filter parameters for gravity/body separation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub sample_rate_hz: f64,
    pub passband_hz: f64,
    pub stopband_hz: f64,
    pub passband_ripple_db: f64,
    pub stopband_attenuation_db: f64,
    /// Window length of the per-axis median filter
    pub median_order: usize,
    /// Samples discarded from the head of the low-pass output
    pub filter_delay: usize,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 32.0,
            passband_hz: 0.25,
            stopband_hz: 2.0,
            passband_ripple_db: 0.001,
            stopband_attenuation_db: 100.0,
            median_order: 3,
            filter_delay: 64,
        }
    }
}

/// Parameters of the silhouette elbow rule and its K-means runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Fitness below which the previous K is accepted
    pub quality_threshold: f64,
    /// Upper bound for K; `None` uses half the largest time index
    pub max_clusters: Option<usize>,
    /// Independent K-means runs, the lowest inertia wins
    pub restarts: usize,
    /// Lloyd iterations per run
    pub max_iterations: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.69,
            max_clusters: None,
            restarts: 3,
            max_iterations: 100,
        }
    }
}

/// Parameters of Expectation-Maximization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Added to every covariance diagonal after each update
    pub covariance_regularization: f64,
    /// Relative log-likelihood change that stops EM
    pub loglik_threshold: f64,
    pub max_iterations: usize,
    /// Fail the build instead of warning when EM hits `max_iterations`
    pub require_convergence: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            covariance_regularization: 1e-5,
            loglik_threshold: 1e-10,
            max_iterations: 1000,
            require_convergence: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.separation.filter_delay, 64);
        assert_eq!(config.separation.median_order, 3);
        assert_eq!(config.clustering.quality_threshold, 0.69);
        assert_eq!(config.training.covariance_regularization, 1e-5);
        assert_eq!(config.threshold_factor, 1.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"seed": 7, "training": {"max_iterations": 50}}"#)
            .unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.training.max_iterations, 50);
        assert_eq!(config.training.loglik_threshold, 1e-10);
        assert_eq!(config.separation.sample_rate_hz, 32.0);
    }

    #[test]
    fn test_validate_rejects_bad_filter() {
        let mut config = Config::default();
        config.separation.stopband_hz = 20.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.separation.passband_hz = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("hmp-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let mut config = Config::default();
        config.seed = Some(42);
        config.parallel_training = false;

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.seed, Some(42));
        assert!(!loaded.parallel_training);

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }
}
