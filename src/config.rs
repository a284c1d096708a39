//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```rust
//! use microyield::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(
//!     r#"
//!     [retrain]
//!     min_new_samples = 5
//!     "#,
//! )?;
//! assert_eq!(config.retrain.min_new_samples, 5);
//! assert!((config.ensemble.forest_weight - 0.4).abs() < f64::EPSILON);
//! # Ok::<(), microyield::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default tray area used to derive seeding density (10x20 inch tray)
pub const DEFAULT_TRAY_AREA_CM2: f64 = 1290.0;

/// Weight given to synthetic samples during retraining
pub const SYNTHETIC_SAMPLE_WEIGHT: f64 = 1.0;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage locations
    pub paths: PathsConfig,
    /// Blend weights
    pub ensemble: EnsembleWeights,
    /// Retrain trigger and data-fusion policy
    pub retrain: RetrainConfig,
    /// Model A hyperparameters
    pub forest: ForestConfig,
    /// Model B hyperparameters
    pub network: NetworkConfig,
    /// Feature engineering constants
    pub features: FeatureConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or fails validation
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated invariant
    pub fn validate(&self) -> Result<()> {
        self.ensemble.validate()?;
        self.retrain.validate()?;

        if self.forest.n_trees == 0 {
            return Err(Error::Config("forest.n_trees must be at least 1".to_string()));
        }
        if self.forest.min_samples_leaf == 0 || self.forest.min_samples_split < 2 {
            return Err(Error::Config(
                "forest.min_samples_leaf must be >= 1 and forest.min_samples_split >= 2"
                    .to_string(),
            ));
        }
        self.network.validate()?;
        if !(self.features.tray_area_cm2.is_finite() && self.features.tray_area_cm2 > 0.0) {
            return Err(Error::Config(
                "features.tray_area_cm2 must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root data directory
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PathsConfig {
    /// Immutable synthetic corpus file
    #[must_use]
    pub fn synthetic_corpus(&self) -> PathBuf {
        self.data_dir.join("synthetic.parquet")
    }

    /// Directory of append-only real-harvest segments
    #[must_use]
    pub fn real_corpus_dir(&self) -> PathBuf {
        self.data_dir.join("real")
    }

    /// Root of the versioned artifact store
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }
}

/// Fixed blend weights: `yield = forest_weight * A + network_weight * B`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleWeights {
    /// Weight of Model A (bagged trees)
    pub forest_weight: f64,
    /// Weight of Model B (feed-forward network)
    pub network_weight: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            forest_weight: 0.4,
            network_weight: 0.6,
        }
    }
}

impl EnsembleWeights {
    /// `forest_weight * forest + network_weight * network`, unnormalised
    #[must_use]
    pub fn blend(&self, forest: f64, network: f64) -> f64 {
        self.forest_weight * forest + self.network_weight * network
    }

    /// Validate weights are finite, non-negative and not both zero
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the weights cannot form a blend
    pub fn validate(&self) -> Result<()> {
        let finite = self.forest_weight.is_finite() && self.network_weight.is_finite();
        if !finite || self.forest_weight < 0.0 || self.network_weight < 0.0 {
            return Err(Error::Config(format!(
                "ensemble weights must be finite and non-negative (got {}, {})",
                self.forest_weight, self.network_weight
            )));
        }
        if self.forest_weight + self.network_weight <= 0.0 {
            return Err(Error::Config("ensemble weights must not both be zero".to_string()));
        }
        Ok(())
    }
}

/// Promotion quality gate evaluated on the held-out split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    /// Minimum fraction (0..=1) of test predictions within 50 g of truth
    pub min_within_50g: f64,
    /// Optional ceiling on the blended test MAE in grams
    pub max_test_mae: Option<f64>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_within_50g: 0.5,
            max_test_mae: None,
        }
    }
}

/// Retrain trigger and data-fusion policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    /// New real samples required since the last promotion
    pub min_new_samples: usize,
    /// Sample weight multiplier for real harvests (synthetic is 1.0)
    pub real_sample_weight: f64,
    /// Held-out fraction for evaluation
    pub test_fraction: f64,
    /// Seed for the train/test shuffle
    pub split_seed: u64,
    /// Smallest corpus that may be trained on
    pub min_samples: usize,
    /// Promotion gate
    pub quality_gate: QualityGate,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            min_new_samples: 10,
            real_sample_weight: 2.0,
            test_fraction: 0.2,
            split_seed: 42,
            min_samples: 10,
            quality_gate: QualityGate::default(),
        }
    }
}

impl RetrainConfig {
    fn validate(&self) -> Result<()> {
        if !(self.real_sample_weight.is_finite()
            && self.real_sample_weight > SYNTHETIC_SAMPLE_WEIGHT)
        {
            return Err(Error::Config(format!(
                "retrain.real_sample_weight must exceed the synthetic weight {SYNTHETIC_SAMPLE_WEIGHT} (got {})",
                self.real_sample_weight
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(Error::Config(format!(
                "retrain.test_fraction must be in (0, 1) (got {})",
                self.test_fraction
            )));
        }
        if self.min_new_samples == 0 {
            return Err(Error::Config("retrain.min_new_samples must be at least 1".to_string()));
        }
        let gate = &self.quality_gate;
        if !(0.0..=1.0).contains(&gate.min_within_50g) {
            return Err(Error::Config(
                "retrain.quality_gate.min_within_50g is a fraction in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bagged regression tree hyperparameters (Model A)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of bootstrap trees
    pub n_trees: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means sqrt(n_features)
    pub max_features: Option<usize>,
    /// Seed for bootstrap and feature sampling
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 20,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            seed: 42,
        }
    }
}

/// Feed-forward network hyperparameters (Model B)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hidden layer widths (ReLU)
    pub hidden_layers: Vec<usize>,
    /// Adam step size
    pub learning_rate: f64,
    /// Maximum epochs
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Huber loss transition point (in standardized target units)
    pub huber_delta: f64,
    /// Fraction of the training split held out for early stopping
    pub validation_fraction: f64,
    /// Seed for weight init and batch shuffles
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32, 16],
            learning_rate: 0.001,
            epochs: 100,
            batch_size: 32,
            patience: 15,
            huber_delta: 1.0,
            validation_fraction: 0.1,
            seed: 42,
        }
    }
}

impl NetworkConfig {
    /// Check the training hyperparameters
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.hidden_layers.iter().any(|&width| width == 0) {
            return Err(Error::Config(
                "network.hidden_layers must not contain zero-width layers".to_string(),
            ));
        }
        if self.batch_size == 0 || self.epochs == 0 || self.patience == 0 {
            return Err(Error::Config(
                "network.batch_size, network.epochs and network.patience must be positive"
                    .to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(
                "network.learning_rate must be a positive number".to_string(),
            ));
        }
        if !(self.huber_delta.is_finite() && self.huber_delta > 0.0) {
            return Err(Error::Config(format!(
                "network.huber_delta must be a positive number (got {})",
                self.huber_delta
            )));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(Error::Config(format!(
                "network.validation_fraction must be in [0, 1) (got {})",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

/// Feature engineering constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Tray area used to derive seeding density from base yield
    pub tray_area_cm2: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            tray_area_cm2: DEFAULT_TRAY_AREA_CM2,
        }
    }
}
