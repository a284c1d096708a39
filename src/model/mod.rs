//! Yield models
//!
//! ```text
//!                     ┌── RandomForest  (Model A) ──┐
//! FeatureVector ─ scaler                            ├─ wA·a + wB·b ─> grams
//!                     └── NeuralNetwork (Model B) ──┘
//! ```
//!
//! Both sub-models see the same frozen-scaled vector. Anything that serves
//! predictions does so through [`YieldModel`], so the prediction path can be
//! exercised against a stub without training.

mod ensemble;
mod forest;
mod metrics;
mod network;
mod split;

pub use ensemble::{ComponentPrediction, EnsembleModel};
pub use forest::{RandomForest, RegressionTree};
pub use metrics::{FeatureImportance, RegressionMetrics, TrainingReport, ACCURACY_BANDS_G};
pub use network::{FitSummary, NeuralNetwork};
pub use split::{train_test_split, Split};

use crate::artifact::ModelVersion;
use crate::features::{FeatureEncoder, FeatureVector};
use crate::Result;

/// A servable yield predictor.
pub trait YieldModel: Send + Sync {
    /// Artifact version being served
    fn version(&self) -> ModelVersion;

    /// Encoder captured with the model (vocabulary + tray area)
    fn encoder(&self) -> &FeatureEncoder;

    /// Predict grams per tray for each vector, in order.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaMismatch` if any vector was built for a
    /// different feature schema
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<f64>>;
}
