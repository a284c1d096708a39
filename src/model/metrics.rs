//! Regression quality metrics and the training report

use crate::config::{EnsembleWeights, QualityGate};
use serde::{Deserialize, Serialize};

/// Error bands (grams) reported as accuracy-within-threshold rates
pub const ACCURACY_BANDS_G: [f64; 3] = [20.0, 30.0, 50.0];

/// Held-out quality of one predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean absolute error (g)
    pub mae: f64,
    /// Root mean squared error (g)
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Fraction of predictions within 20 g
    pub within_20g: f64,
    /// Fraction of predictions within 30 g
    pub within_30g: f64,
    /// Fraction of predictions within 50 g
    pub within_50g: f64,
    /// Number of evaluated rows
    pub n: usize,
}

impl RegressionMetrics {
    /// Score predictions against ground truth.
    ///
    /// R² is 0 when the truth has no variance.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length (programming error)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(truth: &[f64], predicted: &[f64]) -> Self {
        assert_eq!(truth.len(), predicted.len(), "truth/prediction length mismatch");
        let n = truth.len();
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                r2: 0.0,
                within_20g: 0.0,
                within_30g: 0.0,
                within_50g: 0.0,
                n: 0,
            };
        }

        let count = n as f64;
        let errors: Vec<f64> = truth.iter().zip(predicted).map(|(t, p)| t - p).collect();
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / count;
        let sse = errors.iter().map(|e| e * e).sum::<f64>();
        let rmse = (sse / count).sqrt();

        let mean = truth.iter().sum::<f64>() / count;
        let sst = truth.iter().map(|t| (t - mean).powi(2)).sum::<f64>();
        let r2 = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };

        let within = |band: f64| errors.iter().filter(|e| e.abs() <= band).count() as f64 / count;

        Self {
            mae,
            rmse,
            r2,
            within_20g: within(ACCURACY_BANDS_G[0]),
            within_30g: within(ACCURACY_BANDS_G[1]),
            within_50g: within(ACCURACY_BANDS_G[2]),
            n,
        }
    }
}

/// Relative importance of one feature in the forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Column name
    pub feature: String,
    /// Normalised mean impurity decrease
    pub importance: f64,
}

/// Everything measured during one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Model A on the held-out split
    pub forest: RegressionMetrics,
    /// Model B on the held-out split
    pub network: RegressionMetrics,
    /// Blend on the held-out split
    pub ensemble: RegressionMetrics,
    /// Blend MAE on the training split
    pub train_mae: f64,
    /// Blend weights used
    pub weights: EnsembleWeights,
    /// Rows in the corpus
    pub n_samples: usize,
    /// Rows used for fitting
    pub n_train: usize,
    /// Rows held out
    pub n_test: usize,
    /// Feature count
    pub n_features: usize,
    /// Epochs the network ran before early stopping
    pub network_epochs: usize,
    /// Ten most important forest features, descending
    pub top_features: Vec<FeatureImportance>,
}

impl TrainingReport {
    /// Check the held-out blend against a promotion gate.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the gate is not met
    pub fn check_gate(&self, gate: &QualityGate) -> std::result::Result<(), String> {
        if self.ensemble.within_50g < gate.min_within_50g {
            return Err(format!(
                "only {:.1}% of held-out predictions within 50g (gate: {:.1}%)",
                self.ensemble.within_50g * 100.0,
                gate.min_within_50g * 100.0
            ));
        }
        if let Some(max_mae) = gate.max_test_mae {
            if self.ensemble.mae > max_mae {
                return Err(format!(
                    "held-out MAE {:.2}g exceeds gate {max_mae:.2}g",
                    self.ensemble.mae
                ));
            }
        }
        Ok(())
    }
}
