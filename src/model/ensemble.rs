//! Weighted blend of the forest and the network

use super::forest::RandomForest;
use super::metrics::{FeatureImportance, RegressionMetrics, TrainingReport};
use super::network::NeuralNetwork;
use super::split::train_test_split;
use crate::config::{EngineConfig, EnsembleWeights};
use crate::corpus::TrainingSample;
use crate::features::{FeatureEncoder, FeatureSchema, FeatureVector, SeedVocabulary, StandardScaler};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const TOP_FEATURES: usize = 10;

fn column(parts: &[ComponentPrediction], pick: fn(&ComponentPrediction) -> f64) -> Vec<f64> {
    parts.iter().map(pick).collect()
}

/// Per-model outputs for one vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentPrediction {
    /// Model A output (g)
    pub forest: f64,
    /// Model B output (g)
    pub network: f64,
    /// `forest_weight * forest + network_weight * network`
    pub blended: f64,
}

/// Trained two-model ensemble with its frozen preprocessing.
///
/// The encoder (vocabulary + tray area), scaler and schema travel with the
/// sub-models: a vector is only ever scored by the pipeline that trained on
/// its layout.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleModel {
    schema: FeatureSchema,
    weights: EnsembleWeights,
    encoder: FeatureEncoder,
    scaler: StandardScaler,
    forest: RandomForest,
    network: NeuralNetwork,
}

impl EnsembleModel {
    /// Train both sub-models on one corpus and evaluate on a held-out split.
    ///
    /// The split is seeded from `config.retrain.split_seed`; the scaler is
    /// fitted on the training rows only. Sample weights enter both
    /// sub-models' losses.
    ///
    /// # Errors
    ///
    /// Returns `Error::TrainingFailure` for too few samples, non-finite
    /// inputs, a constant target, or a sub-model that fails to fit
    #[tracing::instrument(skip_all, fields(samples = samples.len()))]
    pub fn train(samples: &[TrainingSample], config: &EngineConfig) -> Result<(Self, TrainingReport)> {
        let min_samples = config.retrain.min_samples.max(2);
        if samples.len() < min_samples {
            return Err(Error::TrainingFailure(format!(
                "need at least {min_samples} samples, have {}",
                samples.len()
            )));
        }
        for (i, sample) in samples.iter().enumerate() {
            if !sample.features.is_finite()
                || !sample.final_yield.is_finite()
                || !(sample.sample_weight > 0.0 && sample.sample_weight.is_finite())
            {
                return Err(Error::TrainingFailure(format!(
                    "sample {i} ({}) has non-finite features, yield or weight",
                    sample.seed_type
                )));
            }
        }
        let first_yield = samples[0].final_yield;
        if samples.iter().all(|s| (s.final_yield - first_yield).abs() <= f64::EPSILON) {
            return Err(Error::TrainingFailure(format!(
                "every sample has the same yield ({first_yield}g); the target is degenerate"
            )));
        }
        config.ensemble.validate()?;

        let vocabulary = SeedVocabulary::fit(samples.iter().map(|s| s.seed_type.as_str()))?;
        let encoder = FeatureEncoder::new(vocabulary).with_tray_area(config.features.tray_area_cm2);
        let schema = encoder.schema();

        let rows: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| encoder.encode_features(&s.seed_type, &s.features).vector.values().to_vec())
            .collect();
        let targets: Vec<f64> = samples.iter().map(|s| s.final_yield).collect();

        let split = train_test_split(samples.len(), config.retrain.test_fraction, config.retrain.split_seed)?;
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
            (
                idx.iter().map(|&i| rows[i].clone()).collect(),
                idx.iter().map(|&i| targets[i]).collect(),
                idx.iter().map(|&i| samples[i].sample_weight).collect(),
            )
        };
        let (train_x, train_y, train_w) = pick(&split.train);
        let (test_x, test_y, _) = pick(&split.test);

        let scaler = StandardScaler::fit(&train_x)?;
        let train_scaled = scaler.transform_all(&train_x)?;
        let test_scaled = scaler.transform_all(&test_x)?;

        let forest = RandomForest::fit(&train_scaled, &train_y, &train_w, &config.forest)?;
        let (network, fit) = NeuralNetwork::fit(&train_scaled, &train_y, &train_w, &config.network)?;

        let model = Self {
            schema,
            weights: config.ensemble,
            encoder,
            scaler,
            forest,
            network,
        };

        let test_parts = model.score_scaled(&test_scaled)?;
        let train_parts = model.score_scaled(&train_scaled)?;
        let forest_metrics = RegressionMetrics::evaluate(&test_y, &column(&test_parts, |p| p.forest));
        let network_metrics = RegressionMetrics::evaluate(&test_y, &column(&test_parts, |p| p.network));
        let ensemble_metrics = RegressionMetrics::evaluate(&test_y, &column(&test_parts, |p| p.blended));
        let train_metrics = RegressionMetrics::evaluate(&train_y, &column(&train_parts, |p| p.blended));

        let mut top_features: Vec<FeatureImportance> = model
            .schema
            .columns()
            .iter()
            .zip(model.forest.feature_importances())
            .map(|(name, importance)| FeatureImportance {
                feature: name.clone(),
                importance: *importance,
            })
            .collect();
        top_features.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        top_features.truncate(TOP_FEATURES);

        tracing::debug!(mae = forest_metrics.mae, r2 = forest_metrics.r2, "forest held-out");
        tracing::debug!(
            mae = network_metrics.mae,
            r2 = network_metrics.r2,
            epochs = fit.epochs_run,
            "network held-out"
        );

        let report = TrainingReport {
            forest: forest_metrics,
            network: network_metrics,
            ensemble: ensemble_metrics,
            train_mae: train_metrics.mae,
            weights: config.ensemble,
            n_samples: samples.len(),
            n_train: split.train.len(),
            n_test: split.test.len(),
            n_features: model.schema.len(),
            network_epochs: fit.epochs_run,
            top_features,
        };

        tracing::info!(
            mae = report.ensemble.mae,
            rmse = report.ensemble.rmse,
            r2 = report.ensemble.r2,
            within_50g = report.ensemble.within_50g,
            "ensemble trained"
        );

        Ok((model, report))
    }

    /// Reassemble a model from stored parts, validating that they fit together.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaMismatch` when the stored schema is not the
    /// current one, and `Error::Artifact` when the parts disagree on width
    /// or are structurally malformed
    pub fn from_parts(
        schema: FeatureSchema,
        weights: EnsembleWeights,
        encoder: FeatureEncoder,
        scaler: StandardScaler,
        forest: RandomForest,
        network: NeuralNetwork,
    ) -> Result<Self> {
        FeatureSchema::current().check_compatible(&schema)?;
        weights
            .validate()
            .map_err(|e| Error::Artifact(format!("stored ensemble weights: {e}")))?;
        encoder.vocabulary().validate()?;
        forest.validate()?;
        network.validate()?;

        let width = schema.len();
        if scaler.width() != width || forest.n_features() != width || network.n_inputs() != width {
            return Err(Error::Artifact(format!(
                "artifact parts disagree on width: schema {width}, scaler {}, forest {}, network {}",
                scaler.width(),
                forest.n_features(),
                network.n_inputs()
            )));
        }

        Ok(Self {
            schema,
            weights,
            encoder,
            scaler,
            forest,
            network,
        })
    }

    fn score_scaled(&self, rows: &[Vec<f64>]) -> Result<Vec<ComponentPrediction>> {
        let network = self.network.predict_batch(rows)?;
        rows.iter()
            .zip(network)
            .map(|(row, network)| {
                let forest = self.forest.predict(row)?;
                Ok(ComponentPrediction {
                    forest,
                    network,
                    blended: self.weights.blend(forest, network),
                })
            })
            .collect()
    }

    /// Score each vector with both sub-models.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaMismatch` before any scaling if a vector was
    /// built for another schema
    pub fn predict_components(&self, vectors: &[FeatureVector]) -> Result<Vec<ComponentPrediction>> {
        let scaled = vectors
            .iter()
            .map(|vector| {
                self.schema.check(vector)?;
                self.scaler.transform(vector.values())
            })
            .collect::<Result<Vec<_>>>()?;
        self.score_scaled(&scaled)
    }

    /// Blended grams per vector.
    ///
    /// # Errors
    ///
    /// See [`predict_components`](Self::predict_components)
    pub fn predict(&self, vectors: &[FeatureVector]) -> Result<Vec<f64>> {
        Ok(self
            .predict_components(vectors)?
            .into_iter()
            .map(|p| p.blended)
            .collect())
    }

    /// Feature layout the model was trained on
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Blend weights
    #[must_use]
    pub const fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Encoder captured at training time
    #[must_use]
    pub const fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Frozen scaler
    #[must_use]
    pub const fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Model A
    #[must_use]
    pub const fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Model B
    #[must_use]
    pub const fn network(&self) -> &NeuralNetwork {
        &self.network
    }
}
