//! Versioned model artifact sets

use crate::config::EnsembleWeights;
use crate::features::{FeatureEncoder, FeatureSchema, FeatureVector, StandardScaler};
use crate::model::{EnsembleModel, NeuralNetwork, RandomForest, TrainingReport, YieldModel};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monotonic artifact version, rendered `v000001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersion(u64);

impl ModelVersion {
    /// First version ever promoted
    pub const FIRST: Self = Self(1);

    /// Wrap a raw version number
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// Raw version number
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0
    }

    /// The version after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{:06}", self.0)
    }
}

impl FromStr for ModelVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .strip_prefix('v')
            .and_then(|n| n.parse().ok())
            .map(Self)
            .ok_or_else(|| Error::Artifact(format!("'{s}' is not a model version (expected v000001)")))
    }
}

/// Counts of each sample population a version was trained on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusCounts {
    /// Synthetic rows
    pub synthetic: usize,
    /// Real harvest rows
    pub real: usize,
}

/// Everything recorded about a trained version besides its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// This version
    pub version: ModelVersion,
    /// Version that was active when this one was trained
    pub parent_version: Option<ModelVersion>,
    /// Feature schema version
    pub schema_version: u32,
    /// Ordered feature column names
    pub feature_columns: Vec<String>,
    /// Blend weights
    pub weights: EnsembleWeights,
    /// When training finished
    pub last_retrain: DateTime<Utc>,
    /// Rows in the training corpus
    pub total_samples: usize,
    /// Synthetic rows in the training corpus
    pub synthetic_samples: usize,
    /// Real rows in the training corpus; drives the retrain trigger
    pub real_samples: usize,
    /// Held-out evaluation
    pub report: TrainingReport,
}

impl ArtifactMetadata {
    /// Feature schema recorded for this version
    #[must_use]
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.schema_version, self.feature_columns.clone())
    }
}

/// A promotable unit: ensemble parameters plus their metadata.
///
/// Sets are written once under their version and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifactSet {
    metadata: ArtifactMetadata,
    model: EnsembleModel,
}

impl ModelArtifactSet {
    /// Package a freshly trained model.
    #[must_use]
    pub fn new(
        version: ModelVersion,
        parent_version: Option<ModelVersion>,
        model: EnsembleModel,
        report: TrainingReport,
        counts: CorpusCounts,
    ) -> Self {
        let schema = model.schema();
        let metadata = ArtifactMetadata {
            version,
            parent_version,
            schema_version: schema.version(),
            feature_columns: schema.columns().to_vec(),
            weights: model.weights(),
            last_retrain: Utc::now(),
            total_samples: counts.synthetic + counts.real,
            synthetic_samples: counts.synthetic,
            real_samples: counts.real,
            report,
        };
        Self { metadata, model }
    }

    /// Reassemble a stored set.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaMismatch` if the set was trained under another
    /// feature schema, `Error::Artifact` if the parts are inconsistent
    pub fn from_parts(
        metadata: ArtifactMetadata,
        encoder: FeatureEncoder,
        scaler: StandardScaler,
        forest: RandomForest,
        network: NeuralNetwork,
    ) -> Result<Self> {
        let model = EnsembleModel::from_parts(
            metadata.schema(),
            metadata.weights,
            encoder,
            scaler,
            forest,
            network,
        )?;
        Ok(Self { metadata, model })
    }

    /// Version of this set
    #[must_use]
    pub const fn version(&self) -> ModelVersion {
        self.metadata.version
    }

    /// Metadata
    #[must_use]
    pub const fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Ensemble parameters
    #[must_use]
    pub const fn model(&self) -> &EnsembleModel {
        &self.model
    }
}

impl YieldModel for ModelArtifactSet {
    fn version(&self) -> ModelVersion {
        self.metadata.version
    }

    fn encoder(&self) -> &FeatureEncoder {
        self.model.encoder()
    }

    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<f64>> {
        self.model.predict(features)
    }
}
