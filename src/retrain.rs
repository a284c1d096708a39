//! Retraining and promotion
//!
//! A retrain trains on the whole corpus (synthetic at unit weight, real at
//! the configured multiplier), checks the held-out quality gate, backs up
//! the active version, writes the new one and only then moves the active
//! pointer. Any failure before the pointer moves leaves serving untouched.

use crate::artifact::{backup_key, ArtifactStore, CorpusCounts, ModelArtifactSet, ModelVersion};
use crate::config::EngineConfig;
use crate::corpus::CorpusStore;
use crate::model::{EnsembleModel, TrainingReport};
use crate::registry::ModelRegistry;
use crate::{Error, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};

/// What a successful retrain promoted
#[derive(Debug, Clone)]
pub struct RetrainOutcome {
    /// Newly active version
    pub version: ModelVersion,
    /// Version it replaced
    pub parent_version: Option<ModelVersion>,
    /// Backup key of the replaced version
    pub backup_key: Option<String>,
    /// Corpus composition
    pub counts: CorpusCounts,
    /// Held-out evaluation
    pub report: TrainingReport,
}

/// Single-writer retrain pipeline.
pub struct Retrainer {
    corpus: Arc<dyn CorpusStore>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<ModelRegistry>,
    config: EngineConfig,
    writer: Mutex<()>,
}

impl Retrainer {
    /// Pipeline over the given stores.
    #[must_use]
    pub fn new(
        corpus: Arc<dyn CorpusStore>,
        artifacts: Arc<dyn ArtifactStore>,
        registry: Arc<ModelRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            corpus,
            artifacts,
            registry,
            config,
            writer: Mutex::new(()),
        }
    }

    /// Real samples recorded since the active version was trained (all of
    /// them when nothing is active).
    ///
    /// # Errors
    ///
    /// Returns an error if the corpus or the active metadata cannot be read
    pub fn new_real_samples(&self) -> Result<usize> {
        let real = self.corpus.real_count()?;
        let trained_on = match self.artifacts.active_version()? {
            Some(version) => self.artifacts.load_metadata(version)?.real_samples,
            None => 0,
        };
        Ok(real.saturating_sub(trained_on))
    }

    /// True once at least `min_new_samples` real samples arrived since the
    /// active version was trained.
    ///
    /// # Errors
    ///
    /// See [`new_real_samples`](Self::new_real_samples)
    pub fn should_retrain(&self, min_new_samples: usize) -> Result<bool> {
        Ok(self.new_real_samples()? >= min_new_samples)
    }

    /// Train, gate, back up, write and promote. Blocks for the duration of
    /// training; concurrent calls run one after another.
    ///
    /// # Errors
    ///
    /// `Error::TrainingFailure` when training fails or the quality gate is
    /// not met; store errors otherwise. The active version is unchanged in
    /// every error case.
    #[tracing::instrument(skip(self))]
    pub fn retrain(&self) -> Result<RetrainOutcome> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self.retrain_locked();
        match &result {
            Ok(outcome) => tracing::info!(
                version = %outcome.version,
                parent = ?outcome.parent_version.map(|v| v.to_string()),
                mae = outcome.report.ensemble.mae,
                within_50g = outcome.report.ensemble.within_50g,
                "retrained model promoted"
            ),
            Err(e) => tracing::error!(error = %e, "retrain failed; active model unchanged"),
        }
        result
    }

    fn retrain_locked(&self) -> Result<RetrainOutcome> {
        let synthetic = self.corpus.load_synthetic()?;
        let real = self.corpus.load_real()?;
        let counts = CorpusCounts {
            synthetic: synthetic.len(),
            real: real.len(),
        };
        tracing::info!(synthetic = counts.synthetic, real = counts.real, "retraining");

        let samples: Vec<_> = synthetic.into_iter().chain(real).collect();
        let (model, report) = EnsembleModel::train(&samples, &self.config)?;
        report
            .check_gate(&self.config.retrain.quality_gate)
            .map_err(|reason| Error::TrainingFailure(format!("quality gate not met: {reason}")))?;

        let parent_version = self.artifacts.active_version()?;
        let version = self.artifacts.next_version()?;
        let set = ModelArtifactSet::new(version, parent_version, model, report.clone(), counts);

        let backup_key = match parent_version {
            Some(parent) => {
                let key = backup_key(Utc::now(), parent);
                self.artifacts.backup(parent, &key)?;
                Some(key)
            }
            None => None,
        };

        self.artifacts.write_version(&set)?;
        self.artifacts.activate(version)?;
        self.registry.swap(Arc::new(set));

        Ok(RetrainOutcome {
            version,
            parent_version,
            backup_key,
            counts,
            report,
        })
    }
}
