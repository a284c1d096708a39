//! Engine facade
//!
//! Wires the corpus, artifact store, active-model registry, prediction
//! service and retrainer together. Recording a harvest appends the sample
//! durably and, when enough new real samples have accumulated, starts a
//! retrain on the blocking pool without waiting for it.

use crate::artifact::{ArtifactMetadata, ArtifactStore, FsArtifactStore, ModelVersion};
use crate::config::EngineConfig;
use crate::corpus::{CorpusStore, ParquetCorpusStore, TrainingSample};
use crate::daily_log::DailyLog;
use crate::prediction::{PredictionResult, PredictionService};
use crate::registry::{ModelProvider, ModelRegistry};
use crate::retrain::{RetrainOutcome, Retrainer};
use crate::seed::SeedProfile;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A retrain running in the background.
#[derive(Debug)]
pub struct RetrainHandle(JoinHandle<Result<RetrainOutcome>>);

impl RetrainHandle {
    /// Wait for the retrain to finish.
    ///
    /// # Errors
    ///
    /// The retrain's own error, or `Error::TrainingFailure` if the task panicked
    pub async fn wait(self) -> Result<RetrainOutcome> {
        self.0
            .await
            .map_err(|e| Error::TrainingFailure(format!("retrain task did not complete: {e}")))?
    }
}

/// What recording a harvest did about retraining
#[derive(Debug)]
pub enum RetrainTrigger {
    /// Not enough new real samples yet
    NotDue {
        /// Real samples since the active version was trained
        new_samples: usize,
        /// Samples needed to trigger
        threshold: usize,
    },
    /// A retrain was already running; this harvest will be included next time
    AlreadyRunning,
    /// A retrain was started
    Scheduled(RetrainHandle),
    /// The sample was recorded but the trigger could not be evaluated
    CheckFailed(String),
}

/// Result of [`YieldEngine::record_harvest`]
#[derive(Debug)]
pub struct HarvestReceipt {
    /// Real samples in the corpus after the append
    pub real_samples: usize,
    /// Retrain decision
    pub retrain: RetrainTrigger,
}

/// Snapshot for operators
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Version the artifact store points at
    pub active_version: Option<ModelVersion>,
    /// True when that version is loaded and serving
    pub serving: bool,
    /// Its metadata
    pub active_metadata: Option<ArtifactMetadata>,
    /// All stored versions
    pub versions: Vec<ModelVersion>,
    /// All backup keys
    pub backups: Vec<String>,
    /// Real samples in the corpus
    pub real_samples: usize,
    /// Real samples since the active version was trained
    pub new_real_samples: usize,
    /// Retrain threshold
    pub retrain_threshold: usize,
    /// A background retrain is in progress
    pub retrain_running: bool,
}

struct ClearOnDrop(Arc<AtomicBool>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Yield prediction and continual-learning engine.
pub struct YieldEngine {
    config: EngineConfig,
    corpus: Arc<dyn CorpusStore>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<ModelRegistry>,
    retrainer: Arc<Retrainer>,
    predictions: PredictionService,
    retraining: Arc<AtomicBool>,
}

impl YieldEngine {
    /// Open the on-disk engine under `config.paths.data_dir`.
    ///
    /// # Errors
    ///
    /// `Error::Config` for an invalid configuration; store errors otherwise
    pub fn open(config: EngineConfig) -> Result<Self> {
        let corpus = ParquetCorpusStore::open(&config.paths, config.retrain.real_sample_weight)?;
        let artifacts = FsArtifactStore::open(config.paths.models_dir())?;
        Self::with_stores(config, Arc::new(corpus), Arc::new(artifacts))
    }

    /// Engine over caller-supplied stores.
    ///
    /// An active version trained under another feature schema is not
    /// loaded; predictions degrade until a retrain promotes a compatible one.
    ///
    /// # Errors
    ///
    /// `Error::Config` for an invalid configuration, or an error loading a
    /// corrupt active artifact set
    pub fn with_stores(
        config: EngineConfig,
        corpus: Arc<dyn CorpusStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ModelRegistry::new());
        match artifacts.load_active() {
            Ok(Some(set)) => {
                registry.swap(Arc::new(set));
            }
            Ok(None) => tracing::info!("no active model yet; predictions unavailable until first training"),
            Err(e @ Error::SchemaMismatch { .. }) => {
                tracing::warn!(error = %e, "active model incompatible with current features; retrain required");
            }
            Err(e) => return Err(e),
        }

        let retrainer = Arc::new(Retrainer::new(
            Arc::clone(&corpus),
            Arc::clone(&artifacts),
            Arc::clone(&registry),
            config.clone(),
        ));
        let provider: Arc<dyn ModelProvider> = registry.clone();

        Ok(Self {
            config,
            corpus,
            artifacts,
            registry,
            retrainer,
            predictions: PredictionService::new(provider),
            retraining: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prediction service bound to the active model
    #[must_use]
    pub const fn predictions(&self) -> &PredictionService {
        &self.predictions
    }

    /// Predict one tray.
    ///
    /// # Errors
    ///
    /// See [`PredictionService::predict`]
    pub fn predict(&self, seed: &SeedProfile, logs: &[DailyLog]) -> Result<PredictionResult> {
        self.predictions.predict(seed, logs)
    }

    /// Predict, degrading to base yield on model-side failures.
    ///
    /// # Errors
    ///
    /// See [`PredictionService::predict_or_degraded`]
    pub fn predict_or_degraded(
        &self,
        seed: &SeedProfile,
        logs: &[DailyLog],
        units: u32,
    ) -> Result<PredictionResult> {
        self.predictions.predict_or_degraded(seed, logs, units)
    }

    /// Store the synthetic corpus (once).
    ///
    /// # Errors
    ///
    /// `Error::CorpusWrite` if one already exists or the write fails
    pub fn import_synthetic(&self, samples: Vec<TrainingSample>) -> Result<usize> {
        self.corpus.import_synthetic(samples)
    }

    /// Record a completed harvest and start a retrain if one is due.
    ///
    /// Returns once the sample is durable; a triggered retrain continues in
    /// the background.
    ///
    /// # Errors
    ///
    /// `Error::Data` for invalid inputs; `Error::CorpusWrite` if the sample
    /// was not recorded, in which case the caller must retry
    pub async fn record_harvest(
        &self,
        seed: &SeedProfile,
        logs: &[DailyLog],
        final_yield: f64,
    ) -> Result<HarvestReceipt> {
        let sample =
            TrainingSample::from_harvest(seed, logs, final_yield, self.config.features.tray_area_cm2)?;
        let corpus = Arc::clone(&self.corpus);
        let real_samples = tokio::task::spawn_blocking(move || corpus.append_real(sample))
            .await
            .map_err(|e| Error::CorpusWrite(format!("append task did not complete: {e}")))??;
        tracing::info!(seed_type = %seed.seed_type, final_yield, real_samples, "harvest recorded");

        let threshold = self.config.retrain.min_new_samples;
        let retrain = match self.retrainer.new_real_samples() {
            Ok(new_samples) if new_samples < threshold => RetrainTrigger::NotDue {
                new_samples,
                threshold,
            },
            Ok(_) => self.spawn_retrain(),
            Err(e) => {
                tracing::error!(error = %e, "could not evaluate retrain trigger");
                RetrainTrigger::CheckFailed(e.to_string())
            }
        };

        Ok(HarvestReceipt {
            real_samples,
            retrain,
        })
    }

    fn try_claim(&self) -> Option<ClearOnDrop> {
        self.retraining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ClearOnDrop(Arc::clone(&self.retraining)))
    }

    fn spawn_retrain(&self) -> RetrainTrigger {
        let Some(claim) = self.try_claim() else {
            tracing::info!("retrain already running; new samples will be picked up next time");
            return RetrainTrigger::AlreadyRunning;
        };
        let retrainer = Arc::clone(&self.retrainer);
        RetrainTrigger::Scheduled(RetrainHandle(tokio::task::spawn_blocking(move || {
            let _claim = claim;
            retrainer.retrain()
        })))
    }

    /// Retrain now on the calling thread, regardless of the trigger.
    ///
    /// # Errors
    ///
    /// `Error::TrainingFailure` if a retrain is already running or training
    /// fails; store errors otherwise
    pub fn retrain_now(&self) -> Result<RetrainOutcome> {
        let Some(_claim) = self.try_claim() else {
            return Err(Error::TrainingFailure("a retrain is already running".to_string()));
        };
        self.retrainer.retrain()
    }

    /// Operator snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be read
    pub fn status(&self) -> Result<EngineStatus> {
        let active_version = self.artifacts.active_version()?;
        let active_metadata = active_version
            .map(|v| self.artifacts.load_metadata(v))
            .transpose()?;
        let serving = match (active_version, self.registry.current()) {
            (Some(active), Some(model)) => model.version() == active,
            _ => false,
        };
        Ok(EngineStatus {
            active_version,
            serving,
            active_metadata,
            versions: self.artifacts.versions()?,
            backups: self.artifacts.backups()?,
            real_samples: self.corpus.real_count()?,
            new_real_samples: self.retrainer.new_real_samples()?,
            retrain_threshold: self.config.retrain.min_new_samples,
            retrain_running: self.retraining.load(Ordering::Acquire),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;
    use crate::corpus::MemoryCorpusStore;
    use crate::seed::Difficulty;

    fn engine(min_new_samples: usize) -> YieldEngine {
        let mut config = EngineConfig::default();
        config.retrain.min_new_samples = min_new_samples;
        YieldEngine::with_stores(
            config,
            Arc::new(MemoryCorpusStore::new(2.0)),
            Arc::new(MemoryArtifactStore::new()),
        )
        .unwrap()
    }

    fn radish() -> SeedProfile {
        SeedProfile::new("radish", "Radish", Difficulty::Easy, 350.0, 8, 21.0, 50.0)
    }

    #[tokio::test]
    async fn test_harvest_while_retraining_reports_already_running() {
        let engine = engine(1);
        let claim = engine.try_claim().unwrap();

        let logs = [DailyLog::new(1, true).with_temperature(21.0)];
        let receipt = engine.record_harvest(&radish(), &logs, 300.0).await.unwrap();
        assert_eq!(receipt.real_samples, 1);
        assert!(matches!(receipt.retrain, RetrainTrigger::AlreadyRunning));
        assert!(engine.status().unwrap().retrain_running);
        assert!(matches!(engine.retrain_now(), Err(Error::TrainingFailure(_))));

        drop(claim);
        assert!(!engine.status().unwrap().retrain_running);
    }

    #[tokio::test]
    async fn test_invalid_harvest_is_not_recorded() {
        let engine = engine(10);
        let logs = [DailyLog::new(1, true)];
        assert!(matches!(
            engine.record_harvest(&radish(), &logs, -5.0).await,
            Err(Error::Data(_))
        ));
        assert_eq!(engine.status().unwrap().real_samples, 0);
    }

    #[tokio::test]
    async fn test_failed_background_retrain_releases_guard() {
        // One real sample is below the minimum corpus size
        let engine = engine(1);
        let logs = [DailyLog::new(1, true)];
        let receipt = engine.record_harvest(&radish(), &logs, 300.0).await.unwrap();
        let RetrainTrigger::Scheduled(handle) = receipt.retrain else {
            panic!("retrain should have been scheduled");
        };
        assert!(matches!(handle.wait().await, Err(Error::TrainingFailure(_))));

        let status = engine.status().unwrap();
        assert!(!status.retrain_running);
        assert_eq!(status.active_version, None);
        assert!(!status.serving);
    }
}
