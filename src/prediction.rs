//! Yield prediction for a crop in progress
//!
//! ```text
//! seed + logs ─> FeatureEncoder ─> YieldModel ─> grams ─┬─> status bucket
//!                                                      └─> diagnose(latest log)
//! ```
//!
//! The model always scores a single tray. Multi-tray requests scale the
//! result afterwards.

use crate::artifact::ModelVersion;
use crate::daily_log::{ordered_history, DailyLog};
use crate::registry::ModelProvider;
use crate::seed::SeedProfile;
use crate::suggestions::{diagnose, Suggestion};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Efficiency at or above which a crop is excellent
pub const EXCELLENT_EFFICIENCY: f64 = 0.95;
/// Efficiency at or above which a crop is good
pub const GOOD_EFFICIENCY: f64 = 0.85;
/// Efficiency at or above which a crop is fair
pub const FAIR_EFFICIENCY: f64 = 0.70;

/// Overall outlook of a crop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YieldStatus {
    /// Efficiency >= 0.95
    Excellent,
    /// Efficiency >= 0.85
    Good,
    /// Efficiency >= 0.70
    Fair,
    /// Below 0.70
    Poor,
    /// No prediction could be made; figures are the seed's base yield
    Unavailable,
}

impl YieldStatus {
    /// Bucket an (unrounded) efficiency.
    #[must_use]
    pub fn from_efficiency(efficiency: f64) -> Self {
        if efficiency >= EXCELLENT_EFFICIENCY {
            Self::Excellent
        } else if efficiency >= GOOD_EFFICIENCY {
            Self::Good
        } else if efficiency >= FAIR_EFFICIENCY {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Prediction for one crop (possibly spanning several trays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted grams, 0.1 g
    pub predicted_yield: f64,
    /// Seed base yield times units
    pub base_yield: f64,
    /// `predicted / base`, 0.001
    pub efficiency: f64,
    /// `base - predicted`, 0.1 g
    pub potential_loss: f64,
    /// Outlook
    pub status: YieldStatus,
    /// Most urgent first
    pub suggestions: Vec<Suggestion>,
    /// Trays covered
    pub units: u32,
    /// Model that produced the figures
    pub model_version: Option<ModelVersion>,
    /// Non-fatal issues (unknown variety, degraded mode)
    pub warnings: Vec<String>,
}

fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

impl PredictionResult {
    fn ready_to_start(seed: &SeedProfile, units: u32) -> Self {
        let base = seed.base_yield * f64::from(units);
        Self {
            predicted_yield: round_to(base, 0.1),
            base_yield: base,
            efficiency: 1.0,
            potential_loss: 0.0,
            status: YieldStatus::Excellent,
            suggestions: vec![Suggestion::ready_to_start(seed)],
            units,
            model_version: None,
            warnings: Vec::new(),
        }
    }

    /// Base-yield-only result used when no prediction can be made.
    #[must_use]
    pub fn unavailable(seed: &SeedProfile, units: u32, reason: String) -> Self {
        let base = seed.base_yield * f64::from(units);
        Self {
            predicted_yield: round_to(base, 0.1),
            base_yield: base,
            efficiency: 1.0,
            potential_loss: 0.0,
            status: YieldStatus::Unavailable,
            suggestions: Vec::new(),
            units,
            model_version: None,
            warnings: vec![reason],
        }
    }
}

/// Produces [`PredictionResult`]s from whatever model is active.
#[derive(Clone)]
pub struct PredictionService {
    models: Arc<dyn ModelProvider>,
}

impl PredictionService {
    /// Service reading the active model from `models` on every call.
    #[must_use]
    pub fn new(models: Arc<dyn ModelProvider>) -> Self {
        Self { models }
    }

    /// Predict one tray.
    ///
    /// # Errors
    ///
    /// See [`predict_for_units`](Self::predict_for_units)
    pub fn predict(&self, seed: &SeedProfile, logs: &[DailyLog]) -> Result<PredictionResult> {
        self.predict_for_units(seed, logs, 1)
    }

    /// Predict `units` trays grown under the same log history.
    ///
    /// An empty history returns the seed's base yield without touching a
    /// model.
    ///
    /// # Errors
    ///
    /// - `Error::Data` for an invalid seed or malformed logs
    /// - `Error::InvalidInput` for `units == 0`
    /// - `Error::NoActiveModel` before the first promotion
    /// - `Error::SchemaMismatch` if the active model was trained on another layout
    pub fn predict_for_units(
        &self,
        seed: &SeedProfile,
        logs: &[DailyLog],
        units: u32,
    ) -> Result<PredictionResult> {
        if units == 0 {
            return Err(Error::InvalidInput("units must be at least 1".to_string()));
        }
        seed.validate()?;
        let history = ordered_history(logs)?;
        let Some(latest) = history.last() else {
            return Ok(PredictionResult::ready_to_start(seed, units));
        };

        let model = self.models.current().ok_or(Error::NoActiveModel)?;
        let encoding = model.encoder().encode(seed, &history)?;
        let raw = model
            .predict(std::slice::from_ref(&encoding.vector))?
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidInput("model returned no prediction".to_string()))?
            .max(0.0);

        let efficiency = raw / seed.base_yield;
        let scale = f64::from(units);
        let predicted = round_to(raw * scale, 0.1);
        let base = seed.base_yield * scale;

        Ok(PredictionResult {
            predicted_yield: predicted,
            base_yield: base,
            efficiency: round_to(efficiency, 0.001),
            potential_loss: round_to(base - raw * scale, 0.1),
            status: YieldStatus::from_efficiency(efficiency),
            suggestions: diagnose(latest, seed, predicted),
            units,
            model_version: Some(model.version()),
            warnings: encoding
                .unknown_category
                .map(|u| u.to_string())
                .into_iter()
                .collect(),
        })
    }

    /// Like [`predict_for_units`](Self::predict_for_units), but any failure
    /// not caused by the caller's data degrades to
    /// [`YieldStatus::Unavailable`] instead of an error.
    ///
    /// # Errors
    ///
    /// Only `Error::Data` and `Error::InvalidInput`
    pub fn predict_or_degraded(
        &self,
        seed: &SeedProfile,
        logs: &[DailyLog],
        units: u32,
    ) -> Result<PredictionResult> {
        match self.predict_for_units(seed, logs, units) {
            Ok(result) => Ok(result),
            Err(e) if e.is_data_error() => Err(e),
            Err(e) => {
                tracing::warn!(seed_type = %seed.seed_type, error = %e, "prediction unavailable, serving base yield");
                Ok(PredictionResult::unavailable(seed, units, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureEncoder, FeatureVector, SeedVocabulary};
    use crate::model::YieldModel;
    use crate::registry::ModelRegistry;
    use crate::seed::Difficulty;
    use crate::suggestions::SuggestionKind;

    struct Constant(f64);

    impl YieldModel for Constant {
        fn version(&self) -> ModelVersion {
            ModelVersion::new(9)
        }
        fn encoder(&self) -> &FeatureEncoder {
            static ENCODER: std::sync::OnceLock<FeatureEncoder> = std::sync::OnceLock::new();
            ENCODER.get_or_init(|| {
                FeatureEncoder::new(SeedVocabulary::fit(["radish", "sunflower"]).unwrap())
            })
        }
        fn predict(&self, features: &[FeatureVector]) -> Result<Vec<f64>> {
            Ok(vec![self.0; features.len()])
        }
    }

    fn service(grams: f64) -> PredictionService {
        PredictionService::new(Arc::new(ModelRegistry::with_model(Arc::new(Constant(grams)))))
    }

    fn sunflower() -> SeedProfile {
        SeedProfile::new("sunflower", "Sunflower", Difficulty::Easy, 600.0, 10, 22.5, 50.0)
    }

    fn calm_logs() -> Vec<DailyLog> {
        vec![DailyLog::new(1, true).with_temperature(22.5).with_humidity(50.0)]
    }

    #[test]
    fn test_empty_history_short_circuits() {
        let empty = PredictionService::new(Arc::new(ModelRegistry::new()));
        let result = empty.predict(&sunflower(), &[]).unwrap();
        assert!((result.predicted_yield - 600.0).abs() < f64::EPSILON);
        assert!((result.efficiency - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.status, YieldStatus::Excellent);
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].kind, SuggestionKind::ReadyToStart);
    }

    #[test]
    fn test_status_buckets_on_unrounded_efficiency() {
        // 0.84996 rounds to 0.85 but is still fair
        let result = service(509.976).predict(&sunflower(), &calm_logs()).unwrap();
        assert!((result.efficiency - 0.85).abs() < 1e-9);
        assert_eq!(result.status, YieldStatus::Fair);
    }

    #[test]
    fn test_rounding_and_loss() {
        let result = service(512.34).predict(&sunflower(), &calm_logs()).unwrap();
        assert!((result.predicted_yield - 512.3).abs() < 1e-9);
        assert!((result.potential_loss - 87.7).abs() < 1e-9);
        assert_eq!(result.status, YieldStatus::Good);
        assert_eq!(result.model_version, Some(ModelVersion::new(9)));
    }

    #[test]
    fn test_units_scale_after_inference() {
        let one = service(500.0).predict(&sunflower(), &calm_logs()).unwrap();
        let three = service(500.0).predict_for_units(&sunflower(), &calm_logs(), 3).unwrap();
        assert!((three.predicted_yield - 1500.0).abs() < 1e-9);
        assert!((three.base_yield - 1800.0).abs() < 1e-9);
        assert!((three.efficiency - one.efficiency).abs() < f64::EPSILON);
        assert!(service(500.0).predict_for_units(&sunflower(), &calm_logs(), 0).is_err());
    }

    #[test]
    fn test_unknown_variety_is_a_warning() {
        let mut seed = sunflower();
        seed.seed_type = "amaranth".to_string();
        let result = service(500.0).predict(&seed, &calm_logs()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("amaranth"));
    }

    #[test]
    fn test_degraded_without_model() {
        let empty = PredictionService::new(Arc::new(ModelRegistry::new()));
        assert!(matches!(
            empty.predict(&sunflower(), &calm_logs()),
            Err(Error::NoActiveModel)
        ));
        let result = empty.predict_or_degraded(&sunflower(), &calm_logs(), 2).unwrap();
        assert_eq!(result.status, YieldStatus::Unavailable);
        assert!((result.predicted_yield - 1200.0).abs() < 1e-9);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn test_bad_seed_is_not_degraded() {
        let mut seed = sunflower();
        seed.base_yield = -1.0;
        assert!(matches!(
            service(500.0).predict_or_degraded(&seed, &calm_logs(), 1),
            Err(Error::Data(_))
        ));
    }
}
