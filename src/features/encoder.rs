//! Seed profile + log history -> [`FeatureVector`]

use super::{
    CropFeatures, FeatureSchema, FeatureVector, SeedVocabulary, UnknownCategory,
    FEATURE_SCHEMA_VERSION,
};
use crate::config::DEFAULT_TRAY_AREA_CM2;
use crate::daily_log::DailyLog;
use crate::seed::SeedProfile;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Output of an encoding: the vector plus an optional fallback warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    /// Encoded features
    pub vector: FeatureVector,
    /// Present when the seed variety fell back to the sentinel index
    pub unknown_category: Option<UnknownCategory>,
}

/// Deterministic encoder bound to one training vocabulary.
///
/// Same inputs always produce a bit-identical vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    vocabulary: SeedVocabulary,
    tray_area_cm2: f64,
}

impl FeatureEncoder {
    /// Encoder over a fitted vocabulary with the default tray area.
    #[must_use]
    pub const fn new(vocabulary: SeedVocabulary) -> Self {
        Self {
            vocabulary,
            tray_area_cm2: DEFAULT_TRAY_AREA_CM2,
        }
    }

    /// Override the tray area used for derived seeding density.
    #[must_use]
    pub const fn with_tray_area(mut self, tray_area_cm2: f64) -> Self {
        self.tray_area_cm2 = tray_area_cm2;
        self
    }

    /// Vocabulary captured at training time
    #[must_use]
    pub const fn vocabulary(&self) -> &SeedVocabulary {
        &self.vocabulary
    }

    /// Tray area used for derived seeding density
    #[must_use]
    pub const fn tray_area_cm2(&self) -> f64 {
        self.tray_area_cm2
    }

    /// Layout produced by [`encode`](Self::encode)
    #[must_use]
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::current()
    }

    /// Encode a seed profile and its log history.
    ///
    /// An unknown variety never fails the call; it is logged and reported
    /// through [`Encoding::unknown_category`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Data` for an invalid seed profile, malformed logs, or
    /// an empty history
    pub fn encode(&self, seed: &SeedProfile, logs: &[DailyLog]) -> Result<Encoding> {
        let features = CropFeatures::from_history(seed, logs, self.tray_area_cm2)?;
        Ok(self.encode_features(&seed.seed_type, &features))
    }

    /// Encode pre-aggregated features, as stored in the training corpus.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn encode_features(&self, seed_type: &str, features: &CropFeatures) -> Encoding {
        let code = self.vocabulary.encode(seed_type);
        if let Some(unknown) = &code.unknown {
            tracing::warn!(
                seed_type = %unknown.raw,
                fallback = %unknown.fallback,
                "unknown seed variety, using fallback encoding"
            );
        }

        let mut values = Vec::with_capacity(1 + 18);
        values.push(code.index as f64);
        values.extend_from_slice(&features.numeric());

        Encoding {
            vector: FeatureVector::new(FEATURE_SCHEMA_VERSION, values),
            unknown_category: code.unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::Difficulty;

    fn encoder() -> FeatureEncoder {
        FeatureEncoder::new(SeedVocabulary::fit(["radish", "sunflower"]).unwrap())
    }

    fn sunflower() -> SeedProfile {
        SeedProfile::new("sunflower", "Sunflower", Difficulty::Easy, 600.0, 10, 22.5, 50.0)
    }

    fn logs() -> Vec<DailyLog> {
        vec![
            DailyLog::new(1, true).with_temperature(23.0).with_humidity(52.0),
            DailyLog::new(2, true).with_temperature(22.5).with_humidity(50.0),
            DailyLog::new(3, false).with_temperature(24.0),
        ]
    }

    #[test]
    fn test_encode_has_schema_length() {
        let encoding = encoder().encode(&sunflower(), &logs()).unwrap();
        assert_eq!(encoding.vector.len(), FeatureSchema::current().len());
        assert_eq!(encoding.vector.schema_version(), FEATURE_SCHEMA_VERSION);
        assert!((encoding.vector.values()[0] - 1.0).abs() < f64::EPSILON);
        assert!(encoding.unknown_category.is_none());
    }

    #[test]
    fn test_encode_is_bit_identical() {
        let enc = encoder();
        let a = enc.encode(&sunflower(), &logs()).unwrap();
        let b = enc.encode(&sunflower(), &logs()).unwrap();
        assert_eq!(a.vector.to_bytes(), b.vector.to_bytes());
    }

    #[test]
    fn test_unknown_variety_recovers() {
        let mut seed = sunflower();
        seed.seed_type = "amaranth".to_string();
        let encoding = encoder().encode(&seed, &logs()).unwrap();
        assert!(encoding.vector.values()[0].abs() < f64::EPSILON);
        assert_eq!(encoding.unknown_category.unwrap().fallback, "radish");
    }

    #[test]
    fn test_density_uses_tray_area() {
        let enc = encoder().with_tray_area(600.0);
        let encoding = enc.encode(&sunflower(), &logs()).unwrap();
        let density = *encoding.vector.values().last().unwrap();
        assert!((density - 1.0).abs() < 1e-12);
    }
}
