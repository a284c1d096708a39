//! Feature engineering
//!
//! ## Schema
//!
//! ```text
//! [seed_index | 4 seed constants | 13 log aggregates]  -> 19 f64, schema v1
//!      ^ SeedVocabulary   ^ SeedProfile    ^ CropFeatures::from_history
//! ```
//!
//! A [`FeatureVector`] carries the schema version it was built for. Models
//! refuse vectors of any other version or length; nothing is ever padded
//! or truncated.

mod aggregate;
mod encoder;
mod scaler;
mod vocabulary;

pub use aggregate::{CropFeatures, HUMIDITY_STRESS_THRESHOLD, TEMP_STRESS_THRESHOLD};
pub use encoder::{Encoding, FeatureEncoder};
pub use scaler::StandardScaler;
pub use vocabulary::{normalize_variety, CategoryCode, SeedVocabulary, UnknownCategory};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Version of the feature layout produced by this crate
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Ordered feature columns for [`FEATURE_SCHEMA_VERSION`]
pub const FEATURE_COLUMNS: [&str; 19] = [
    "seed_index",
    "base_yield",
    "growth_days",
    "ideal_temp",
    "ideal_humidity",
    "avg_temp",
    "avg_humidity",
    "temp_deviation",
    "humidity_deviation",
    "watering_consistency",
    "temp_stress_days",
    "humidity_stress_days",
    "missed_watering_days",
    "max_temp",
    "min_temp",
    "max_humidity",
    "min_humidity",
    "latest_height_mm",
    "seeding_density_g_cm2",
];

/// Identity of a feature layout: version plus ordered column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    version: u32,
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Schema as recorded elsewhere, e.g. in artifact metadata
    #[must_use]
    pub const fn new(version: u32, columns: Vec<String>) -> Self {
        Self { version, columns }
    }

    /// The layout this build of the crate encodes
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            columns: FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Schema version
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Ordered column names
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of features
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True for a schema with no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Fail closed unless `vector` was built for exactly this schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaMismatch` on a version or length difference
    pub fn check(&self, vector: &FeatureVector) -> Result<()> {
        if vector.schema_version() != self.version || vector.len() != self.len() {
            return Err(Error::SchemaMismatch {
                expected_version: self.version,
                found_version: vector.schema_version(),
                expected_len: self.len(),
                found_len: vector.len(),
            });
        }
        Ok(())
    }

    /// Fail closed unless `other` is the same layout (artifact load time).
    ///
    /// # Errors
    ///
    /// Returns `Error::SchemaMismatch` when the layouts differ
    pub fn check_compatible(&self, other: &Self) -> Result<()> {
        if self != other {
            return Err(Error::SchemaMismatch {
                expected_version: self.version,
                found_version: other.version,
                expected_len: self.len(),
                found_len: other.len(),
            });
        }
        Ok(())
    }
}

/// Fixed-schema numeric encoding of a seed profile plus log history.
///
/// Values are unscaled; the model applies its frozen scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    schema_version: u32,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Wrap raw values tagged with a schema version.
    #[must_use]
    pub const fn new(schema_version: u32, values: Vec<f64>) -> Self {
        Self {
            schema_version,
            values,
        }
    }

    /// Schema version the vector was built for
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Feature values in schema order
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of features
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty vector
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Little-endian byte image, used to assert bit-identical re-encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.values.len() * 8);
        bytes.extend_from_slice(&self.schema_version.to_le_bytes());
        for value in &self.values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_schema_shape() {
        let schema = FeatureSchema::current();
        assert_eq!(schema.version(), FEATURE_SCHEMA_VERSION);
        assert_eq!(schema.len(), 19);
        assert_eq!(schema.columns()[0], "seed_index");
    }

    #[test]
    fn test_check_rejects_short_vector() {
        let schema = FeatureSchema::current();
        let short = FeatureVector::new(FEATURE_SCHEMA_VERSION, vec![0.0; 18]);
        let err = schema.check(&short).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch {
                expected_len: 19,
                found_len: 18,
                ..
            }
        ));
    }

    #[test]
    fn test_check_rejects_other_version() {
        let schema = FeatureSchema::current();
        let future = FeatureVector::new(FEATURE_SCHEMA_VERSION + 1, vec![0.0; 19]);
        assert!(schema.check(&future).is_err());
    }

    #[test]
    fn test_to_bytes_layout() {
        let vector = FeatureVector::new(1, vec![1.5, -2.0]);
        let bytes = vector.to_bytes();
        assert_eq!(bytes.len(), 4 + 16);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
    }
}
