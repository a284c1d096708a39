//! Training corpus rows

use crate::config::SYNTHETIC_SAMPLE_WEIGHT;
use crate::daily_log::{ordered_history, DailyLog};
use crate::features::CropFeatures;
use crate::seed::SeedProfile;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

/// Where a training sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Produced by the external generator
    Synthetic,
    /// Recorded from an actual harvest
    Real,
}

impl DataSource {
    /// Stable lowercase tag used on disk
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Real => "real",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synthetic" => Ok(Self::Synthetic),
            "real" => Ok(Self::Real),
            other => Err(Error::Data(format!("unknown data source '{other}'"))),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// One labelled row: engineered features plus the observed yield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Seed variety slug as recorded (normalised at encoding time)
    pub seed_type: String,
    /// Aggregated features under the current schema
    pub features: CropFeatures,
    /// Harvested grams per tray
    pub final_yield: f64,
    /// `final_yield / base_yield`, 3 dp
    pub yield_efficiency: f64,
    /// Loss multiplier during training
    pub sample_weight: f64,
    /// Provenance
    pub data_source: DataSource,
    /// Recorded at
    pub created_at: DateTime<Utc>,
    /// Raw history for harvest samples, kept so features can be re-derived
    pub daily_logs: Option<Vec<DailyLog>>,
}

impl TrainingSample {
    /// Synthetic sample with unit weight.
    #[must_use]
    pub fn synthetic(seed_type: impl Into<String>, features: CropFeatures, final_yield: f64) -> Self {
        let yield_efficiency = if features.base_yield > 0.0 {
            round3(final_yield / features.base_yield)
        } else {
            0.0
        };
        Self {
            seed_type: seed_type.into(),
            features,
            final_yield,
            yield_efficiency,
            sample_weight: SYNTHETIC_SAMPLE_WEIGHT,
            data_source: DataSource::Synthetic,
            created_at: Utc::now(),
            daily_logs: None,
        }
    }

    /// Real sample from a completed harvest.
    ///
    /// The weight is set by the corpus store on append.
    ///
    /// # Errors
    ///
    /// Returns `Error::Data` for an invalid seed or logs, or a yield that is
    /// negative or not finite
    pub fn from_harvest(
        seed: &SeedProfile,
        logs: &[DailyLog],
        final_yield: f64,
        tray_area_cm2: f64,
    ) -> Result<Self> {
        if !final_yield.is_finite() || final_yield < 0.0 {
            return Err(Error::Data(format!(
                "final yield must be a non-negative number of grams, got {final_yield}"
            )));
        }
        let history = ordered_history(logs)?;
        let features = CropFeatures::from_history(seed, &history, tray_area_cm2)?;

        Ok(Self {
            data_source: DataSource::Real,
            daily_logs: Some(history),
            ..Self::synthetic(seed.seed_type.clone(), features, final_yield)
        })
    }

    /// Override the training weight
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.sample_weight = weight;
        self
    }
}

/// One line of a synthetic corpus import: seed slug, flattened features, yield.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticRecord {
    /// Seed variety slug
    pub seed_type: String,
    /// Aggregated features
    #[serde(flatten)]
    pub features: CropFeatures,
    /// Harvested grams per tray
    pub final_yield: f64,
}

/// Parse a JSON-lines synthetic corpus. Blank lines are skipped.
///
/// # Errors
///
/// Returns `Error::Data` naming the first malformed line
pub fn read_synthetic_jsonl<R: BufRead>(reader: R) -> Result<Vec<TrainingSample>> {
    let mut samples = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SyntheticRecord = serde_json::from_str(&line)
            .map_err(|e| Error::Data(format!("synthetic corpus line {}: {e}", line_no + 1)))?;
        samples.push(TrainingSample::synthetic(
            record.seed_type,
            record.features,
            record.final_yield,
        ));
    }
    Ok(samples)
}
