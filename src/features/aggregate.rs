//! Log-history aggregates
//!
//! Turns an irregular daily log series into fixed engineered features.
//! Days without a temperature or humidity reading contribute the seed's
//! ideal value. That dampens detected stress on sparsely logged crops but
//! keeps absent data from skewing means and extremes.

use crate::daily_log::{ordered_history, DailyLog};
use crate::seed::SeedProfile;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A day counts as temperature-stressed beyond this deviation (°C)
pub const TEMP_STRESS_THRESHOLD: f64 = 3.0;

/// A day counts as humidity-stressed beyond this deviation (%RH)
pub const HUMIDITY_STRESS_THRESHOLD: f64 = 15.0;

/// Engineered features for one crop, independent of any model vocabulary.
///
/// Stored alongside every training sample so the corpus can be re-encoded
/// against whatever vocabulary a future training run fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropFeatures {
    /// Seed base yield (g)
    pub base_yield: f64,
    /// Seed growth days
    pub growth_days: f64,
    /// Seed ideal temperature (°C)
    pub ideal_temp: f64,
    /// Seed ideal humidity (%)
    pub ideal_humidity: f64,
    /// Mean temperature
    pub avg_temp: f64,
    /// Mean humidity
    pub avg_humidity: f64,
    /// Mean absolute temperature deviation from ideal
    pub temp_deviation: f64,
    /// Mean absolute humidity deviation from ideal
    pub humidity_deviation: f64,
    /// Fraction of logged days that were watered
    pub watering_consistency: f64,
    /// Days with temperature deviation above [`TEMP_STRESS_THRESHOLD`]
    pub temp_stress_days: f64,
    /// Days with humidity deviation above [`HUMIDITY_STRESS_THRESHOLD`]
    pub humidity_stress_days: f64,
    /// Days not watered
    pub missed_watering_days: f64,
    /// Highest temperature
    pub max_temp: f64,
    /// Lowest temperature
    pub min_temp: f64,
    /// Highest humidity
    pub max_humidity: f64,
    /// Lowest humidity
    pub min_humidity: f64,
    /// Height on the latest day, 0 when not measured
    pub latest_height_mm: f64,
    /// Sowing density (g/cm²)
    pub seeding_density_g_cm2: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl CropFeatures {
    /// Aggregate a seed profile and its log history.
    ///
    /// Logs may arrive in any order; they are validated and sorted first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Data` if the seed profile is invalid, a log entry is
    /// malformed, or the history is empty
    #[allow(clippy::cast_precision_loss)]
    pub fn from_history(seed: &SeedProfile, logs: &[DailyLog], tray_area_cm2: f64) -> Result<Self> {
        seed.validate()?;
        let history = ordered_history(logs)?;
        let Some(latest) = history.last() else {
            return Err(Error::Data(format!(
                "cannot derive features for '{}' without at least one daily log",
                seed.seed_type
            )));
        };

        let days = history.len() as f64;
        let temps: Vec<f64> = history.iter().map(|l| l.temperature_or(seed.ideal_temp)).collect();
        let hums: Vec<f64> = history.iter().map(|l| l.humidity_or(seed.ideal_humidity)).collect();

        let mean = |values: &[f64]| values.iter().sum::<f64>() / days;
        let mean_abs_dev =
            |values: &[f64], ideal: f64| values.iter().map(|v| (v - ideal).abs()).sum::<f64>() / days;
        let count_over = |values: &[f64], ideal: f64, threshold: f64| {
            values.iter().filter(|v| (*v - ideal).abs() > threshold).count() as f64
        };
        let max = |values: &[f64]| values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = |values: &[f64]| values.iter().copied().fold(f64::INFINITY, f64::min);

        let watered = history.iter().filter(|l| l.watered).count() as f64;

        Ok(Self {
            base_yield: seed.base_yield,
            growth_days: f64::from(seed.growth_days),
            ideal_temp: seed.ideal_temp,
            ideal_humidity: seed.ideal_humidity,
            avg_temp: round2(mean(&temps)),
            avg_humidity: round2(mean(&hums)),
            temp_deviation: round2(mean_abs_dev(&temps, seed.ideal_temp)),
            humidity_deviation: round2(mean_abs_dev(&hums, seed.ideal_humidity)),
            watering_consistency: round2(watered / days),
            temp_stress_days: count_over(&temps, seed.ideal_temp, TEMP_STRESS_THRESHOLD),
            humidity_stress_days: count_over(&hums, seed.ideal_humidity, HUMIDITY_STRESS_THRESHOLD),
            missed_watering_days: days - watered,
            max_temp: max(&temps),
            min_temp: min(&temps),
            max_humidity: max(&hums),
            min_humidity: min(&hums),
            latest_height_mm: latest.measured_height_mm.unwrap_or(0.0),
            seeding_density_g_cm2: seed.seeding_density_g_cm2(tray_area_cm2),
        })
    }

    /// Numeric features in schema order, after the categorical index.
    #[must_use]
    pub const fn numeric(&self) -> [f64; 18] {
        [
            self.base_yield,
            self.growth_days,
            self.ideal_temp,
            self.ideal_humidity,
            self.avg_temp,
            self.avg_humidity,
            self.temp_deviation,
            self.humidity_deviation,
            self.watering_consistency,
            self.temp_stress_days,
            self.humidity_stress_days,
            self.missed_watering_days,
            self.max_temp,
            self.min_temp,
            self.max_humidity,
            self.min_humidity,
            self.latest_height_mm,
            self.seeding_density_g_cm2,
        ]
    }

    /// Inverse of [`numeric`](Self::numeric), used when reading stored rows.
    #[must_use]
    pub const fn from_numeric(values: [f64; 18]) -> Self {
        Self {
            base_yield: values[0],
            growth_days: values[1],
            ideal_temp: values[2],
            ideal_humidity: values[3],
            avg_temp: values[4],
            avg_humidity: values[5],
            temp_deviation: values[6],
            humidity_deviation: values[7],
            watering_consistency: values[8],
            temp_stress_days: values[9],
            humidity_stress_days: values[10],
            missed_watering_days: values[11],
            max_temp: values[12],
            min_temp: values[13],
            max_humidity: values[14],
            min_humidity: values[15],
            latest_height_mm: values[16],
            seeding_density_g_cm2: values[17],
        }
    }

    /// True when every feature is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.numeric().iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::Difficulty;

    fn sunflower() -> SeedProfile {
        SeedProfile::new("sunflower", "Sunflower", Difficulty::Easy, 600.0, 10, 22.5, 50.0)
    }

    #[test]
    fn test_single_log_is_well_defined() {
        let logs = [DailyLog::new(1, true).with_temperature(27.0).with_humidity(50.0)];
        let f = CropFeatures::from_history(&sunflower(), &logs, 1290.0).unwrap();

        assert!((f.avg_temp - 27.0).abs() < f64::EPSILON);
        assert!((f.max_temp - 27.0).abs() < f64::EPSILON);
        assert!((f.min_temp - 27.0).abs() < f64::EPSILON);
        assert!((f.temp_deviation - 4.5).abs() < f64::EPSILON);
        assert!((f.temp_stress_days - 1.0).abs() < f64::EPSILON);
        assert!((f.humidity_stress_days).abs() < f64::EPSILON);
        assert!((f.watering_consistency - 1.0).abs() < f64::EPSILON);
        assert!(f.is_finite());
    }

    #[test]
    fn test_missing_readings_use_ideal_values() {
        let logs = [
            DailyLog::new(1, true),
            DailyLog::new(2, false).with_temperature(30.0),
        ];
        let f = CropFeatures::from_history(&sunflower(), &logs, 1290.0).unwrap();

        // Day 1 contributes the ideal 22.5, day 2 contributes 30.0
        assert!((f.avg_temp - 26.25).abs() < 1e-9);
        assert!((f.min_temp - 22.5).abs() < f64::EPSILON);
        assert!((f.temp_stress_days - 1.0).abs() < f64::EPSILON);
        assert!((f.avg_humidity - 50.0).abs() < f64::EPSILON);
        assert!((f.missed_watering_days - 1.0).abs() < f64::EPSILON);
        assert!((f.watering_consistency - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stress_thresholds_are_strict() {
        let logs = [
            DailyLog::new(1, true).with_temperature(25.5).with_humidity(65.0),
            DailyLog::new(2, true).with_temperature(25.6).with_humidity(65.1),
        ];
        let f = CropFeatures::from_history(&sunflower(), &logs, 1290.0).unwrap();
        assert!((f.temp_stress_days - 1.0).abs() < f64::EPSILON);
        assert!((f.humidity_stress_days - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latest_height_taken_from_last_day() {
        let logs = [
            DailyLog::new(2, true),
            DailyLog::new(1, true).with_height_mm(15.0),
        ];
        let f = CropFeatures::from_history(&sunflower(), &logs, 1290.0).unwrap();
        assert!(f.latest_height_mm.abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_history_is_data_error() {
        let err = CropFeatures::from_history(&sunflower(), &[], 1290.0).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }
}
