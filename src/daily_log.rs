//! Daily cultivation log entries

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One day's recorded environment and actions for a crop instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    /// Day of the grow cycle, starting at 1
    pub day_number: u32,
    /// Air temperature in °C, if measured
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Relative humidity in %, if measured
    #[serde(default)]
    pub humidity: Option<f64>,
    /// Whether the tray was watered that day
    #[serde(default)]
    pub watered: bool,
    /// Canopy height in millimetres, if measured
    #[serde(default)]
    pub measured_height_mm: Option<f64>,
    /// When the entry was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_at: Option<DateTime<Utc>>,
}

impl DailyLog {
    /// Create an entry with no measurements.
    #[must_use]
    pub const fn new(day_number: u32, watered: bool) -> Self {
        Self {
            day_number,
            temperature: None,
            humidity: None,
            watered,
            measured_height_mm: None,
            logged_at: None,
        }
    }

    /// Set the measured temperature.
    #[must_use]
    pub const fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    /// Set the measured humidity.
    #[must_use]
    pub const fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    /// Set the measured canopy height.
    #[must_use]
    pub const fn with_height_mm(mut self, millimetres: f64) -> Self {
        self.measured_height_mm = Some(millimetres);
        self
    }

    /// Temperature, or the seed's ideal when the day was not measured.
    #[must_use]
    pub fn temperature_or(&self, ideal: f64) -> f64 {
        self.temperature.unwrap_or(ideal)
    }

    /// Humidity, or the seed's ideal when the day was not measured.
    #[must_use]
    pub fn humidity_or(&self, ideal: f64) -> f64 {
        self.humidity.unwrap_or(ideal)
    }

    fn validate(&self) -> Result<()> {
        if self.day_number == 0 {
            return Err(Error::Data("day_number starts at 1".to_string()));
        }
        for (field, value) in [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("measured_height_mm", self.measured_height_mm),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(Error::Data(format!(
                    "{field} on day {} is not a number",
                    self.day_number
                )));
            }
        }
        Ok(())
    }
}

/// Validate a log history and order it ascending by `day_number`.
///
/// Duplicate days are a caller error; the entry appearing last in the
/// input wins.
///
/// # Errors
///
/// Returns `Error::Data` for day 0 or non-finite measurements
pub fn ordered_history(logs: &[DailyLog]) -> Result<Vec<DailyLog>> {
    let mut by_day = BTreeMap::new();
    for log in logs {
        log.validate()?;
        by_day.insert(log.day_number, log.clone());
    }
    Ok(by_day.into_values().collect())
}
