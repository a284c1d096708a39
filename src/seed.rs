//! Seed catalog reference data
//!
//! Read-only to this crate: profiles arrive from the cultivation-tracking
//! subsystem and are validated before any feature is derived from them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default temperature tolerance in °C
pub const DEFAULT_TEMP_TOLERANCE: f64 = 2.5;

/// Default humidity tolerance in %RH
pub const DEFAULT_HUMIDITY_TOLERANCE: f64 = 10.0;

/// Cultivation difficulty of a variety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Forgiving varieties (sunflower, pea)
    #[serde(alias = "Easy")]
    Easy,
    /// Most varieties
    #[serde(alias = "Medium")]
    Medium,
    /// Sensitive varieties (basil, cilantro)
    #[serde(alias = "Hard")]
    Hard,
}

/// Static cultivation reference data for one plant variety.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedProfile {
    /// Variety slug, the immutable catalog key (e.g. `sunflower`)
    pub seed_type: String,
    /// Display name
    pub name: String,
    /// Difficulty class
    pub difficulty: Difficulty,
    /// Expected yield per tray in grams
    pub base_yield: f64,
    /// Days from sowing to harvest
    pub growth_days: u32,
    /// Ideal temperature in °C
    pub ideal_temp: f64,
    /// Ideal relative humidity in %
    pub ideal_humidity: f64,
    /// Accepted temperature deviation in °C
    #[serde(default = "default_temp_tolerance")]
    pub temp_tolerance: f64,
    /// Accepted humidity deviation in %RH
    #[serde(default = "default_humidity_tolerance")]
    pub humidity_tolerance: f64,
    /// Measured sowing density in g/cm², if the grower recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeding_density: Option<f64>,
    /// Catalog target density in g/cm²
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_density: Option<f64>,
}

const fn default_temp_tolerance() -> f64 {
    DEFAULT_TEMP_TOLERANCE
}

const fn default_humidity_tolerance() -> f64 {
    DEFAULT_HUMIDITY_TOLERANCE
}

impl SeedProfile {
    /// Create a profile with default tolerances and no density override.
    #[must_use]
    pub fn new(
        seed_type: impl Into<String>,
        name: impl Into<String>,
        difficulty: Difficulty,
        base_yield: f64,
        growth_days: u32,
        ideal_temp: f64,
        ideal_humidity: f64,
    ) -> Self {
        Self {
            seed_type: seed_type.into(),
            name: name.into(),
            difficulty,
            base_yield,
            growth_days,
            ideal_temp,
            ideal_humidity,
            temp_tolerance: DEFAULT_TEMP_TOLERANCE,
            humidity_tolerance: DEFAULT_HUMIDITY_TOLERANCE,
            seeding_density: None,
            target_density: None,
        }
    }

    /// Set an explicit seeding density override (g/cm²).
    #[must_use]
    pub const fn with_seeding_density(mut self, density: f64) -> Self {
        self.seeding_density = Some(density);
        self
    }

    /// Reject profiles no feature can be derived from.
    ///
    /// # Errors
    ///
    /// Returns `Error::Data` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.seed_type.trim().is_empty() {
            return Err(Error::Data("seed_type must not be empty".to_string()));
        }
        if !(self.base_yield.is_finite() && self.base_yield > 0.0) {
            return Err(Error::Data(format!(
                "base_yield for '{}' must be a positive number of grams (got {})",
                self.seed_type, self.base_yield
            )));
        }
        if self.growth_days == 0 {
            return Err(Error::Data(format!(
                "growth_days for '{}' must be at least 1",
                self.seed_type
            )));
        }
        if !self.ideal_temp.is_finite() {
            return Err(Error::Data(format!(
                "ideal_temp for '{}' is missing or not a number",
                self.seed_type
            )));
        }
        if !(self.ideal_humidity.is_finite() && (0.0..=100.0).contains(&self.ideal_humidity)) {
            return Err(Error::Data(format!(
                "ideal_humidity for '{}' must be within 0-100% (got {})",
                self.seed_type, self.ideal_humidity
            )));
        }
        for (field, value) in [
            ("seeding_density", self.seeding_density),
            ("target_density", self.target_density),
        ] {
            if let Some(density) = value {
                if !(density.is_finite() && density > 0.0) {
                    return Err(Error::Data(format!(
                        "{field} for '{}' must be positive (got {density})",
                        self.seed_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sowing density in g/cm²: explicit override, then catalog target,
    /// then base yield spread over the tray area.
    #[must_use]
    pub fn seeding_density_g_cm2(&self, tray_area_cm2: f64) -> f64 {
        self.seeding_density
            .or(self.target_density)
            .unwrap_or(self.base_yield / tray_area_cm2)
    }
}
