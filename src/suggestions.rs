//! Rule-based care suggestions
//!
//! Rules look only at the most recent log entry. A missing reading is
//! treated as ideal, so it never triggers a temperature or humidity rule.
//!
//! | Rule                 | Condition                     | Severity |
//! |----------------------|-------------------------------|----------|
//! | heat stress          | temp > ideal + 4              | critical |
//! | above ideal          | ideal + 2 < temp <= ideal + 4 | warning  |
//! | too cold             | temp < ideal - 4              | warning  |
//! | air too dry          | humidity < 35                 | warning  |
//! | mold risk            | humidity > 70                 | warning  |
//! | missed watering      | not watered                   | critical |
//! | on track             | none of the above             | success  |

use crate::daily_log::DailyLog;
use crate::seed::SeedProfile;
use serde::{Deserialize, Serialize};

/// Degrees above ideal that count as heat stress
pub const HEAT_STRESS_MARGIN: f64 = 4.0;
/// Degrees above ideal that earn a warning
pub const WARM_MARGIN: f64 = 2.0;
/// Degrees below ideal that count as too cold
pub const COLD_MARGIN: f64 = 4.0;
/// Relative humidity (%) below which the air is too dry
pub const DRY_HUMIDITY: f64 = 35.0;
/// Relative humidity (%) above which mold is a risk
pub const MOLD_HUMIDITY: f64 = 70.0;
/// Estimated grams lost per degree of heat stress
pub const HEAT_LOSS_G_PER_DEGREE: f64 = 8.0;
/// Estimated grams lost to a missed watering
pub const MISSED_WATERING_LOSS_G: (f64, f64) = (25.0, 40.0);

/// How urgent a suggestion is; sorts most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Act now
    Critical,
    /// Worth correcting
    Warning,
    /// Nothing to do
    Success,
}

/// Which rule produced a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Temperature far above ideal
    HeatStress,
    /// Temperature somewhat above ideal
    AboveIdealTemperature,
    /// Temperature far below ideal
    TooCold,
    /// Humidity too low
    AirTooDry,
    /// Humidity too high
    MoldRisk,
    /// Latest day was not watered
    MissedWatering,
    /// Conditions on track
    OnTrack,
    /// No logs yet
    ReadyToStart,
}

/// Estimated yield cost of ignoring a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossEstimate {
    /// Point estimate in grams
    Grams {
        /// Grams lost
        grams: f64,
    },
    /// Range in grams
    Range {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
}

/// One actionable recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Urgency
    pub severity: Severity,
    /// Rule that fired
    pub kind: SuggestionKind,
    /// Short headline
    pub title: String,
    /// What is happening and what to do
    pub message: String,
    /// Yield at stake, when estimable
    pub potential_loss: Option<LossEstimate>,
}

impl Suggestion {
    fn new(severity: Severity, kind: SuggestionKind, title: &str, message: String) -> Self {
        Self {
            severity,
            kind,
            title: title.to_string(),
            message,
            potential_loss: None,
        }
    }

    fn with_loss(mut self, loss: LossEstimate) -> Self {
        self.potential_loss = Some(loss);
        self
    }

    /// Suggestion for a crop with no logs yet.
    #[must_use]
    pub fn ready_to_start(seed: &SeedProfile) -> Self {
        Self::new(
            Severity::Success,
            SuggestionKind::ReadyToStart,
            "Ready to start",
            format!(
                "Log your first day to start tracking. Aim for {}°C and {}% humidity.",
                seed.ideal_temp, seed.ideal_humidity
            ),
        )
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Evaluate every rule against the latest log; most urgent first.
///
/// Returns exactly one success suggestion when no rule fires.
#[must_use]
pub fn diagnose(latest: &DailyLog, seed: &SeedProfile, predicted_yield: f64) -> Vec<Suggestion> {
    let temp = latest.temperature_or(seed.ideal_temp);
    let humidity = latest.humidity_or(seed.ideal_humidity);
    let ideal = seed.ideal_temp;
    let mut out = Vec::new();

    if temp > ideal + HEAT_STRESS_MARGIN {
        out.push(
            Suggestion::new(
                Severity::Critical,
                SuggestionKind::HeatStress,
                "Heat stress",
                format!(
                    "Temperature ({temp}°C) is well above the ideal {ideal}°C. Move the tray somewhere cooler or improve airflow."
                ),
            )
            .with_loss(LossEstimate::Grams {
                grams: round1((temp - ideal) * HEAT_LOSS_G_PER_DEGREE),
            }),
        );
    } else if temp > ideal + WARM_MARGIN {
        out.push(Suggestion::new(
            Severity::Warning,
            SuggestionKind::AboveIdealTemperature,
            "Above ideal temperature",
            format!("Temperature ({temp}°C) is slightly above the ideal {ideal}°C. Keep an eye on it."),
        ));
    } else if temp < ideal - COLD_MARGIN {
        out.push(Suggestion::new(
            Severity::Warning,
            SuggestionKind::TooCold,
            "Too cold",
            format!("Temperature ({temp}°C) is well below the ideal {ideal}°C. Growth will slow down."),
        ));
    }

    if humidity < DRY_HUMIDITY {
        out.push(Suggestion::new(
            Severity::Warning,
            SuggestionKind::AirTooDry,
            "Air too dry",
            format!("Humidity ({humidity}%) is low. Mist the tray or cover it with a humidity dome."),
        ));
    } else if humidity > MOLD_HUMIDITY {
        out.push(Suggestion::new(
            Severity::Warning,
            SuggestionKind::MoldRisk,
            "Mold risk",
            format!("Humidity ({humidity}%) is high. Increase ventilation to prevent mold."),
        ));
    }

    if !latest.watered {
        let (min, max) = MISSED_WATERING_LOSS_G;
        out.push(
            Suggestion::new(
                Severity::Critical,
                SuggestionKind::MissedWatering,
                "Missed watering",
                format!("Day {} was not watered. Water today to avoid stunted growth.", latest.day_number),
            )
            .with_loss(LossEstimate::Range { min, max }),
        );
    }

    if out.is_empty() {
        out.push(Suggestion::new(
            Severity::Success,
            SuggestionKind::OnTrack,
            "Perfect conditions",
            format!("Everything looks good. You're on track for about {predicted_yield:.0}g."),
        ));
    }

    out.sort_by_key(|s| s.severity);
    out
}
