//! Per-feature standardisation frozen at training time

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Zero-mean / unit-variance scaler.
///
/// Parameters come from the training split only and are stored in the
/// artifact set; inference never refits them. Constant features get a
/// unit scale so they pass through centred rather than dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit means and population standard deviations column by column.
    ///
    /// # Errors
    ///
    /// Returns `Error::TrainingFailure` on an empty or ragged matrix
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::TrainingFailure("cannot fit scaler on zero rows".to_string()));
        };
        let width = first.len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(Error::TrainingFailure("feature rows have unequal lengths".to_string()));
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((acc, value), mean) in scales.iter_mut().zip(row).zip(&means) {
                *acc += (value - mean).powi(2);
            }
        }
        for scale in &mut scales {
            let std = (*scale / n).sqrt();
            *scale = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    /// Number of features the scaler was fitted on
    #[must_use]
    pub fn width(&self) -> usize {
        self.means.len()
    }

    /// Standardise one row.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when the row width differs from the fit
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.width() {
            return Err(Error::InvalidInput(format!(
                "scaler fitted on {} features, got {}",
                self.width(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect())
    }

    /// Standardise many rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` on the first row of the wrong width
    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}
