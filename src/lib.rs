//! # microyield: Microgreens Yield Prediction Engine
//!
//! **Version**: 0.1.0
//!
//! Predicts the harvest weight of a microgreens tray from its seed profile
//! and daily cultivation log, explains the forecast with care suggestions,
//! and keeps improving as real harvests are recorded.
//!
//! ## Architecture
//!
//! - **Features**: fixed, versioned 19-column layout derived from the seed
//!   profile and the log history (`features`)
//! - **Ensemble**: bagged regression trees blended with a feed-forward
//!   network, `0.4 * A + 0.6 * B` by default (`model`)
//! - **Corpus**: synthetic bootstrap data plus append-only real harvests in
//!   Parquet (`corpus`)
//! - **Artifacts**: immutable numbered versions with an atomically moved
//!   active pointer and backups (`artifact`, `registry`)
//! - **Retraining**: quality-gated, rollback-safe promotion run off the
//!   request path (`retrain`, `engine`)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use microyield::config::EngineConfig;
//! use microyield::daily_log::DailyLog;
//! use microyield::seed::{Difficulty, SeedProfile};
//! use microyield::YieldEngine;
//!
//! let engine = YieldEngine::open(EngineConfig::default())?;
//! let seed = SeedProfile::new("sunflower", "Sunflower", Difficulty::Easy, 600.0, 10, 22.5, 50.0);
//! let logs = vec![DailyLog::new(1, true).with_temperature(23.0).with_humidity(52.0)];
//!
//! let result = engine.predict_or_degraded(&seed, &logs, 1)?;
//! println!("{}g ({:?})", result.predicted_yield, result.status);
//! # Ok::<(), microyield::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod corpus;
pub mod daily_log;
pub mod engine;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod prediction;
pub mod registry;
pub mod retrain;
pub mod seed;
pub mod suggestions;

pub use engine::{HarvestReceipt, RetrainTrigger, YieldEngine};
pub use error::{Error, Result};
pub use prediction::{PredictionResult, PredictionService, YieldStatus};
