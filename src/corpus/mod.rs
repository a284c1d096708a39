//! Training corpus storage
//!
//! Two populations share one row type:
//! - synthetic: bulk-imported once, unit weight, never modified
//! - real: one row per recorded harvest, appended, never rewritten
//!
//! Real samples are weighted by the configured multiplier when they are
//! appended and again when they are loaded for training, so a change of
//! multiplier applies to the whole history on the next retrain.

mod memory;
mod parquet;
mod sample;

pub use memory::MemoryCorpusStore;
pub use self::parquet::ParquetCorpusStore;
pub use sample::{read_synthetic_jsonl, DataSource, SyntheticRecord, TrainingSample};

use crate::Result;

/// Append-only store of labelled samples.
///
/// Implementations must make an append durable before returning `Ok`, and
/// must tolerate concurrent reads during an append.
pub trait CorpusStore: Send + Sync {
    /// Durably append one harvest sample, tagged `real` with the store's
    /// weight multiplier. Returns the real-sample count after the append.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorpusWrite` if the sample could not be persisted;
    /// nothing was recorded and the caller must retry
    fn append_real(&self, sample: TrainingSample) -> Result<usize>;

    /// Number of real samples recorded
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    fn real_count(&self) -> Result<usize>;

    /// All real samples, oldest first, weighted by the store's multiplier
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    fn load_real(&self) -> Result<Vec<TrainingSample>>;

    /// The synthetic corpus (empty if none was imported), unit weight
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    fn load_synthetic(&self) -> Result<Vec<TrainingSample>>;

    /// Store the synthetic corpus. Allowed exactly once.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorpusWrite` if a synthetic corpus already exists or
    /// the write fails
    fn import_synthetic(&self, samples: Vec<TrainingSample>) -> Result<usize>;
}
