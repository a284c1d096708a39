//! In-memory corpus, for tests and embedding.

use super::{CorpusStore, DataSource, TrainingSample};
use crate::config::SYNTHETIC_SAMPLE_WEIGHT;
use crate::{Error, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Samples {
    synthetic: Option<Vec<TrainingSample>>,
    real: Vec<TrainingSample>,
}

/// Volatile [`CorpusStore`]; data is lost when dropped.
pub struct MemoryCorpusStore {
    samples: Mutex<Samples>,
    real_sample_weight: f64,
}

impl MemoryCorpusStore {
    /// Empty store weighting real samples by `real_sample_weight`.
    #[must_use]
    pub fn new(real_sample_weight: f64) -> Self {
        Self {
            samples: Mutex::new(Samples::default()),
            real_sample_weight,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Samples> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CorpusStore for MemoryCorpusStore {
    fn append_real(&self, sample: TrainingSample) -> Result<usize> {
        let mut samples = self.lock();
        samples.real.push(TrainingSample {
            data_source: DataSource::Real,
            sample_weight: self.real_sample_weight,
            ..sample
        });
        Ok(samples.real.len())
    }

    fn real_count(&self) -> Result<usize> {
        Ok(self.lock().real.len())
    }

    fn load_real(&self) -> Result<Vec<TrainingSample>> {
        Ok(self
            .lock()
            .real
            .iter()
            .cloned()
            .map(|s| s.with_weight(self.real_sample_weight))
            .collect())
    }

    fn load_synthetic(&self) -> Result<Vec<TrainingSample>> {
        Ok(self
            .lock()
            .synthetic
            .iter()
            .flatten()
            .cloned()
            .map(|s| s.with_weight(SYNTHETIC_SAMPLE_WEIGHT))
            .collect())
    }

    fn import_synthetic(&self, samples: Vec<TrainingSample>) -> Result<usize> {
        let mut store = self.lock();
        if store.synthetic.is_some() {
            return Err(Error::CorpusWrite(
                "synthetic corpus already imported; it is immutable".to_string(),
            ));
        }
        let count = samples.len();
        store.synthetic = Some(
            samples
                .into_iter()
                .map(|s| TrainingSample {
                    data_source: DataSource::Synthetic,
                    sample_weight: SYNTHETIC_SAMPLE_WEIGHT,
                    ..s
                })
                .collect(),
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily_log::DailyLog;
    use crate::seed::{Difficulty, SeedProfile};

    fn sample() -> TrainingSample {
        let seed = SeedProfile::new("radish", "Radish", Difficulty::Easy, 400.0, 8, 21.0, 50.0);
        TrainingSample::from_harvest(&seed, &[DailyLog::new(1, true)], 380.0, 1290.0).unwrap()
    }

    #[test]
    fn test_append_tags_real_with_multiplier() {
        let store = MemoryCorpusStore::new(2.0);
        assert_eq!(store.append_real(sample()).unwrap(), 1);
        assert_eq!(store.append_real(sample()).unwrap(), 2);
        let real = store.load_real().unwrap();
        assert!(real.iter().all(|s| s.data_source == DataSource::Real));
        assert!(real.iter().all(|s| (s.sample_weight - 2.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_synthetic_is_write_once() {
        let store = MemoryCorpusStore::new(2.0);
        assert!(store.load_synthetic().unwrap().is_empty());
        store.import_synthetic(vec![sample()]).unwrap();
        let synthetic = store.load_synthetic().unwrap();
        assert_eq!(synthetic[0].data_source, DataSource::Synthetic);
        assert!(matches!(
            store.import_synthetic(vec![sample()]),
            Err(Error::CorpusWrite(_))
        ));
    }
}
