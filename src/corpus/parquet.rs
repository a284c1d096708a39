//! Parquet-backed corpus
//!
//! ```text
//! <data_dir>/synthetic.parquet          written once
//! <data_dir>/real/part-000001.parquet   one segment per harvest
//! ```
//!
//! Every file is staged under a unique temporary name, synced, then
//! hard-linked to its final name. Linking fails instead of replacing an
//! existing file, so readers only ever see complete segments and a writer
//! that loses a race for a segment number (another store or process on the
//! same directory) moves on to the next free one. Existing files are never
//! rewritten.

use super::{CorpusStore, DataSource, TrainingSample};
use crate::config::{PathsConfig, SYNTHETIC_SAMPLE_WEIGHT};
use crate::daily_log::DailyLog;
use crate::features::{CropFeatures, FEATURE_COLUMNS};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SEGMENT_PREFIX: &str = "part-";
const SEGMENT_SUFFIX: &str = ".parquet";
const MAX_PUBLISH_ATTEMPTS: usize = 64;

static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

fn corpus_schema() -> SchemaRef {
    let mut fields = Vec::with_capacity(FEATURE_COLUMNS.len() + 6);
    fields.push(Field::new("seed_type", DataType::Utf8, false));
    // column 0 of the feature schema is the vocabulary index, which is not stored
    for name in &FEATURE_COLUMNS[1..] {
        fields.push(Field::new(*name, DataType::Float64, false));
    }
    fields.push(Field::new("final_yield", DataType::Float64, false));
    fields.push(Field::new("yield_efficiency", DataType::Float64, false));
    fields.push(Field::new("sample_weight", DataType::Float64, false));
    fields.push(Field::new("data_source", DataType::Utf8, false));
    fields.push(Field::new("created_at", DataType::Utf8, false));
    fields.push(Field::new("daily_logs", DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}

fn to_batch(samples: &[TrainingSample]) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(FEATURE_COLUMNS.len() + 6);
    columns.push(Arc::new(StringArray::from_iter_values(
        samples.iter().map(|s| s.seed_type.as_str()),
    )));
    for col in 0..FEATURE_COLUMNS.len() - 1 {
        columns.push(Arc::new(Float64Array::from_iter_values(
            samples.iter().map(|s| s.features.numeric()[col]),
        )));
    }
    columns.push(Arc::new(Float64Array::from_iter_values(samples.iter().map(|s| s.final_yield))));
    columns.push(Arc::new(Float64Array::from_iter_values(
        samples.iter().map(|s| s.yield_efficiency),
    )));
    columns.push(Arc::new(Float64Array::from_iter_values(samples.iter().map(|s| s.sample_weight))));
    columns.push(Arc::new(StringArray::from_iter_values(
        samples.iter().map(|s| s.data_source.as_str()),
    )));
    columns.push(Arc::new(StringArray::from_iter_values(
        samples.iter().map(|s| s.created_at.to_rfc3339()),
    )));
    let logs = samples
        .iter()
        .map(|s| s.daily_logs.as_ref().map(serde_json::to_string).transpose())
        .collect::<std::result::Result<Vec<Option<String>>, _>>()?;
    columns.push(Arc::new(StringArray::from(logs)));

    Ok(RecordBatch::try_new(corpus_schema(), columns)?)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::Data(format!("corpus segment is missing column '{name}'")))
}

fn from_batch(batch: &RecordBatch) -> Result<Vec<TrainingSample>> {
    let seed_type = column::<StringArray>(batch, "seed_type")?;
    let features = FEATURE_COLUMNS[1..]
        .iter()
        .map(|name| column::<Float64Array>(batch, name))
        .collect::<Result<Vec<_>>>()?;
    let final_yield = column::<Float64Array>(batch, "final_yield")?;
    let efficiency = column::<Float64Array>(batch, "yield_efficiency")?;
    let weight = column::<Float64Array>(batch, "sample_weight")?;
    let source = column::<StringArray>(batch, "data_source")?;
    let created_at = column::<StringArray>(batch, "created_at")?;
    let logs = column::<StringArray>(batch, "daily_logs")?;

    (0..batch.num_rows())
        .map(|row| {
            let mut values = [0.0; 18];
            for (value, col) in values.iter_mut().zip(&features) {
                *value = col.value(row);
            }
            let created_at = DateTime::parse_from_rfc3339(created_at.value(row))
                .map_err(|e| Error::Data(format!("corpus timestamp: {e}")))?
                .with_timezone(&Utc);
            let daily_logs = if logs.is_null(row) {
                None
            } else {
                Some(serde_json::from_str::<Vec<DailyLog>>(logs.value(row))?)
            };
            Ok(TrainingSample {
                seed_type: seed_type.value(row).to_string(),
                features: CropFeatures::from_numeric(values),
                final_yield: final_yield.value(row),
                yield_efficiency: efficiency.value(row),
                sample_weight: weight.value(row),
                data_source: source.value(row).parse::<DataSource>()?,
                created_at,
                daily_logs,
            })
        })
        .collect()
}

/// Write `samples` to a uniquely named, synced temp file in `dir`.
fn stage(dir: &Path, samples: &[TrainingSample]) -> Result<PathBuf> {
    let batch = to_batch(samples)?;
    let tmp = dir.join(format!(
        ".staging-{}-{}.parquet.tmp",
        std::process::id(),
        STAGE_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| -> Result<()> {
        let file = File::create(&tmp)?;
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        File::open(&tmp)?.sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Link a staged file to `target`. Never replaces: an existing `target`
/// is reported as `ErrorKind::AlreadyExists`.
fn publish(staged: &Path, target: &Path) -> std::io::Result<()> {
    fs::hard_link(staged, target)?;
    if let Some(dir) = target.parent() {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<TrainingSample>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let mut samples = Vec::new();
    for batch in reader {
        samples.extend(from_batch(&batch?)?);
    }
    Ok(samples)
}

fn row_count(path: &Path) -> Result<usize> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let rows = builder.metadata().file_metadata().num_rows();
    usize::try_from(rows).map_err(|_| Error::Data(format!("{} reports {rows} rows", path.display())))
}

fn segment_number(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Row counts per segment number, filled in from disk as segments appear
#[derive(Default)]
struct Segments {
    rows: BTreeMap<u64, usize>,
}

impl Segments {
    /// Pick up segments written since the last look, by any writer.
    fn refresh(&mut self, dir: &Path) -> Result<()> {
        for (number, path) in list_segments(dir)? {
            if !self.rows.contains_key(&number) {
                let rows = row_count(&path)?;
                self.rows.insert(number, rows);
            }
        }
        Ok(())
    }

    fn next_number(&self) -> u64 {
        self.rows.keys().next_back().map_or(1, |n| n + 1)
    }

    fn total(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Durable [`CorpusStore`] on local disk.
pub struct ParquetCorpusStore {
    synthetic_path: PathBuf,
    real_dir: PathBuf,
    real_sample_weight: f64,
    segments: Mutex<Segments>,
}

impl ParquetCorpusStore {
    /// Open (creating directories as needed) the corpus under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or an existing
    /// segment cannot be read
    pub fn open(paths: &PathsConfig, real_sample_weight: f64) -> Result<Self> {
        let real_dir = paths.real_corpus_dir();
        fs::create_dir_all(&real_dir)?;

        let mut segments = Segments::default();
        segments.refresh(&real_dir)?;
        tracing::debug!(
            segments = segments.rows.len(),
            rows = segments.total(),
            dir = %real_dir.display(),
            "corpus opened"
        );

        Ok(Self {
            synthetic_path: paths.synthetic_corpus(),
            real_dir,
            real_sample_weight,
            segments: Mutex::new(segments),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Segments> {
        self.segments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Link `staged` under the next free segment number, skipping numbers
    /// claimed by other writers in the meantime.
    fn claim_segment(&self, staged: &Path, segments: &mut Segments) -> Result<u64> {
        for _ in 0..MAX_PUBLISH_ATTEMPTS {
            segments
                .refresh(&self.real_dir)
                .map_err(|e| Error::CorpusWrite(format!("{}: {e}", self.real_dir.display())))?;
            let number = segments.next_number();
            let path = self.real_dir.join(format!("{SEGMENT_PREFIX}{number:06}{SEGMENT_SUFFIX}"));
            match publish(staged, &path) {
                Ok(()) => {
                    segments.rows.insert(number, 1);
                    return Ok(number);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(segment = number, "segment claimed by another writer");
                }
                Err(e) => {
                    return Err(Error::CorpusWrite(format!("{}: {e}", path.display())));
                }
            }
        }
        Err(Error::CorpusWrite(format!(
            "no free segment number in {} after {MAX_PUBLISH_ATTEMPTS} attempts",
            self.real_dir.display()
        )))
    }

    /// Number of real segments on disk
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed
    pub fn segment_count(&self) -> Result<usize> {
        Ok(list_segments(&self.real_dir)?.len())
    }
}

fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut segments = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if let Some(n) = segment_number(&path) {
            segments.push((n, path));
        }
    }
    segments.sort_by_key(|(n, _)| *n);
    Ok(segments)
}

impl CorpusStore for ParquetCorpusStore {
    fn append_real(&self, sample: TrainingSample) -> Result<usize> {
        let sample = TrainingSample {
            data_source: DataSource::Real,
            sample_weight: self.real_sample_weight,
            ..sample
        };
        let mut segments = self.lock();
        let staged = stage(&self.real_dir, std::slice::from_ref(&sample))
            .map_err(|e| Error::CorpusWrite(format!("{}: {e}", self.real_dir.display())))?;
        let result = self.claim_segment(&staged, &mut segments);
        let _ = fs::remove_file(&staged);

        let number = result?;
        tracing::debug!(segment = number, rows = segments.total(), "harvest sample appended");
        Ok(segments.total())
    }

    fn real_count(&self) -> Result<usize> {
        let mut segments = self.lock();
        segments.refresh(&self.real_dir)?;
        Ok(segments.total())
    }

    fn load_real(&self) -> Result<Vec<TrainingSample>> {
        let mut samples = Vec::new();
        for (_, path) in list_segments(&self.real_dir)? {
            samples.extend(
                read_file(&path)?
                    .into_iter()
                    .map(|s| s.with_weight(self.real_sample_weight)),
            );
        }
        Ok(samples)
    }

    fn load_synthetic(&self) -> Result<Vec<TrainingSample>> {
        if !self.synthetic_path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_file(&self.synthetic_path)?
            .into_iter()
            .map(|s| s.with_weight(SYNTHETIC_SAMPLE_WEIGHT))
            .collect())
    }

    fn import_synthetic(&self, samples: Vec<TrainingSample>) -> Result<usize> {
        let _guard = self.lock();
        if self.synthetic_path.exists() {
            return Err(Error::CorpusWrite(format!(
                "{} already exists; the synthetic corpus is immutable",
                self.synthetic_path.display()
            )));
        }
        let samples: Vec<TrainingSample> = samples
            .into_iter()
            .map(|s| TrainingSample {
                data_source: DataSource::Synthetic,
                sample_weight: SYNTHETIC_SAMPLE_WEIGHT,
                ..s
            })
            .collect();
        let dir = self.synthetic_path.parent().unwrap_or_else(|| Path::new("."));
        let staged = stage(dir, &samples)
            .map_err(|e| Error::CorpusWrite(format!("{}: {e}", self.synthetic_path.display())))?;
        let published = publish(&staged, &self.synthetic_path);
        let _ = fs::remove_file(&staged);
        match published {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::CorpusWrite(format!(
                    "{} already exists; the synthetic corpus is immutable",
                    self.synthetic_path.display()
                )));
            }
            Err(e) => {
                return Err(Error::CorpusWrite(format!("{}: {e}", self.synthetic_path.display())));
            }
        }
        tracing::info!(samples = samples.len(), "synthetic corpus imported");
        Ok(samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{Difficulty, SeedProfile};
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> PathsConfig {
        PathsConfig {
            data_dir: dir.path().to_path_buf(),
        }
    }

    fn harvest(yield_g: f64) -> TrainingSample {
        let seed = SeedProfile::new("broccoli", "Broccoli", Difficulty::Medium, 450.0, 10, 20.0, 50.0);
        let logs = vec![
            DailyLog::new(1, true).with_temperature(21.0).with_humidity(48.0),
            DailyLog::new(2, false).with_temperature(25.0),
        ];
        TrainingSample::from_harvest(&seed, &logs, yield_g, 1290.0).unwrap()
    }

    #[test]
    fn test_append_creates_one_segment_each() {
        let dir = TempDir::new().unwrap();
        let store = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
        assert_eq!(store.append_real(harvest(400.0)).unwrap(), 1);
        assert_eq!(store.append_real(harvest(410.0)).unwrap(), 2);
        assert_eq!(store.segment_count().unwrap(), 2);
        assert!(dir.path().join("real/part-000002.parquet").exists());
    }

    #[test]
    fn test_samples_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let original = harvest(400.0);
        {
            let store = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
            store.append_real(original.clone()).unwrap();
        }
        let store = ParquetCorpusStore::open(&paths(&dir), 3.0).unwrap();
        assert_eq!(store.real_count().unwrap(), 1);

        let loaded = store.load_real().unwrap();
        assert_eq!(loaded[0].features, original.features);
        assert_eq!(loaded[0].daily_logs, original.daily_logs);
        assert_eq!(loaded[0].data_source, DataSource::Real);
        // weight follows the current multiplier
        assert!((loaded[0].sample_weight - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_synthetic_written_once() {
        let dir = TempDir::new().unwrap();
        let store = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
        assert!(store.load_synthetic().unwrap().is_empty());

        let synthetic = TrainingSample::synthetic("pea", harvest(300.0).features, 300.0);
        assert_eq!(store.import_synthetic(vec![synthetic.clone(); 3]).unwrap(), 3);
        assert_eq!(store.load_synthetic().unwrap().len(), 3);
        assert!(matches!(
            store.import_synthetic(vec![synthetic]),
            Err(Error::CorpusWrite(_))
        ));
    }

    #[test]
    fn test_tmp_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
        fs::write(dir.path().join("real/part-000009.parquet.tmp"), b"partial").unwrap();
        assert_eq!(store.load_real().unwrap().len(), 0);
        assert_eq!(store.segment_count().unwrap(), 0);
    }

    #[test]
    fn test_unwritable_dir_is_corpus_write_error() {
        let dir = TempDir::new().unwrap();
        let store = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
        fs::remove_dir_all(dir.path().join("real")).unwrap();
        assert!(matches!(
            store.append_real(harvest(400.0)),
            Err(Error::CorpusWrite(_))
        ));
        assert_eq!(store.real_count().unwrap(), 0);
    }

    #[test]
    fn test_two_stores_on_one_dir_keep_both_samples() {
        let dir = TempDir::new().unwrap();
        let a = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
        let b = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();

        assert_eq!(a.append_real(harvest(500.0)).unwrap(), 1);
        // b opened before a's append and must not reuse part-000001
        assert_eq!(b.append_real(harvest(123.0)).unwrap(), 2);
        assert_eq!(a.real_count().unwrap(), 2);
        assert_eq!(a.segment_count().unwrap(), 2);

        let mut yields: Vec<f64> = a.load_real().unwrap().iter().map(|s| s.final_yield).collect();
        yields.sort_by(f64::total_cmp);
        assert_eq!(yields, vec![123.0, 500.0]);
    }

    #[test]
    fn test_concurrent_writers_never_clobber() {
        let dir = TempDir::new().unwrap();
        let stores: Vec<ParquetCorpusStore> = (0..3)
            .map(|_| ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap())
            .collect();

        std::thread::scope(|scope| {
            for (s, store) in stores.iter().enumerate() {
                scope.spawn(move || {
                    for i in 0..5 {
                        let grams = f64::from(u32::try_from(s).unwrap() * 100 + i + 100);
                        store.append_real(harvest(grams)).unwrap();
                    }
                });
            }
        });

        assert_eq!(stores[0].real_count().unwrap(), 15);
        let mut yields: Vec<f64> = stores[1].load_real().unwrap().iter().map(|s| s.final_yield).collect();
        yields.sort_by(f64::total_cmp);
        yields.dedup();
        assert_eq!(yields.len(), 15);
        // staging files are cleaned up
        let leftovers = fs::read_dir(dir.path().join("real"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_existing_segment_is_never_replaced() {
        let dir = TempDir::new().unwrap();
        let store = ParquetCorpusStore::open(&paths(&dir), 2.0).unwrap();
        store.append_real(harvest(400.0)).unwrap();
        let first = dir.path().join("real/part-000001.parquet");
        let before = fs::read(&first).unwrap();

        let staged = stage(&dir.path().join("real"), &[harvest(999.0)]).unwrap();
        let err = publish(&staged, &first).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&first).unwrap(), before);
        fs::remove_file(staged).unwrap();
    }
}
