//! Storage backend (JSON summaries, Arrow/Parquet trial tables)
//!
//! **Write-once design**:
//! - One pretty-printed JSON file per [`SummaryRecord`], named after the
//!   experiment, sample size, replications and bootstrap resamples
//! - Optional per-replication diagnostics as a single Parquet table
//! - Records are never updated in place; a re-run writes a new file
//!
//! [`SummaryStore`] reads a directory of records back for reporting and
//! groups them by experiment, ordered by sample size.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::{debug, info};

use crate::aggregate::SummaryRecord;
use crate::runner::TrialRow;
use crate::{Error, Result};

/// In-memory collection of summary records.
///
/// ## Ordering
///
/// `records_for` returns an experiment's records ordered by sample size,
/// which is the column order of comparison tables.
#[derive(Debug, Default)]
pub struct SummaryStore {
    records: Vec<SummaryRecord>,
}

impl SummaryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the number of records in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Add a record to the store.
    pub fn add(&mut self, record: SummaryRecord) {
        self.records.push(record);
    }

    /// All records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    /// Distinct experiment names, sorted.
    #[must_use]
    pub fn experiments(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.records.iter().map(SummaryRecord::name).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Records of one experiment, sorted by sample size.
    #[must_use]
    pub fn records_for(&self, name: &str) -> Vec<&SummaryRecord> {
        let mut records: Vec<&SummaryRecord> =
            self.records.iter().filter(|r| r.name() == name).collect();
        records.sort_by_key(|r| r.sample_size());
        records
    }

    /// File name of `record`: `<name>_n=<n>_R=<reps>_B=<boot>.json`.
    #[must_use]
    pub fn file_name(record: &SummaryRecord) -> String {
        format!(
            "{}_n={}_R={}_B={}.json",
            record.name(),
            record.sample_size(),
            record.spec().replications(),
            record.spec().bootstrap_resamples()
        )
    }

    /// Write `record` as pretty JSON into `dir` (created if missing).
    ///
    /// # Errors
    /// Returns error if the directory or file cannot be written
    pub fn save(record: &SummaryRecord, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(record));
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, record)?;
        info!(path = %path.display(), "saved summary record");
        Ok(path)
    }

    /// Read one record.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<SummaryRecord> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read every `*.json` record in `dir`, in file-name order.
    ///
    /// # Errors
    /// Returns error if the directory cannot be listed or a record does not parse
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            debug!(path = %path.display(), "loading summary record");
            store.add(Self::load(&path)?);
        }
        Ok(store)
    }
}

fn trial_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("index", DataType::UInt64, false),
        Field::new("seed", DataType::UInt64, false),
        Field::new("estimate", DataType::Float64, true),
        Field::new("std_error", DataType::Float64, true),
        Field::new("bootstrap_std_error", DataType::Float64, true),
        Field::new("bandwidth", DataType::Float64, true),
        Field::new("discarded_draws", DataType::UInt64, false),
        Field::new("failure", DataType::Utf8, true),
    ]))
}

/// Write trial diagnostics as a Parquet table.
///
/// # Errors
/// Returns error if the file cannot be created or written
pub fn write_trial_table(path: impl AsRef<Path>, rows: &[TrialRow]) -> Result<()> {
    let schema = trial_schema();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.index))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.seed))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.estimate))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.std_error))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.bootstrap_std_error))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.bandwidth))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.discarded_draws))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.failure.as_deref()))),
    ];
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;

    let file = File::create(path.as_ref())?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    info!(path = %path.as_ref().display(), rows = rows.len(), "wrote trial table");
    Ok(())
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::Other(format!("Trial table column `{name}` missing or mistyped")))
}

fn optional(values: &Float64Array, i: usize) -> Option<f64> {
    values.is_valid(i).then(|| values.value(i))
}

/// Read a Parquet table written by [`write_trial_table`].
///
/// # Errors
/// Returns error if the file cannot be read or its schema does not match
pub fn read_trial_table(path: impl AsRef<Path>) -> Result<Vec<TrialRow>> {
    let file = File::open(path.as_ref())?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let index = column::<UInt64Array>(&batch, "index")?;
        let seed = column::<UInt64Array>(&batch, "seed")?;
        let estimate = column::<Float64Array>(&batch, "estimate")?;
        let std_error = column::<Float64Array>(&batch, "std_error")?;
        let bootstrap_std_error = column::<Float64Array>(&batch, "bootstrap_std_error")?;
        let bandwidth = column::<Float64Array>(&batch, "bandwidth")?;
        let discarded = column::<UInt64Array>(&batch, "discarded_draws")?;
        let failure = column::<StringArray>(&batch, "failure")?;

        for i in 0..batch.num_rows() {
            rows.push(TrialRow {
                index: index.value(i),
                seed: seed.value(i),
                estimate: optional(estimate, i),
                std_error: optional(std_error, i),
                bootstrap_std_error: optional(bootstrap_std_error, i),
                bandwidth: optional(bandwidth, i),
                discarded_draws: discarded.value(i),
                failure: failure.is_valid(i).then(|| failure.value(i).to_string()),
            });
        }
    }
    Ok(rows)
}
