//! Parquet dataset source (Arrow columnar format)
//!
//! Numeric columns of any width are cast to `Float64`. Timestamp columns
//! become epoch seconds. The pickup timestamp may also arrive as text
//! (`YYYY-MM-DD HH:MM:SS`, as written by CSV exports) and is parsed the same
//! way. Every other column type is skipped.

use super::{Dataset, DatasetLoader, DatasetPair, CURRENT, REFERENCE};
use crate::schema::PICKUP_COLUMN;
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PICKUP_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Loads the reference/current pair from two Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetLoader {
    reference_path: PathBuf,
    current_path: PathBuf,
}

impl ParquetLoader {
    /// Create a loader for the given file pair.
    #[must_use]
    pub fn new(reference_path: impl Into<PathBuf>, current_path: impl Into<PathBuf>) -> Self {
        Self {
            reference_path: reference_path.into(),
            current_path: current_path.into(),
        }
    }
}

impl DatasetLoader for ParquetLoader {
    fn load(&self) -> Result<DatasetPair> {
        Ok(DatasetPair {
            reference: load_parquet(REFERENCE, &self.reference_path)?,
            current: load_parquet(CURRENT, &self.current_path)?,
        })
    }
}

/// Load a Parquet file into a named [`Dataset`].
///
/// # Errors
/// Returns error if the file cannot be read or parsed
pub fn load_parquet<P: AsRef<Path>>(name: &str, path: P) -> Result<Dataset> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;

    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::StorageError(format!("Failed to open Parquet file {}: {e}", path.display()))
    })?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
        Error::StorageError(format!("Failed to parse Parquet file {}: {e}", path.display()))
    })?;

    let reader = builder.build().map_err(|e| {
        Error::StorageError(format!("Failed to create Parquet reader: {e}"))
    })?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| {
            Error::StorageError(format!("Failed to read record batch: {e}"))
        })?;
        batches.push(batch);
    }

    let dataset = dataset_from_batches(name, &batches)?;
    info!(
        dataset = name,
        path = %path.display(),
        rows = dataset.num_rows(),
        "loaded parquet dataset"
    );
    Ok(dataset)
}

/// Convert record batches sharing one schema into a [`Dataset`].
///
/// # Errors
/// Returns error if batch schemas differ or a column cannot be converted
pub fn dataset_from_batches(name: &str, batches: &[RecordBatch]) -> Result<Dataset> {
    let mut columns: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();

    let Some(first) = batches.first() else {
        return Dataset::new(name, columns);
    };
    let schema = first.schema();

    for batch in batches {
        if batch.schema() != schema {
            return Err(Error::StorageError(format!(
                "Schema mismatch in dataset '{name}': expected {:?}, got {:?}",
                schema,
                batch.schema()
            )));
        }

        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let Some(values) = column_values(field.name(), array)? else {
                continue;
            };
            columns.entry(field.name().clone()).or_default().extend(values);
        }
    }

    for field in schema.fields() {
        if !columns.contains_key(field.name()) {
            debug!(dataset = name, column = %field.name(), data_type = %field.data_type(), "skipping non-numeric column");
        }
    }

    Dataset::new(name, columns)
}

fn column_values(name: &str, array: &ArrayRef) -> Result<Option<Vec<Option<f64>>>> {
    match array.data_type() {
        DataType::Timestamp(unit, _) => {
            let seconds_per_unit = match unit {
                TimeUnit::Second => 1.0,
                TimeUnit::Millisecond => 1e-3,
                TimeUnit::Microsecond => 1e-6,
                TimeUnit::Nanosecond => 1e-9,
            };
            let raw = cast(array, &DataType::Int64)?;
            let raw = downcast::<Int64Array>(name, &raw)?;
            #[allow(clippy::cast_precision_loss)]
            let values = raw
                .iter()
                .map(|v| v.map(|t| t as f64 * seconds_per_unit))
                .collect();
            Ok(Some(values))
        }
        DataType::Utf8 if name == PICKUP_COLUMN => {
            let text = downcast::<StringArray>(name, array)?;
            #[allow(clippy::cast_precision_loss)]
            let values = text
                .iter()
                .map(|v| {
                    v.and_then(|s| NaiveDateTime::parse_from_str(s.trim(), PICKUP_TEXT_FORMAT).ok())
                        .map(|dt| dt.and_utc().timestamp() as f64)
                })
                .collect();
            Ok(Some(values))
        }
        data_type if data_type.is_numeric() => {
            let floats = cast(array, &DataType::Float64)?;
            let floats = downcast::<Float64Array>(name, &floats)?;
            Ok(Some(floats.iter().collect()))
        }
        _ => Ok(None),
    }
}

fn downcast<'a, T: 'static>(name: &str, array: &'a ArrayRef) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::StorageError(format!(
            "Column '{name}' has unexpected array type {}",
            array.data_type()
        ))
    })
}
