//! Column-oriented dataset snapshots
//!
//! A [`Dataset`] is an immutable mapping from column name to an ordered
//! sequence of optional numeric values. Every column has the same length.
//! Missing entries (nulls in the source file, or NaN) are kept as `None`
//! so each consumer decides how to clean them.
//!
//! Columns are stored in a `BTreeMap` so iteration order is the column-name
//! order on every run.

mod parquet_source;

pub use parquet_source::{dataset_from_batches, load_parquet, ParquetLoader};

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Name of the baseline snapshot in a run
pub const REFERENCE: &str = "reference";

/// Name of the snapshot under test in a run
pub const CURRENT: &str = "current";

/// Immutable tabular snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    columns: BTreeMap<String, Vec<Option<f64>>>,
    num_rows: usize,
}

impl Dataset {
    /// Create a dataset from columns that may contain missing values.
    ///
    /// NaN values are normalised to `None`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataError` if the columns differ in length.
    pub fn new(
        name: impl Into<String>,
        columns: BTreeMap<String, Vec<Option<f64>>>,
    ) -> Result<Self> {
        let name = name.into();
        let mut num_rows = None;
        for (column, values) in &columns {
            match num_rows {
                None => num_rows = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    return Err(Error::DataError(format!(
                        "dataset '{name}': column '{column}' has {} rows, expected {expected}",
                        values.len()
                    )));
                }
                Some(_) => {}
            }
        }

        let columns = columns
            .into_iter()
            .map(|(column, values)| {
                let values = values
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()))
                    .collect();
                (column, values)
            })
            .collect();

        Ok(Self {
            name,
            columns,
            num_rows: num_rows.unwrap_or(0),
        })
    }

    /// Create a dataset from fully populated columns.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataError` if the columns differ in length.
    pub fn from_columns<I, S>(name: impl Into<String>, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(column, values)| (column.into(), values.into_iter().map(Some).collect()))
            .collect();
        Self::new(name, columns)
    }

    /// Dataset name ("reference", "current", ...)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Column names in sorted order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// True if the column exists
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Raw column values including missing entries
    #[must_use]
    pub fn column(&self, column: &str) -> Option<&[Option<f64>]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// Column values with missing entries removed, in original order.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataError` if the column does not exist.
    pub fn valid_values(&self, column: &str) -> Result<Vec<f64>> {
        let values = self.column(column).ok_or_else(|| {
            Error::DataError(format!(
                "column '{column}' not found in dataset '{}'",
                self.name
            ))
        })?;
        Ok(values.iter().flatten().copied().collect())
    }
}

/// The two snapshots compared by one monitor run
#[derive(Debug, Clone)]
pub struct DatasetPair {
    /// Baseline distribution
    pub reference: Dataset,
    /// Distribution under test
    pub current: Dataset,
}

/// Source of the reference/current pair for a monitor run.
///
/// Loading is an external concern; the monitor only needs the two
/// snapshots at the start of a run.
pub trait DatasetLoader {
    /// Load both snapshots.
    ///
    /// # Errors
    ///
    /// Returns error if either snapshot cannot be read.
    fn load(&self) -> Result<DatasetPair>;
}

/// Loader over datasets that are already in memory.
#[derive(Debug, Clone)]
pub struct InMemoryLoader {
    pair: DatasetPair,
}

impl InMemoryLoader {
    /// Wrap an existing pair.
    #[must_use]
    pub const fn new(reference: Dataset, current: Dataset) -> Self {
        Self {
            pair: DatasetPair { reference, current },
        }
    }
}

impl DatasetLoader for InMemoryLoader {
    fn load(&self) -> Result<DatasetPair> {
        Ok(self.pair.clone())
    }
}
