//! Drift detection
//!
//! Compares a reference and a current [`Dataset`] column by column with the
//! two-sample Kolmogorov–Smirnov test and folds the per-column verdicts into
//! one [`DriftReport`].
//!
//! ## Determinism
//!
//! Requested columns are de-duplicated and sorted before testing. Columns are
//! tested in parallel (rayon) but collected in sorted order, so the report is
//! identical for identical inputs.
//!
//! ## Example
//!
//! ```rust
//! use farewatch::dataset::Dataset;
//! use farewatch::drift::detect;
//!
//! let reference = Dataset::from_columns("reference", [("trip_distance", vec![1.0, 2.0, 3.0, 4.0])])?;
//! let current = Dataset::from_columns("current", [("trip_distance", vec![10.0, 20.0, 30.0, 40.0])])?;
//!
//! let report = detect(&reference, &current, ["trip_distance"], 0.05)?;
//! assert_eq!(report.results().len(), 1);
//! # Ok::<(), farewatch::Error>(())
//! ```

mod ks;

pub use ks::{ks_2samp, KsResult, MIN_SAMPLES};

use crate::dataset::Dataset;
use crate::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Default significance level
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Columns monitored when none are configured
pub const DEFAULT_COLUMNS: [&str; 2] = ["trip_distance", "fare_amount"];

/// KS verdict for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDriftResult {
    /// Column name
    pub column: String,
    /// KS statistic D
    pub statistic: f64,
    /// p-value in [0, 1]
    pub p_value: f64,
    /// `p_value < threshold`
    pub is_drift: bool,
}

/// Per-column results plus the aggregate verdict.
///
/// `aggregate_drift` is computed from the results at construction and the
/// report cannot be mutated afterwards. Deserialization goes through the same
/// constructor and rejects a stored flag that disagrees with the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDriftReport")]
pub struct DriftReport {
    results: Vec<FeatureDriftResult>,
    aggregate_drift: bool,
}

/// Wire shape of a [`DriftReport`] before the aggregate is checked
#[derive(Deserialize)]
struct RawDriftReport {
    results: Vec<FeatureDriftResult>,
    aggregate_drift: bool,
}

impl TryFrom<RawDriftReport> for DriftReport {
    type Error = String;

    fn try_from(raw: RawDriftReport) -> std::result::Result<Self, Self::Error> {
        let report = Self::new(raw.results);
        if report.aggregate_drift == raw.aggregate_drift {
            Ok(report)
        } else {
            Err(format!(
                "aggregate_drift is {} but the column results give {}",
                raw.aggregate_drift, report.aggregate_drift
            ))
        }
    }
}

impl DriftReport {
    /// Build a report; `aggregate_drift` is the OR of all `is_drift` flags.
    #[must_use]
    pub fn new(results: Vec<FeatureDriftResult>) -> Self {
        let aggregate_drift = results.iter().any(|r| r.is_drift);
        Self {
            results,
            aggregate_drift,
        }
    }

    /// Per-column results in column-name order
    #[must_use]
    pub fn results(&self) -> &[FeatureDriftResult] {
        &self.results
    }

    /// True if any column drifted
    #[must_use]
    pub const fn aggregate_drift(&self) -> bool {
        self.aggregate_drift
    }

    /// Result for one column, if it was tested
    #[must_use]
    pub fn result(&self, column: &str) -> Option<&FeatureDriftResult> {
        self.results.iter().find(|r| r.column == column)
    }

    /// Names of drifting columns
    pub fn drifted_columns(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.is_drift)
            .map(|r| r.column.as_str())
    }
}

/// Which columns to test and at what significance level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    columns: BTreeSet<String>,
    threshold: f64,
}

impl DetectorConfig {
    /// Create a config for the given columns at the default threshold.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Set the significance threshold
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Monitored columns, sorted
    #[must_use]
    pub const fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    /// Significance threshold
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run detection over a reference/current pair with this config.
    ///
    /// # Errors
    ///
    /// See [`detect`].
    pub fn detect(&self, reference: &Dataset, current: &Dataset) -> Result<DriftReport> {
        detect(reference, current, &self.columns, self.threshold)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS)
    }
}

/// Test each requested column for distribution drift.
///
/// Missing entries are dropped from each side independently before testing.
///
/// # Errors
///
/// - `Error::InvalidInput` if no columns are requested or `threshold` is not
///   strictly between 0 and 1
/// - `Error::DataError` if a column is absent from either dataset or has
///   fewer than [`MIN_SAMPLES`] valid values or an infinite value on either
///   side. No partial report is produced.
pub fn detect<I, S>(
    reference: &Dataset,
    current: &Dataset,
    columns: I,
    threshold: f64,
) -> Result<DriftReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(Error::InvalidInput(format!(
            "drift threshold must be in (0, 1), got {threshold}"
        )));
    }

    let columns: Vec<String> = columns
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if columns.is_empty() {
        return Err(Error::InvalidInput(
            "no columns requested for drift detection".to_string(),
        ));
    }

    let results = columns
        .par_iter()
        .map(|column| test_column(reference, current, column, threshold))
        .collect::<Result<Vec<_>>>()?;

    Ok(DriftReport::new(results))
}

fn test_column(
    reference: &Dataset,
    current: &Dataset,
    column: &str,
    threshold: f64,
) -> Result<FeatureDriftResult> {
    let ref_values = reference.valid_values(column)?;
    let cur_values = current.valid_values(column)?;

    for (dataset, values) in [(reference, &ref_values), (current, &cur_values)] {
        if values.len() < MIN_SAMPLES {
            return Err(Error::DataError(format!(
                "column '{column}' in dataset '{}' has {} valid values after dropping missing entries, need at least {MIN_SAMPLES}",
                dataset.name(),
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::DataError(format!(
                "column '{column}' in dataset '{}' contains non-finite value {bad}",
                dataset.name()
            )));
        }
    }

    let KsResult { statistic, p_value } = ks_2samp(&ref_values, &cur_values)?;
    let is_drift = p_value < threshold;

    debug!(
        column,
        statistic,
        p_value,
        is_drift,
        reference_n = ref_values.len(),
        current_n = cur_values.len(),
        "ks test"
    );

    Ok(FeatureDriftResult {
        column: column.to_string(),
        statistic,
        p_value,
        is_drift,
    })
}
