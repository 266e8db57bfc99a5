//! Feature matrix extraction for training

use crate::dataset::Dataset;
use crate::schema::{FEATURE_NAMES, PICKUP_COLUMN, TARGET_COLUMN};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Timelike};

/// Rows with all five features and the target present
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    /// Feature rows, ordered as [`FEATURE_NAMES`]
    pub features: Vec<[f64; 5]>,
    /// `fare_amount` per row
    pub targets: Vec<f64>,
}

impl TrainingSet {
    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True if no rows survived extraction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Build the training set from a dataset.
///
/// `hour` and `day_of_week` (Monday = 0) are read from their own columns when
/// present, otherwise derived from the pickup timestamp (epoch seconds, UTC).
/// Rows with any missing value are dropped.
///
/// # Errors
///
/// Returns `Error::DataError` if a required column is absent.
pub fn derive_training_set(dataset: &Dataset) -> Result<TrainingSet> {
    let column = |name: &str| {
        dataset.column(name).ok_or_else(|| {
            Error::DataError(format!(
                "column '{name}' not found in dataset '{}'",
                dataset.name()
            ))
        })
    };

    let distance = column(FEATURE_NAMES[0])?;
    let pickup_zone = column(FEATURE_NAMES[1])?;
    let dropoff_zone = column(FEATURE_NAMES[2])?;
    let target = column(TARGET_COLUMN)?;

    let (hour, day_of_week) = if dataset.has_column(FEATURE_NAMES[3])
        && dataset.has_column(FEATURE_NAMES[4])
    {
        (column(FEATURE_NAMES[3])?.to_vec(), column(FEATURE_NAMES[4])?.to_vec())
    } else {
        let pickup = column(PICKUP_COLUMN)?;
        pickup.iter().map(|ts| calendar_parts(*ts)).unzip()
    };

    let mut set = TrainingSet::default();
    for row in 0..dataset.num_rows() {
        let values = [
            distance[row],
            pickup_zone[row],
            dropoff_zone[row],
            hour[row],
            day_of_week[row],
        ];
        if let (Some(features), Some(y)) = (collect_row(values), target[row]) {
            set.features.push(features);
            set.targets.push(y);
        }
    }
    Ok(set)
}

fn collect_row(values: [Option<f64>; 5]) -> Option<[f64; 5]> {
    let mut row = [0.0; 5];
    for (slot, value) in row.iter_mut().zip(values) {
        *slot = value?;
    }
    Some(row)
}

#[allow(clippy::cast_possible_truncation)]
fn calendar_parts(epoch_seconds: Option<f64>) -> (Option<f64>, Option<f64>) {
    let Some(dt) = epoch_seconds.and_then(|s| DateTime::from_timestamp(s.floor() as i64, 0)) else {
        return (None, None);
    };
    (
        Some(f64::from(dt.hour())),
        Some(f64::from(dt.weekday().num_days_from_monday())),
    )
}
