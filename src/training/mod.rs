//! Training invocation contract
//!
//! The monitor loop never trains in-process; it asks an external pipeline to
//! run a [`Trainer`] with a [`TrainingConfig`]. The trainer writes a
//! [`ModelArtifact`](crate::artifact::ModelArtifact) atomically to
//! `output_path`, and the model server picks it up from there.
//!
//! With `inject_drift` set, the target column is multiplied by
//! [`INJECT_FACTOR`] before fitting. Features are never modified.

mod features;
mod linear;

pub use features::{derive_training_set, TrainingSet};
pub use linear::{LinearModel, LinearTrainer, HOLDOUT_MAE_METRIC, SPLIT_SEED, TRAIN_FRACTION};

use crate::artifact::ModelArtifact;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Target multiplier applied when drift injection is requested
pub const INJECT_FACTOR: f64 = 1.5;

/// Parameters for one training run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Inflate the target by [`INJECT_FACTOR`] before fitting
    pub inject_drift: bool,
    /// Parquet file with features and `fare_amount`
    pub data_path: PathBuf,
    /// Where the artifact is written
    pub output_path: PathBuf,
}

impl TrainingConfig {
    /// Config for a clean (non-injected) run
    #[must_use]
    pub fn new(data_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            inject_drift: false,
            data_path: data_path.into(),
            output_path: output_path.into(),
        }
    }

    /// Set the injection flag
    #[must_use]
    pub fn with_inject_drift(mut self, inject_drift: bool) -> Self {
        self.inject_drift = inject_drift;
        self
    }
}

/// Something that can turn a [`TrainingConfig`] into a model artifact.
pub trait Trainer {
    /// Fit a model and write its artifact to `config.output_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be loaded, fitting fails, or the
    /// artifact cannot be written.
    fn train(&self, config: &TrainingConfig) -> Result<ModelArtifact>;
}

/// Parse the webhook's string-typed injection flag.
///
/// Only the exact strings `"true"` and `"false"` are accepted.
///
/// # Errors
///
/// Returns `Error::InvalidInput` for any other value.
pub fn parse_simulate_drift(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::InvalidInput(format!(
            "simulate_drift must be \"true\" or \"false\", got {other:?}"
        ))),
    }
}
