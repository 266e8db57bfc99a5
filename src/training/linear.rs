//! Built-in least-squares fare model
//!
//! Ordinary least squares over the five serving features, solved from the
//! normal equations with partial pivoting. A vanishing ridge term keeps the
//! system solvable when a feature is constant in the training window.

use super::features::{derive_training_set, TrainingSet};
use super::{Trainer, TrainingConfig, INJECT_FACTOR};
use crate::artifact::ModelArtifact;
use crate::dataset::{load_parquet, Dataset};
use crate::schema::FEATURE_NAMES;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;
use trueno::Vector;

/// Seed for the train/holdout shuffle
pub const SPLIT_SEED: u64 = 42;

/// Share of rows used for fitting; the rest is holdout
pub const TRAIN_FRACTION: f64 = 0.8;

/// Metric key for holdout mean absolute error
pub const HOLDOUT_MAE_METRIC: &str = "holdout_mae";

/// Intercept plus one weight per feature
const P: usize = 6;
const RIDGE_SCALE: f64 = 1e-9;
const PIVOT_EPSILON: f64 = 1e-12;

/// Linear model `y = intercept + coefficients · x`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// Bias term
    pub intercept: f64,
    /// One weight per feature, in schema order
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    /// Fit by least squares.
    ///
    /// # Errors
    ///
    /// Returns `Error::TrainingError` if there are no rows, row and target
    /// counts differ, any value is non-finite, or the system is singular.
    pub fn fit(features: &[[f64; 5]], targets: &[f64]) -> Result<Self> {
        if features.is_empty() || features.len() != targets.len() {
            return Err(Error::TrainingError(format!(
                "need matching non-empty rows and targets, got {} and {}",
                features.len(),
                targets.len()
            )));
        }
        if features.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
            return Err(Error::TrainingError("training data contains non-finite values".to_string()));
        }

        let mut gram = [[0.0_f64; P]; P];
        let mut rhs = [0.0_f64; P];
        for (row, &y) in features.iter().zip(targets) {
            let x = augmented(row);
            for i in 0..P {
                rhs[i] += x[i] * y;
                for j in 0..P {
                    gram[i][j] += x[i] * x[j];
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let mean_diag = (0..P).map(|i| gram[i][i]).sum::<f64>() / P as f64;
        let ridge = RIDGE_SCALE * mean_diag.max(1.0);
        for (i, row) in gram.iter_mut().enumerate().skip(1) {
            row[i] += ridge;
        }

        let beta = solve(gram, rhs)?;
        Ok(Self {
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
        })
    }

    /// Predict one row.
    ///
    /// # Errors
    ///
    /// Returns `Error::InferenceError` if the row length does not match the
    /// model or the result is not finite.
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(Error::InferenceError(format!(
                "model expects {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }
        let value = self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Error::InferenceError(format!("prediction is not finite: {value}")))
        }
    }
}

fn augmented(row: &[f64; 5]) -> [f64; P] {
    [1.0, row[0], row[1], row[2], row[3], row[4]]
}

/// Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Result<[f64; N]> {
    let scale = a
        .iter()
        .flatten()
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON * scale {
            return Err(Error::TrainingError(
                "normal equations are singular; features are degenerate".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Mean absolute error, summed with trueno's compensated SIMD sum.
///
/// trueno vectors are f32, so per-row errors are narrowed before the
/// reduction. The metric is accurate to f32 precision (about 1e-7 relative),
/// which is ample for a reported holdout score; predictions stay f64.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn mean_absolute_error(model: &LinearModel, features: &[[f64; 5]], targets: &[f64]) -> Result<f64> {
    if features.is_empty() {
        return Err(Error::TrainingError("holdout set is empty".to_string()));
    }
    let errors = features
        .iter()
        .zip(targets)
        .map(|(row, y)| model.predict(row).map(|p| (p - y).abs() as f32))
        .collect::<Result<Vec<f32>>>()?;
    let total = Vector::from_slice(&errors)
        .sum_kahan()
        .map_err(|e| Error::TrainingError(format!("MAE reduction failed: {e}")))?;
    Ok(f64::from(total) / errors.len() as f64)
}

/// Deterministic shuffled split into (train, holdout).
fn split(set: &TrainingSet) -> (TrainingSet, TrainingSet) {
    let mut order: Vec<usize> = (0..set.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(SPLIT_SEED));

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let cut = ((set.len() as f64 * TRAIN_FRACTION).floor() as usize).clamp(1, set.len() - 1);

    let take = |indices: &[usize]| TrainingSet {
        features: indices.iter().map(|&i| set.features[i]).collect(),
        targets: indices.iter().map(|&i| set.targets[i]).collect(),
    };
    (take(&order[..cut]), take(&order[cut..]))
}

/// Trainer fitting a [`LinearModel`] from a Parquet training file
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrainer;

impl LinearTrainer {
    /// Fit on an in-memory dataset and build the artifact (nothing is written).
    ///
    /// # Errors
    ///
    /// Returns `Error::DataError` for missing columns and
    /// `Error::TrainingError` if fewer than two complete rows remain or the
    /// fit fails.
    pub fn fit_dataset(&self, dataset: &Dataset, inject_drift: bool) -> Result<ModelArtifact> {
        let mut set = derive_training_set(dataset)?;
        if set.len() < 2 {
            return Err(Error::TrainingError(format!(
                "need at least 2 complete rows to train, dataset '{}' has {}",
                dataset.name(),
                set.len()
            )));
        }
        if inject_drift {
            for y in &mut set.targets {
                *y *= INJECT_FACTOR;
            }
        }

        let (train, holdout) = split(&set);
        let model = LinearModel::fit(&train.features, &train.targets)?;
        let mae = mean_absolute_error(&model, &holdout.features, &holdout.targets)?;

        info!(
            rows = set.len(),
            train_rows = train.len(),
            holdout_rows = holdout.len(),
            inject_drift,
            holdout_mae = mae,
            "fitted linear fare model"
        );

        #[allow(clippy::cast_precision_loss)]
        let artifact = ModelArtifact::from_model(&model, FEATURE_NAMES)?
            .with_metric(HOLDOUT_MAE_METRIC, mae)
            .with_metric("train_rows", train.len() as f64)
            .with_metric("holdout_rows", holdout.len() as f64)
            .with_metric("inject_drift", if inject_drift { 1.0 } else { 0.0 });
        Ok(artifact)
    }
}

impl Trainer for LinearTrainer {
    fn train(&self, config: &TrainingConfig) -> Result<ModelArtifact> {
        let dataset = load_parquet("training", &config.data_path)?;
        let artifact = self.fit_dataset(&dataset, config.inject_drift)?;
        artifact.write_atomic(&config.output_path)?;
        Ok(artifact)
    }
}
