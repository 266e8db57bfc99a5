//! Retraining decision policy
//!
//! Two independent signals feed a [`DecisionOutcome`]:
//!
//! - **Detected drift** (`DriftReport::aggregate_drift`): retrain on the
//!   existing current data, unmodified.
//! - **Operator action**: an explicit request to retrain. Only
//!   [`OperatorAction::SimulateDrift`] sets `inject_drift`, which tells the
//!   trainer to inflate the target for a reproducible demo scenario.
//!
//! Detected drift never sets `inject_drift`.

use crate::drift::DriftReport;
use serde::{Deserialize, Serialize};

/// Explicit operator request that bypasses statistical detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorAction {
    /// Retrain on clean data (restore a normal model)
    ResetModel,
    /// Retrain with an artificially inflated target
    SimulateDrift,
}

impl OperatorAction {
    /// Whether this action asks the trainer to inject drift
    #[must_use]
    pub const fn inject_drift(self) -> bool {
        matches!(self, Self::SimulateDrift)
    }
}

/// What the loop should do after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    /// Request a retraining run
    pub should_train: bool,
    /// Ask the trainer to synthetically shift the target before fitting
    pub inject_drift: bool,
}

impl DecisionOutcome {
    /// Outcome of an operator action with no drift report.
    #[must_use]
    pub const fn from_operator(action: OperatorAction) -> Self {
        Self {
            should_train: true,
            inject_drift: action.inject_drift(),
        }
    }
}

/// Combine a drift report with an optional operator override.
///
/// `should_train` is set when drift was detected or any override is present;
/// `inject_drift` comes only from the override.
#[must_use]
pub fn decide(report: &DriftReport, operator_override: Option<OperatorAction>) -> DecisionOutcome {
    DecisionOutcome {
        should_train: report.aggregate_drift() || operator_override.is_some(),
        inject_drift: operator_override.is_some_and(OperatorAction::inject_drift),
    }
}
