//! Monitor run - one invocation of the drift loop
//!
//! ```text
//! load datasets -> detect drift -> decide -> (dispatch trigger) -> MonitorRun
//! ```
//!
//! A run is a single sequential unit of work with no state carried over from
//! earlier runs. The scheduler that invokes it lives outside this crate.

use crate::dataset::DatasetLoader;
use crate::dispatch::{DispatchResult, Dispatcher, WebhookTransport};
use crate::drift::{DetectorConfig, DriftReport};
use crate::policy::{decide, DecisionOutcome, OperatorAction};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

/// Final status of a monitor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No retraining was needed
    Healthy,
    /// A retrain trigger was accepted
    Dispatched,
    /// Retraining was needed but the trigger was not accepted
    DispatchFailed,
}

/// Record of one monitor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRun {
    run_id: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    report: DriftReport,
    outcome: DecisionOutcome,
    dispatch: Option<DispatchResult>,
}

impl MonitorRun {
    /// Run identifier, derived from the start time
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Final status
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Start timestamp
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// End timestamp
    #[must_use]
    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// Drift report
    #[must_use]
    pub const fn report(&self) -> &DriftReport {
        &self.report
    }

    /// Policy decision
    #[must_use]
    pub const fn outcome(&self) -> DecisionOutcome {
        self.outcome
    }

    /// Dispatch result, if a trigger was sent
    #[must_use]
    pub const fn dispatch(&self) -> Option<&DispatchResult> {
        self.dispatch.as_ref()
    }

    /// Write the run as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` or `Error::Io` on failure.
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), run_id = %self.run_id, "wrote monitor report");
        Ok(())
    }
}

/// Execute one monitor run.
///
/// Dispatch failures are recorded as [`RunStatus::DispatchFailed`]; they do
/// not make the run itself fail.
///
/// # Errors
///
/// - `Error::DataError` / `Error::InvalidInput` from loading or detection
///   (no partial report is produced)
/// - `Error::ConfigError` if a trigger is needed but no token is configured
pub fn run_monitor<L, T>(
    loader: &L,
    detector: &DetectorConfig,
    operator_override: Option<OperatorAction>,
    dispatcher: &Dispatcher<T>,
) -> Result<MonitorRun>
where
    L: DatasetLoader + ?Sized,
    T: WebhookTransport,
{
    let started_at = Utc::now();
    let run_id = started_at.format("run-%Y%m%dT%H%M%S%.3fZ").to_string();
    info!(%run_id, columns = ?detector.columns(), threshold = detector.threshold(), "monitor run started");

    let result = execute(loader, detector, operator_override, dispatcher);
    let (report, outcome, dispatch) = match result {
        Ok(parts) => parts,
        Err(e) => {
            error!(%run_id, error = %e, "monitor run failed");
            return Err(e);
        }
    };

    let status = match &dispatch {
        None => RunStatus::Healthy,
        Some(d) if d.is_success() => RunStatus::Dispatched,
        Some(_) => RunStatus::DispatchFailed,
    };
    if status == RunStatus::DispatchFailed {
        warn!(%run_id, "retraining needed but trigger was not accepted");
    }
    info!(%run_id, ?status, drift = report.aggregate_drift(), "monitor run finished");

    Ok(MonitorRun {
        run_id,
        status,
        started_at,
        ended_at: Utc::now(),
        report,
        outcome,
        dispatch,
    })
}

fn execute<L, T>(
    loader: &L,
    detector: &DetectorConfig,
    operator_override: Option<OperatorAction>,
    dispatcher: &Dispatcher<T>,
) -> Result<(DriftReport, DecisionOutcome, Option<DispatchResult>)>
where
    L: DatasetLoader + ?Sized,
    T: WebhookTransport,
{
    let pair = loader.load()?;
    let report = detector.detect(&pair.reference, &pair.current)?;
    for column in report.drifted_columns() {
        info!(column, "drift detected");
    }

    let outcome = decide(&report, operator_override);
    let dispatch = if outcome.should_train {
        Some(dispatcher.dispatch_with_retry(&outcome)?)
    } else {
        None
    };
    Ok((report, outcome, dispatch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, InMemoryLoader};
    use crate::dispatch::{DispatchConfig, SecretToken, TransportError, WebhookRequest};
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedStatus {
        code: u16,
        calls: AtomicUsize,
    }

    impl FixedStatus {
        fn new(code: u16) -> Self {
            Self {
                code,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl WebhookTransport for FixedStatus {
        fn post(&self, _request: &WebhookRequest<'_>) -> std::result::Result<u16, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.code)
        }
    }

    fn dispatcher(code: u16) -> Dispatcher<FixedStatus> {
        let config = DispatchConfig::new("http://ci.invalid/dispatches")
            .with_token(SecretToken::new("token"));
        Dispatcher::with_transport(config, FixedStatus::new(code))
    }

    fn loader(scale: f64) -> InMemoryLoader {
        let base = [1.5, 2.0, 3.5, 4.0, 5.5].repeat(20);
        let fares: Vec<f64> = base.iter().map(|d| 3.0 + 2.5 * d).collect();
        let reference = Dataset::from_columns(
            "reference",
            [("trip_distance", base.clone()), ("fare_amount", fares.clone())],
        )
        .unwrap();
        let current = Dataset::from_columns(
            "current",
            [
                ("trip_distance", base.iter().map(|d| d * scale).collect()),
                ("fare_amount", fares),
            ],
        )
        .unwrap();
        InMemoryLoader::new(reference, current)
    }

    #[test]
    fn test_healthy_run_sends_nothing() {
        let dispatcher = dispatcher(204);
        let run = run_monitor(&loader(1.0), &DetectorConfig::default(), None, &dispatcher).unwrap();
        assert_eq!(run.status(), RunStatus::Healthy);
        assert!(!run.outcome().should_train);
        assert!(run.dispatch().is_none());
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drift_dispatches() {
        let dispatcher = dispatcher(204);
        let run = run_monitor(&loader(10.0), &DetectorConfig::default(), None, &dispatcher).unwrap();
        assert_eq!(run.status(), RunStatus::Dispatched);
        assert!(run.report().aggregate_drift());
        assert!(!run.outcome().inject_drift);
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_trigger_marks_run() {
        let dispatcher = dispatcher(401);
        let run = run_monitor(&loader(10.0), &DetectorConfig::default(), None, &dispatcher).unwrap();
        assert_eq!(run.status(), RunStatus::DispatchFailed);
        assert_eq!(run.dispatch().unwrap().http_status, Some(401));
    }

    #[test]
    fn test_operator_override_without_drift() {
        let dispatcher = dispatcher(204);
        let run = run_monitor(
            &loader(1.0),
            &DetectorConfig::default(),
            Some(OperatorAction::SimulateDrift),
            &dispatcher,
        )
        .unwrap();
        assert_eq!(run.status(), RunStatus::Dispatched);
        assert!(run.outcome().inject_drift);
    }

    #[test]
    fn test_missing_column_fails_run() {
        let dispatcher = dispatcher(204);
        let detector = DetectorConfig::new(["tip_amount"]);
        let err = run_monitor(&loader(10.0), &detector, None, &dispatcher).unwrap_err();
        assert!(matches!(err, Error::DataError(_)));
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_token_fails_run() {
        let dispatcher = Dispatcher::with_transport(
            DispatchConfig::new("http://ci.invalid/dispatches"),
            FixedStatus::new(204),
        );
        let err = run_monitor(&loader(10.0), &DetectorConfig::default(), None, &dispatcher)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let run = run_monitor(&loader(10.0), &DetectorConfig::default(), None, &dispatcher(204))
            .unwrap();
        run.write_report(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "dispatched");
        assert_eq!(json["report"]["aggregate_drift"], true);
        assert!(run.ended_at() >= run.started_at());
        assert!(run.run_id().starts_with("run-"));

        let reloaded: MonitorRun = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(reloaded.run_id(), run.run_id());
        assert_eq!(reloaded.status(), run.status());
        assert!(reloaded.report().aggregate_drift());

        let mut tampered = json;
        tampered["report"]["aggregate_drift"] = serde_json::Value::Bool(false);
        assert!(serde_json::from_value::<MonitorRun>(tampered).is_err());
    }
}
