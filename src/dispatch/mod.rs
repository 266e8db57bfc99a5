//! Retraining trigger dispatch
//!
//! Sends one `repository_dispatch`-style webhook to the external training
//! pipeline:
//!
//! ```text
//! POST <endpoint>
//! Authorization: Bearer <token>
//!
//! {"event_type": "retrain_model_event",
//!  "client_payload": {"simulate_drift": "true" | "false"}}
//! ```
//!
//! `simulate_drift` is a **string**. The consuming workflow compares it as
//! text, so it must stay `"true"`/`"false"` rather than a JSON boolean.
//!
//! Outcomes:
//! - missing token or endpoint: `Err(Error::ConfigError)` before any
//!   network call
//! - HTTP 204: [`DispatchStatus::Success`]
//! - any other status, timeout or transport error:
//!   [`DispatchStatus::Failure`], logged; never a panic

mod retry;
mod transport;

pub use retry::RetryPolicy;
pub use transport::{HttpTransport, TransportError, WebhookRequest, WebhookTransport, USER_AGENT};

use crate::policy::DecisionOutcome;
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Event type the training workflow listens for
pub const RETRAIN_EVENT_TYPE: &str = "retrain_model_event";

/// Payload key carrying the injection flag
pub const SIMULATE_DRIFT_KEY: &str = "simulate_drift";

/// Status code that counts as a successful dispatch
pub const SUCCESS_STATUS: u16 = 204;

/// Default bound on one dispatch attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Webhook body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Always [`RETRAIN_EVENT_TYPE`] for events built here
    pub event_type: String,
    /// String-valued payload; contains [`SIMULATE_DRIFT_KEY`]
    pub client_payload: BTreeMap<String, String>,
}

impl TriggerEvent {
    /// Build a retrain event carrying the injection flag as `"true"`/`"false"`.
    #[must_use]
    pub fn retrain(inject_drift: bool) -> Self {
        let mut client_payload = BTreeMap::new();
        client_payload.insert(SIMULATE_DRIFT_KEY.to_string(), inject_drift.to_string());
        Self {
            event_type: RETRAIN_EVENT_TYPE.to_string(),
            client_payload,
        }
    }

    /// The raw `simulate_drift` payload value
    #[must_use]
    pub fn simulate_drift(&self) -> Option<&str> {
        self.client_payload.get(SIMULATE_DRIFT_KEY).map(String::as_str)
    }
}

/// Dispatch authentication secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wrap a token; blank strings are treated as absent.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// The secret value, for building the `Authorization` header only
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Where and how to dispatch
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    endpoint: String,
    token: Option<SecretToken>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl DispatchConfig {
    /// Config for an endpoint with no token, default timeout, single attempt.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::single_attempt(),
        }
    }

    /// Config targeting GitHub's `repository_dispatch` API for `owner/repo`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if `repository` is not `owner/repo`.
    pub fn github(repository: &str) -> Result<Self> {
        match repository.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(format!(
                    "https://api.github.com/repos/{owner}/{repo}/dispatches"
                )))
            }
            _ => Err(Error::ConfigError(format!(
                "repository must be 'owner/repo', got '{repository}'"
            ))),
        }
    }

    /// Set the token (blank tokens count as missing)
    #[must_use]
    pub fn with_token(mut self, token: Option<SecretToken>) -> Self {
        self.token = token;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Webhook URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True if a token is configured
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Per-attempt timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry policy
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

/// Outcome class of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Endpoint answered 204
    Success,
    /// Anything else
    Failure,
}

/// Result of dispatching one trigger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Success or failure
    pub status: DispatchStatus,
    /// HTTP status of the last attempt, if a response was received
    pub http_status: Option<u16>,
    /// Failure description of the last attempt
    pub detail: Option<String>,
    /// Attempts made
    pub attempts: u32,
}

impl DispatchResult {
    fn success(http_status: u16) -> Self {
        Self {
            status: DispatchStatus::Success,
            http_status: Some(http_status),
            detail: None,
            attempts: 1,
        }
    }

    fn failure(http_status: Option<u16>, detail: String) -> Self {
        Self {
            status: DispatchStatus::Failure,
            http_status,
            detail: Some(detail),
            attempts: 1,
        }
    }

    /// True on HTTP 204
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }

    /// Whether another attempt could plausibly succeed: no response,
    /// 429, or a 5xx.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.is_success()
            && self
                .http_status
                .map_or(true, |code| code == 429 || code >= 500)
    }

    /// Convert a failed dispatch into `Error::DispatchError`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DispatchError` if the status is `Failure`.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::DispatchError(format!(
                "{} (http status: {:?}, attempts: {})",
                self.detail.as_deref().unwrap_or("dispatch failed"),
                self.http_status,
                self.attempts
            )))
        }
    }
}

/// Sends retrain trigger events
pub struct Dispatcher<T = HttpTransport> {
    config: DispatchConfig,
    transport: T,
}

impl Dispatcher<HttpTransport> {
    /// Dispatcher using the real HTTP transport
    #[must_use]
    pub const fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            transport: HttpTransport,
        }
    }
}

impl<T: WebhookTransport> Dispatcher<T> {
    /// Dispatcher with a custom transport
    #[must_use]
    pub const fn with_transport(config: DispatchConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Dispatcher configuration
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The underlying transport
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Send exactly one trigger event for `outcome`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if no token or endpoint is configured; no request is
    /// attempted in that case. Network and HTTP failures are reported in
    /// the returned [`DispatchResult`], not as errors.
    pub fn dispatch(&self, outcome: &DecisionOutcome) -> Result<DispatchResult> {
        let token = self.config.token.as_ref().ok_or_else(|| {
            Error::ConfigError(
                "dispatch token is not set (FAREWATCH_DISPATCH_TOKEN); refusing to send trigger"
                    .to_string(),
            )
        })?;
        if self.config.endpoint.trim().is_empty() {
            return Err(Error::ConfigError(
                "dispatch endpoint is not set (FAREWATCH_DISPATCH_URL or --repo)".to_string(),
            ));
        }

        let event = TriggerEvent::retrain(outcome.inject_drift);
        let request = WebhookRequest {
            url: &self.config.endpoint,
            bearer_token: token.expose(),
            event: &event,
            timeout: self.config.timeout,
        };

        info!(
            endpoint = %self.config.endpoint,
            simulate_drift = event.simulate_drift().unwrap_or_default(),
            "dispatching retrain trigger"
        );

        let result = match self.transport.post(&request) {
            Ok(SUCCESS_STATUS) => DispatchResult::success(SUCCESS_STATUS),
            Ok(code) => DispatchResult::failure(
                Some(code),
                format!("endpoint answered HTTP {code}, expected {SUCCESS_STATUS}"),
            ),
            Err(e) => DispatchResult::failure(None, e.to_string()),
        };

        if result.is_success() {
            info!(http_status = SUCCESS_STATUS, "retrain trigger accepted");
        } else {
            warn!(
                http_status = ?result.http_status,
                detail = result.detail.as_deref().unwrap_or_default(),
                "retrain trigger dispatch failed"
            );
        }
        Ok(result)
    }

    /// Dispatch under the configured [`RetryPolicy`].
    ///
    /// Retries only retryable failures (no response, 429, 5xx), sleeping
    /// with exponential backoff and jitter between attempts.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if no token is configured. Never retried.
    pub fn dispatch_with_retry(&self, outcome: &DecisionOutcome) -> Result<DispatchResult> {
        let policy = self.config.retry;
        let mut rng = rand::thread_rng();
        let mut attempt = 1;

        loop {
            let mut result = self.dispatch(outcome)?;
            result.attempts = attempt;

            if result.is_success() || !result.is_retryable() || attempt >= policy.max_attempts() {
                return Ok(result);
            }

            let delay = policy.delay_for(attempt, rng.gen::<f64>());
            warn!(attempt, delay_ms = delay.as_millis(), "retrying retrain trigger");
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}
