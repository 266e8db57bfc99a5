//! HTTP API
//!
//! | Route | Method | Behavior |
//! |---|---|---|
//! | `/` | GET | health and model state |
//! | `/predict` | POST | fare prediction |
//! | `/reset-model` | POST | dispatch retrain, `simulate_drift = "false"` |
//! | `/simulate-drift` | POST | dispatch retrain, `simulate_drift = "true"` |
//!
//! Errors are `{"detail": "..."}` with 503 for an unloaded server and 500 for
//! inference failures. Malformed JSON bodies are rejected by the extractor
//! (422 for type errors).

use super::{ModelServer, Prediction, ServerState};
use crate::dispatch::{DispatchStatus, Dispatcher, HttpTransport, WebhookTransport};
use crate::policy::{DecisionOutcome, OperatorAction};
use crate::schema::FareFeatures;
use crate::Error;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared handler state
pub struct AppState<T = HttpTransport> {
    /// Model server
    pub server: Arc<ModelServer>,
    /// Dispatcher for operator actions
    pub dispatcher: Arc<Dispatcher<T>>,
}

impl<T> AppState<T> {
    /// Bundle a server and a dispatcher
    #[must_use]
    pub fn new(server: Arc<ModelServer>, dispatcher: Dispatcher<T>) -> Self {
        Self {
            server,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            server: Arc::clone(&self.server),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

/// Build the API router
pub fn router<T: WebhookTransport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/", get(health::<T>))
        .route("/predict", post(predict::<T>))
        .route("/reset-model", post(reset_model::<T>))
        .route("/simulate-drift", post(simulate_drift::<T>))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
struct Health {
    message: String,
    model: ServerState,
}

/// Operator endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorResponse {
    /// Action that was requested
    pub action: OperatorAction,
    /// Dispatch outcome
    pub status: DispatchStatus,
    /// Webhook HTTP status, if any response arrived
    pub http_status: Option<u16>,
    /// Flag sent to the training pipeline
    pub simulate_drift: String,
    /// Dispatch attempts made
    pub attempts: u32,
}

/// Library error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}

async fn health<T: WebhookTransport + 'static>(State(state): State<AppState<T>>) -> Json<Health> {
    Json(Health {
        message: "farewatch fare prediction API".to_string(),
        model: state.server.state(),
    })
}

async fn predict<T: WebhookTransport + 'static>(
    State(state): State<AppState<T>>,
    Json(features): Json<FareFeatures>,
) -> Result<Json<Prediction>, ApiError> {
    Ok(Json(state.server.predict(&features)?))
}

async fn reset_model<T: WebhookTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Response, ApiError> {
    operator_dispatch(state, OperatorAction::ResetModel).await
}

async fn simulate_drift<T: WebhookTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Response, ApiError> {
    operator_dispatch(state, OperatorAction::SimulateDrift).await
}

/// Dispatch on a blocking thread; the webhook call must not stall the runtime.
async fn operator_dispatch<T: WebhookTransport + 'static>(
    state: AppState<T>,
    action: OperatorAction,
) -> Result<Response, ApiError> {
    info!(?action, "operator requested retraining");
    let outcome = DecisionOutcome::from_operator(action);
    let dispatcher = Arc::clone(&state.dispatcher);

    let result = tokio::task::spawn_blocking(move || dispatcher.dispatch_with_retry(&outcome))
        .await
        .map_err(|e| {
            error!(error = %e, "dispatch task failed");
            Error::Other(format!("dispatch task failed: {e}"))
        })??;

    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    let body = OperatorResponse {
        action,
        status: result.status,
        http_status: result.http_status,
        simulate_drift: outcome.inject_drift.to_string(),
        attempts: result.attempts,
    };
    Ok((status, Json(body)).into_response())
}
