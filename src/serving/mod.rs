//! Model server with atomic hot-swap
//!
//! One [`ModelServer`] owns the only active-model handle in the process.
//! Requests never touch a global; they go through [`ModelServer::predict`]
//! and [`ModelServer::reload`].
//!
//! ## Concurrency
//!
//! - `predict` takes the read lock only long enough to clone an `Arc`
//!   snapshot, then runs inference unlocked. A request started before a
//!   swap finishes on the model it started with.
//! - `reload` validates and decodes the artifact **before** taking the write
//!   lock, then swaps the pointer. Reloads are serialized by a separate
//!   mutex (last writer wins).
//! - Readers observe either the old or the new model, never a mix.
//!
//! ## States
//!
//! ```text
//! Unloaded --reload(ok)--> Loaded --reload(ok)--> Loaded
//!     |                       |
//!     +--reload(err)--> (unchanged)
//! ```

mod http;
mod watcher;

pub use http::{router, ApiError, AppState, OperatorResponse};
pub use watcher::ArtifactWatcher;

use crate::artifact::{ModelArtifact, DEFAULT_ARTIFACT_PATH};
use crate::schema::{FareFeatures, FeatureSchema};
use crate::training::LinearModel;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Default artifact poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Server process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Artifact file to load and watch
    pub artifact_path: PathBuf,
    /// How often the artifact file is checked for changes
    pub poll_interval: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of one inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted fare amount
    pub predicted_fare: f64,
    /// Version of the artifact that produced it
    pub model_version: String,
}

/// Externally visible server state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServerState {
    /// No artifact has been loaded yet
    Unloaded,
    /// An artifact is active
    Loaded {
        /// Active artifact version
        version: String,
        /// When the active artifact was trained
        trained_at: DateTime<Utc>,
    },
}

/// Decoded, validated artifact
#[derive(Debug)]
struct ActiveModel {
    version: String,
    trained_at: DateTime<Utc>,
    model: LinearModel,
}

/// Owns the active model handle
#[derive(Debug)]
pub struct ModelServer {
    expected: FeatureSchema,
    active: RwLock<Option<Arc<ActiveModel>>>,
    reload_lock: Mutex<()>,
}

impl ModelServer {
    /// An unloaded server expecting `expected` features.
    #[must_use]
    pub fn new(expected: FeatureSchema) -> Self {
        Self {
            expected,
            active: RwLock::new(None),
            reload_lock: Mutex::new(()),
        }
    }

    /// The schema artifacts must match
    #[must_use]
    pub const fn expected_schema(&self) -> &FeatureSchema {
        &self.expected
    }

    fn snapshot(&self) -> Option<Arc<ActiveModel>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Predict a fare with the currently active model.
    ///
    /// # Errors
    ///
    /// - `Error::ServiceUnavailable` if no model has ever been loaded
    /// - `Error::InferenceError` for out-of-range input or a failed computation
    pub fn predict(&self, features: &FareFeatures) -> Result<Prediction> {
        let active = self.snapshot().ok_or_else(|| {
            Error::ServiceUnavailable("model not loaded".to_string())
        })?;
        features.validate()?;
        let predicted_fare = active.model.predict(&features.to_vector())?;
        Ok(Prediction {
            predicted_fare,
            model_version: active.version.clone(),
        })
    }

    /// Validate `artifact` and make it the active model.
    ///
    /// On any error the previously active model (if any) stays active.
    ///
    /// # Errors
    ///
    /// - `Error::SchemaMismatch` if the artifact's feature list differs from
    ///   the expected schema
    /// - `Error::CorruptArtifact` if the model blob cannot be decoded or does
    ///   not fit the schema width
    pub fn reload(&self, artifact: &ModelArtifact) -> Result<()> {
        let _serial = self
            .reload_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !self.expected.matches(artifact.features()) {
            warn!(
                version = artifact.version(),
                expected = ?self.expected.names(),
                actual = ?artifact.features(),
                "rejected artifact with mismatched feature schema"
            );
            return Err(Error::SchemaMismatch {
                expected: self.expected.names().to_vec(),
                actual: artifact.features().to_vec(),
            });
        }

        let model: LinearModel = artifact.decode_model()?;
        if model.coefficients.len() != self.expected.len() {
            return Err(Error::CorruptArtifact(format!(
                "artifact {} has {} coefficients for {} features",
                artifact.version(),
                model.coefficients.len(),
                self.expected.len()
            )));
        }

        let next = Arc::new(ActiveModel {
            version: artifact.version().to_string(),
            trained_at: artifact.trained_at(),
            model,
        });
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);

        info!(
            version = artifact.version(),
            previous = previous.as_ref().map(|p| p.version.as_str()),
            "activated model artifact"
        );
        Ok(())
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.snapshot()
            .map_or(ServerState::Unloaded, |active| ServerState::Loaded {
                version: active.version.clone(),
                trained_at: active.trained_at,
            })
    }

    /// Version of the active model, if any
    #[must_use]
    pub fn active_version(&self) -> Option<String> {
        self.snapshot().map(|active| active.version.clone())
    }
}

impl Default for ModelServer {
    fn default() -> Self {
        Self::new(FeatureSchema::fare())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FEATURE_NAMES;

    fn artifact(version: &str, intercept: f64) -> ModelArtifact {
        let model = LinearModel {
            intercept,
            coefficients: vec![2.0, 0.0, 0.0, 0.0, 0.0],
        };
        ModelArtifact::from_model(&model, FEATURE_NAMES)
            .unwrap()
            .with_version(version)
    }

    fn ride(distance: f64) -> FareFeatures {
        FareFeatures {
            trip_distance: distance,
            pickup_zone: 132,
            dropoff_zone: 230,
            hour: 17,
            day_of_week: 4,
        }
    }

    #[test]
    fn test_predict_before_load_is_unavailable() {
        let server = ModelServer::default();
        assert_eq!(server.state(), ServerState::Unloaded);
        let err = server.predict(&ride(1.0)).unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[test]
    fn test_reload_then_predict() {
        let server = ModelServer::default();
        server.reload(&artifact("v1", 3.0)).unwrap();

        let prediction = server.predict(&ride(2.0)).unwrap();
        assert!((prediction.predicted_fare - 7.0).abs() < 1e-12);
        assert_eq!(prediction.model_version, "v1");
        assert!(matches!(server.state(), ServerState::Loaded { ref version, .. } if version == "v1"));
    }

    #[test]
    fn test_schema_mismatch_keeps_previous_model() {
        let server = ModelServer::default();
        server.reload(&artifact("v1", 3.0)).unwrap();

        let reordered = ModelArtifact::new(
            artifact("v2", 0.0).blob().to_vec(),
            ["PULocationID", "trip_distance", "DOLocationID", "hour", "day_of_week"],
        )
        .with_version("v2");
        let err = server.reload(&reordered).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
        assert_eq!(server.active_version().as_deref(), Some("v1"));
    }

    #[test]
    fn test_schema_mismatch_on_unloaded_server_stays_unloaded() {
        let server = ModelServer::default();
        let err = server
            .reload(&ModelArtifact::new(vec![], ["trip_distance"]))
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
        assert_eq!(server.state(), ServerState::Unloaded);
    }

    #[test]
    fn test_corrupt_blob_rejected() {
        let server = ModelServer::default();
        server.reload(&artifact("v1", 3.0)).unwrap();

        let corrupt = ModelArtifact::new(b"garbage".to_vec(), FEATURE_NAMES).with_version("v2");
        assert!(matches!(server.reload(&corrupt), Err(Error::CorruptArtifact(_))));

        let narrow = LinearModel {
            intercept: 0.0,
            coefficients: vec![1.0],
        };
        let narrow = ModelArtifact::from_model(&narrow, FEATURE_NAMES).unwrap();
        assert!(matches!(server.reload(&narrow), Err(Error::CorruptArtifact(_))));
        assert_eq!(server.active_version().as_deref(), Some("v1"));
    }

    #[test]
    fn test_invalid_input_is_inference_error() {
        let server = ModelServer::default();
        server.reload(&artifact("v1", 3.0)).unwrap();

        let mut bad = ride(1.0);
        bad.hour = 24;
        assert!(matches!(server.predict(&bad), Err(Error::InferenceError(_))));
        assert!(matches!(server.predict(&ride(-1.0)), Err(Error::InferenceError(_))));
        assert!(matches!(server.predict(&ride(f64::NAN)), Err(Error::InferenceError(_))));
    }

    #[test]
    fn test_overflowing_prediction_is_inference_error() {
        let server = ModelServer::default();
        server.reload(&artifact("v1", 0.0)).unwrap();
        let err = server.predict(&ride(f64::MAX)).unwrap_err();
        assert!(matches!(err, Error::InferenceError(_)));
    }

    #[test]
    fn test_last_reload_wins() {
        let server = ModelServer::default();
        for (i, version) in ["v1", "v2", "v3"].iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let intercept = i as f64;
            server.reload(&artifact(version, intercept)).unwrap();
        }
        assert_eq!(server.active_version().as_deref(), Some("v3"));
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = ServeConfig::default();
        assert_eq!(config.bind.port(), 8000);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.artifact_path, PathBuf::from("model.json"));
    }
}
