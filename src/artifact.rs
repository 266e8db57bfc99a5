//! Model artifact - versioned trained model plus its feature schema
//!
//! The artifact is the only thing the trainer and the server share. It is a
//! JSON document holding an opaque model blob, the ordered feature list the
//! model expects, and training metadata:
//!
//! ```json
//! {
//!   "version": "v20240105T101500.042Z",
//!   "blob": [123, 34, ...],
//!   "features": ["trip_distance", "PULocationID", "DOLocationID", "hour", "day_of_week"],
//!   "trained_at": "2024-01-05T10:15:00Z",
//!   "metrics": {"holdout_mae": 2.41}
//! }
//! ```
//!
//! Writes are crash-safe (temp file, fsync, rename, fsync directory), so a
//! polling reader sees either the previous file or the new one, never a
//! partial write.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Conventional artifact file name
pub const DEFAULT_ARTIFACT_PATH: &str = "model.json";

/// Versioned, serialized trained model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    version: String,
    blob: Vec<u8>,
    features: Vec<String>,
    trained_at: DateTime<Utc>,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
}

impl ModelArtifact {
    /// Create an artifact stamped with the current time.
    ///
    /// The version is derived from the timestamp (`vYYYYMMDDTHHMMSS.mmmZ`).
    #[must_use]
    pub fn new<I, S>(blob: Vec<u8>, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trained_at = Utc::now();
        Self {
            version: trained_at.format("v%Y%m%dT%H%M%S%.3fZ").to_string(),
            blob,
            features: features.into_iter().map(Into::into).collect(),
            trained_at,
            metrics: BTreeMap::new(),
        }
    }

    /// Serialize `model` into the blob.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the model cannot be serialized.
    pub fn from_model<M, I, S>(model: &M, features: I) -> Result<Self>
    where
        M: Serialize,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(serde_json::to_vec(model)?, features))
    }

    /// Override the version label
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Record a training metric
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Version label
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Opaque model bytes
    #[must_use]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Ordered feature names the model expects
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Training timestamp
    #[must_use]
    pub const fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Training metrics
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Decode the blob into a concrete model type.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorruptArtifact` if the blob does not decode as `M`.
    pub fn decode_model<M: DeserializeOwned>(&self) -> Result<M> {
        serde_json::from_slice(&self.blob).map_err(|e| {
            Error::CorruptArtifact(format!("artifact {} has an unreadable model: {e}", self.version))
        })
    }

    /// Read an artifact file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and
    /// `Error::CorruptArtifact` if it is not a valid artifact document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::CorruptArtifact(format!("{} is not a model artifact: {e}", path.display()))
        })
    }

    /// Crash-safe write: temp file, fsync, rename over `path`, fsync directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` for filesystem failures.
    pub fn write_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let bytes = serde_json::to_vec_pretty(self)?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0_u128, |d| d.as_nanos());
        let pid = std::process::id();
        let tmp_path = parent.join(format!(".artifact.tmp.{pid}.{nanos}"));

        let mut temp = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        if let Err(e) = temp.write_all(&bytes).and_then(|()| temp.sync_all()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        drop(temp);
        fs::rename(&tmp_path, path)?;
        File::open(parent)?.sync_all()?;

        info!(
            path = %path.display(),
            version = %self.version,
            size_bytes = bytes.len(),
            "wrote model artifact atomically"
        );
        Ok(())
    }
}
