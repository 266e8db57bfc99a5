//! Artifact file polling
//!
//! The trainer replaces the artifact file atomically; the watcher notices a
//! changed file (modification time or size) and hands the new artifact to
//! [`ModelServer::reload`]. A rejected or unreadable artifact is logged and
//! the active model is left alone.
//!
//! File reads and JSON decoding are blocking, so the async paths
//! ([`ArtifactWatcher::poll`], [`ArtifactWatcher::run`]) hand each check to
//! tokio's blocking pool.

use super::ModelServer;
use crate::artifact::ModelArtifact;
use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Identity of an artifact file on disk
type Fingerprint = (Option<SystemTime>, u64);

/// Polls an artifact path and reloads the server on change.
///
/// Clones share the last-seen fingerprint, so a clone handed to a blocking
/// task updates the original.
#[derive(Debug, Clone)]
pub struct ArtifactWatcher {
    path: PathBuf,
    server: Arc<ModelServer>,
    last_seen: Arc<Mutex<Option<Fingerprint>>>,
}

impl ArtifactWatcher {
    /// Watch `path` on behalf of `server`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, server: Arc<ModelServer>) -> Self {
        Self {
            path: path.into(),
            server,
            last_seen: Arc::default(),
        }
    }

    /// Watched path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file once, blocking the calling thread.
    ///
    /// Returns `Ok(true)` if a new artifact was activated. A missing file is
    /// not an error. Concurrent calls are serialized.
    ///
    /// # Errors
    ///
    /// Returns the load or reload error. The file is not retried until it
    /// changes again.
    pub fn poll_once(&self) -> Result<bool> {
        let mut last_seen = self
            .last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no model artifact yet");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let fingerprint = (metadata.modified().ok(), metadata.len());
        if *last_seen == Some(fingerprint) {
            return Ok(false);
        }
        *last_seen = Some(fingerprint);

        let artifact = ModelArtifact::load(&self.path)?;
        if self.server.active_version().as_deref() == Some(artifact.version()) {
            debug!(version = artifact.version(), "artifact unchanged");
            return Ok(false);
        }
        self.server.reload(&artifact)?;
        Ok(true)
    }

    /// [`poll_once`](Self::poll_once) on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Same as `poll_once`, plus `Error::Other` if the blocking task panicked.
    pub async fn poll(&self) -> Result<bool> {
        let watcher = self.clone();
        tokio::task::spawn_blocking(move || watcher.poll_once())
            .await
            .map_err(|e| Error::Other(format!("artifact poll task failed: {e}")))?
    }

    /// Poll forever at `interval`. The first check happens immediately.
    pub async fn run(self, interval: Duration) {
        info!(
            path = %self.path.display(),
            interval_secs = interval.as_secs_f64(),
            "watching model artifact"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll().await {
                warn!(path = %self.path.display(), error = %e, "artifact reload failed");
            }
        }
    }
}
