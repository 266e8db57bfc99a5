//! # farewatch: drift-triggered retraining for fare prediction
//!
//! **Version**: 0.1.0
//!
//! farewatch closes the loop around a taxi-fare regression model:
//!
//! ```text
//! reference.parquet ─┐
//!                    ├─> drift::detect ─> policy::decide ─> dispatch ──> CI training job
//! current.parquet  ──┘                                                        │
//!                                                                             v
//!        POST /predict <── serving::ModelServer <── ArtifactWatcher <── model.json
//! ```
//!
//! - [`drift`]: two-sample Kolmogorov–Smirnov test per monitored column
//! - [`policy`]: combines detected drift with operator overrides
//! - [`dispatch`]: one authenticated `repository_dispatch` webhook per decision
//! - [`training`]: trainer contract and a built-in least-squares trainer
//! - [`artifact`]: versioned model file, written atomically
//! - [`serving`]: model server with atomic hot-swap and an HTTP API
//! - [`monitor`]: one end-to-end monitor run
//!
//! ## Example
//!
//! ```rust
//! use farewatch::dataset::Dataset;
//! use farewatch::drift::DetectorConfig;
//! use farewatch::policy::decide;
//!
//! let distances = [1.5, 2.0, 3.5, 4.0, 5.5].repeat(20);
//! let reference = Dataset::from_columns("reference", [("trip_distance", distances.clone())])?;
//! let current = Dataset::from_columns(
//!     "current",
//!     [("trip_distance", distances.iter().map(|d| d * 10.0).collect())],
//! )?;
//!
//! let report = DetectorConfig::new(["trip_distance"]).detect(&reference, &current)?;
//! let outcome = decide(&report, None);
//! assert!(outcome.should_train);
//! assert!(!outcome.inject_drift);
//! # Ok::<(), farewatch::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod dataset;
pub mod dispatch;
pub mod drift;
pub mod error;
pub mod monitor;
pub mod policy;
pub mod schema;
pub mod serving;
pub mod training;

pub use error::{Error, Result};
