//! Error types for knnc-classifier
//!
//! Configuration problems are reported before any pipeline work starts.
//! Access failures during a run stop the run and are returned together with
//! the records committed before the failure (see [`RunFailure`]).

use crate::classification::ClassificationList;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the classification engine
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or inconsistent run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Feature name not present in the feature registry
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// Measure name not recognised
    #[error("Unknown measure type: {0} (expected classCount, weightedByRank, weightedByDistance or weightedByAverageDistance)")]
    UnknownMeasure(String),

    /// A reference or input collection could not be opened
    #[error("Cannot open collection {path}: {reason}")]
    CollectionOpen { path: PathBuf, reason: String },

    /// A document could not be read from an opened collection
    #[error("Document error: {0}")]
    Document(String),

    /// The frame stream failed while decoding
    #[error("Stream error: {0}")]
    Stream(String),

    /// The search provider failed for a query
    #[error("Search error ({feature}): {reason}")]
    Search { feature: String, reason: String },

    /// A query document carries no descriptor for the requested feature
    #[error("Document {identifier} has no {feature} descriptor")]
    MissingDescriptor { identifier: String, feature: String },

    /// The run was stopped before all items were classified
    #[error("Classification run cancelled")]
    Cancelled,

    /// A worker thread panicked
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    /// Workers did not finish within the completion timeout and grace period
    #[error("Worker pool did not terminate: {0}")]
    PoolTimeout(String),

    /// Report export failure
    #[error("Export error: {0}")]
    Export(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors from the common crate (configuration loading)
    #[error("Common error: {0}")]
    Common(#[from] knnc_common::Error),
}

/// Convenience Result type using the classifier Error
pub type Result<T> = std::result::Result<T, Error>;

/// A run that stopped early
///
/// Carries the first error observed and every record that had already been
/// committed when the run stopped.
#[derive(Error, Debug)]
#[error("classification stopped after {} records: {error}", .partial.len())]
pub struct RunFailure {
    /// First error observed by any worker, the producer or the coordinator
    #[source]
    pub error: Error,

    /// Records committed before the failure
    pub partial: ClassificationList,
}

/// Result of a full pipeline run
pub type RunResult = std::result::Result<ClassificationList, RunFailure>;
