//! # knnc Classifier Library (knnc-classifier)
//!
//! Binary image classification by k-nearest-neighbour voting against labeled
//! reference collections, one vote per descriptor feature, fused into a
//! composite label and evaluated with confusion-matrix statistics.
//!
//! **Architecture:** per item and feature, every reference collection is
//! searched, the best matches are kept in a bounded [`top_k::TopK`], drained
//! worst to best into the [`voting`] engine, and the per-feature votes are
//! combined by [`fusion`]. The [`pipeline`] runs this on a thread pool over a
//! static dataset or a frame stream.

pub mod classification;
pub mod document;
pub mod error;
pub mod export;
pub mod frames;
pub mod fusion;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod reference;
pub mod registry;
pub mod search;
pub mod settings;
pub mod top_k;
pub mod types;
pub mod voting;

pub use classification::{ClassificationList, ClassificationRecord};
pub use error::{Error, Result, RunFailure, RunResult};
pub use pipeline::{ClassificationEngine, EngineConfig, RunControl};
pub use types::{Label, MeasureType};
