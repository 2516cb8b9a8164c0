//! # knnc Common Library
//!
//! Shared code for the knnc crates:
//! - Error types
//! - TOML configuration loading and resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
