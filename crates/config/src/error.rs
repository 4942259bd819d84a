//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested config file doesn't exist.
    #[display("config file not found: {}", _0.display())]
    Missing(#[error(not(source))] PathBuf),
    /// The config file extension isn't one of `toml`, `yaml`, `yml` or `json`.
    #[display("unsupported config format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// A provider failed to read, or the merged values didn't fit the model.
    #[display("could not load configuration")]
    Load,
    /// Values loaded fine but are not usable.
    #[display("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}
