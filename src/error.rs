//! Virtual Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Storage failures are never returned
//! as-is: they are raised as a child of one of the kinds below (see
//! [`from_store`]) so callers only ever match on virtual paths.

use blobfs_storage::error::{Error as StoreError, ErrorKind as StoreErrorKind};
use derive_more::{Display, Error};

/// A virtual store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for virtual store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, in terms of virtual paths.
///
/// ### Caller Errors
/// - [`ErrorKind::NotFound`]
/// - [`ErrorKind::InvalidPath`]
/// - [`ErrorKind::InvalidMove`]
///
/// ### Contention
/// - [`ErrorKind::LeaseConflict`]
/// - [`ErrorKind::CopyFailed`]
///
/// ### Store Errors
/// - [`ErrorKind::StoreUnavailable`]
/// - [`ErrorKind::Timeout`]
/// - [`ErrorKind::Store`]
///
/// - [`ErrorKind::Io`] - the caller's sink, not the store, failed.
///
/// ### Multi-object Operations
/// - [`ErrorKind::PartialFailure`] - some objects were processed before the
///   failure; re-list to find out which.
/// - [`ErrorKind::Cancelled`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing is stored at this path.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The path can only name a directory (it ends in `/`, or is the root)
    /// but a file was required.
    #[display("not a file path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// The object is leased by a concurrent operation.
    #[display("already leased: {_0}")]
    LeaseConflict(#[error(not(source))] String),
    /// The store refused a server-side copy.
    #[display("could not copy {from} to {to}")]
    CopyFailed { from: String, to: String },
    /// The destination directory lies inside the source directory.
    #[display("cannot move {from} into itself ({to})")]
    InvalidMove { from: String, to: String },
    /// The store could not be reached.
    #[display("store unavailable while accessing {_0}")]
    StoreUnavailable(#[error(not(source))] String),
    /// The store (or a configured copy timeout) did not answer in time.
    #[display("timed out while accessing {_0}")]
    Timeout(#[error(not(source))] String),
    /// A recursive operation stopped after processing some of its objects.
    #[display("{path}: stopped after {completed} of {total} objects")]
    PartialFailure { path: String, completed: usize, total: usize },
    /// Writing file contents to the caller's sink failed.
    #[display("I/O error while reading {_0}")]
    Io(#[error(not(source))] String),
    /// The store's cancellation token was triggered.
    #[display("operation cancelled")]
    Cancelled,
    /// Any other store failure.
    #[display("store error while accessing {_0}")]
    Store(#[error(not(source))] String),
    /// The configuration could not be turned into a store.
    #[display("invalid configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LeaseConflict(_) | Self::StoreUnavailable(_) | Self::Timeout(_))
    }
}

/// Translate a storage error into the virtual store's taxonomy, keeping the
/// original error as the child.
///
/// ```ignore
/// store.get(&key).await.map_err(from_store(&key))?;
/// ```
pub(crate) fn from_store(path: &str) -> impl FnOnce(StoreError) -> Error + '_ {
    move |err| {
        let kind = match &*err {
            StoreErrorKind::NotFound(_) => ErrorKind::NotFound(path.to_string()),
            StoreErrorKind::LeaseConflict(_) => ErrorKind::LeaseConflict(path.to_string()),
            StoreErrorKind::Timeout(_) => ErrorKind::Timeout(path.to_string()),
            kind if kind.is_unavailable() => ErrorKind::StoreUnavailable(path.to_string()),
            _ => ErrorKind::Store(path.to_string()),
        };
        err.raise(kind)
    }
}

/// Like [`from_store()`], except that a missing source or a refusal from
/// the store is reported as [`ErrorKind::CopyFailed`].
pub(crate) fn copy_failed<'a>(from: &'a str, to: &'a str) -> impl FnOnce(StoreError) -> Error + 'a {
    move |err| {
        let refused = matches!(&*err, StoreErrorKind::NotFound(_) | StoreErrorKind::LeaseConflict(_));
        if refused {
            err.raise(ErrorKind::CopyFailed { from: from.to_string(), to: to.to_string() })
        } else {
            from_store(from)(err)
        }
    }
}

/// Wrap the failure of one object in a recursive operation: once some
/// objects have been processed it becomes a [`ErrorKind::PartialFailure`].
pub(crate) fn partial(err: Error, path: &str, completed: usize, total: usize) -> Error {
    if completed == 0 {
        return err;
    }
    err.raise(ErrorKind::PartialFailure { path: path.to_string(), completed, total })
}
