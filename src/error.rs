//! Error types for the posattr library.
//!
//! All failures are represented by [`PosattrError`]. The variants follow the
//! four classes of failure the store distinguishes: configuration problems
//! (missing dependency, unsupported component), I/O problems, data corruption
//! and exceeded resource limits. Corruption and limit errors are fatal for
//! command-line build tools.
//!
//! Besides the returned error, the most recent failure of a component
//! operation is remembered per thread and can be queried with
//! [`last_error`].
//!
//! # Examples
//!
//! ```
//! use posattr::error::{PosattrError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PosattrError::config("frequency table requires the lexicon index"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::cell::RefCell;
use std::io;
use std::path::Path;

use thiserror::Error;

/// The main error type for posattr operations.
#[derive(Error, Debug)]
pub enum PosattrError {
    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage errors carrying the offending path (open, map, create)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors (missing dependency, unsupported component kind)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data corruption detected while building or validating a component
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A fixed format or resource limit was exceeded
    #[error("Limit exceeded: {0}")]
    Limit(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Errors wrapped with context by the command-line layer
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PosattrError.
pub type Result<T> = std::result::Result<T, PosattrError>;

impl PosattrError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PosattrError::Storage(msg.into())
    }

    /// Create a storage error for an I/O failure on `path`.
    pub fn io_at(path: &Path, action: &str, err: io::Error) -> Self {
        PosattrError::Storage(format!("failed to {action} {}: {err}", path.display()))
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PosattrError::Config(msg.into())
    }

    /// Create a new data corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        PosattrError::Corruption(msg.into())
    }

    /// Create a new limit error.
    pub fn limit<S: Into<String>>(msg: S) -> Self {
        PosattrError::Limit(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PosattrError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PosattrError::Other(msg.into())
    }

    /// Whether continuing after this error would produce an incorrect corpus.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PosattrError::Corruption(_) | PosattrError::Limit(_))
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Return the message of the most recent recorded failure on this thread.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

/// Forget the recorded failure on this thread.
pub fn clear_last_error() {
    LAST_ERROR.with(|cell| cell.borrow_mut().take());
}

/// Record the error of `result`, if any, as this thread's last error.
pub(crate) fn remember<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        let msg = e.to_string();
        LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(msg));
    }
    result
}
