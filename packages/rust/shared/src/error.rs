//! Error types for sheetsync.
//!
//! Library crates use [`SheetSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Source-scoped variants (`SourceFetch`, `SourceFormat`) abort one sheet.
//! Row-scoped variants (`RowInvalid`, `StoreWrite`, `ImageAttach`) are
//! caught by the sync loop and counted, never propagated past it.

use std::path::PathBuf;

/// Top-level error type for all sheetsync operations.
#[derive(Debug, thiserror::Error)]
pub enum SheetSyncError {
    /// Network failure, timeout, or empty body while fetching a source.
    #[error("source fetch error: {0}")]
    SourceFetch(String),

    /// The fetched payload is not usable (too few rows, missing columns, bad CSV).
    #[error("source format error: {message}")]
    SourceFormat { message: String },

    /// A single row cannot be turned into a record.
    #[error("invalid row: {message}")]
    RowInvalid { message: String },

    /// The content store rejected a create or update.
    #[error("store write error: {0}")]
    StoreWrite(String),

    /// Downloading or attaching a featured image failed.
    #[error("image attach error: {0}")]
    ImageAttach(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error (reads, migrations, locks).
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, unknown sheet, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SheetSyncError>;

impl SheetSyncError {
    /// Create a source format error from any displayable message.
    pub fn source_format(msg: impl Into<String>) -> Self {
        Self::SourceFormat {
            message: msg.into(),
        }
    }

    /// Create a row-invalid error from any displayable message.
    pub fn row_invalid(msg: impl Into<String>) -> Self {
        Self::RowInvalid {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a whole sheet rather than a single row.
    pub fn is_source_level(&self) -> bool {
        matches!(self, Self::SourceFetch(_) | Self::SourceFormat { .. })
    }
}
