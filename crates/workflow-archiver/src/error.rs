//! Error types and result handling for workflow-archiver.
//!
//! This module defines the core error type [`Error`] used throughout the crate, as well as the [`Result`] alias for fallible operations.
//!
//! ## What
//!
//! - [`Error`] enumerates every failure the archiver can hit: database, configuration,
//!   version-service and transaction-protocol errors.
//! - [`Result<T>`] is a convenient alias for `Result<T, Error>`.
//! - [`Error::is_transient`] tells the transaction runner whether an attempt may be retried.
//!
//! ## How
//!
//! Most crate APIs return [`Result<T>`]. Match on [`Error`] when a caller needs to treat
//! a failure class differently, e.g. the version fallback on [`Error::VersionNotFound`].
//!
//! ### Example
//!
//! ```rust
//! use workflow_archiver::error::{Error, Result};
//!
//! fn lookup() -> Result<i32> {
//!     Err(Error::VersionNotFound {
//!         druid: "druid:ab123cd4567".to_string(),
//!         message: "Unable to find 'druid:ab123cd4567' in fedora".to_string(),
//!     })
//! }
//! assert!(matches!(lookup(), Err(Error::VersionNotFound { .. })));
//! ```
use thiserror::Error;

/// Result type for archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type for heterogeneous error sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for archiver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (SQLx errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport error talking to the version service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Required configuration field is missing
    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    /// Configuration field has an invalid value
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Database connection failed or was lost
    #[error("Database connection failed: {source}. Context: {context}")]
    ConnectionFailed { source: BoxError, context: String },

    /// SQL query failed
    #[error("Database query failed: {query}. Context: {context}. Source: {source}")]
    QueryFailed {
        source: BoxError,
        query: String,
        context: String,
    },

    /// Database transaction operation failed
    #[error("Database transaction failed: {source}. Context: {context}")]
    TransactionFailed { source: BoxError, context: String },

    /// The copy step matched no active rows
    #[error("Expected more than 0 rows to be copied for {unit}")]
    NoRowsCopied { unit: String },

    /// Steps of the unit were reopened after it was discovered
    #[error("{unit} has {pending} step(s) that are no longer completed or skipped")]
    UnitNotTerminal { unit: String, pending: i64 },

    /// The delete step removed a different number of rows than were copied
    #[error("Copied {copied} rows but deleted {deleted} for {unit}")]
    RowCountMismatch {
        unit: String,
        copied: u64,
        deleted: u64,
    },

    /// The version service does not know the object (recognized fallback signature)
    #[error("Object '{druid}' not found by version service: {message}")]
    VersionNotFound { druid: String, message: String },

    /// The version service failed in an unrecognized way
    #[error("Version lookup for '{druid}' failed: {message}")]
    VersionLookup { druid: String, message: String },

    /// The version service answered with something that is not a version number
    #[error("Version service returned an invalid version for '{druid}': {body:?}")]
    InvalidVersion { druid: String, body: String },

    /// Unexpected internal error occurred
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Whether a failed archive attempt with this error may be retried.
    ///
    /// Database, connection and protocol errors are treated as transient
    /// (lock contention, saturation, a unit changing under us). Configuration
    /// and internal errors will fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Error::MissingConfig { .. }
                | Error::InvalidConfig { .. }
                | Error::UnitNotTerminal { .. }
                | Error::Internal { .. }
        )
    }
}
