//! Error taxonomy shared across the store, index, and import pipeline.
//!
//! Every failure that crosses a component boundary is classified into one of
//! these variants; the CLI maps each to a diagnostic line and a non-zero exit
//! code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A cite key, attachment label, or file was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A content hash or cite key collision aborted the operation.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Store or index I/O failure, or corrupted persisted state.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed full-text query.
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    /// A source document could not be read (e.g. a broken PDF).
    #[error("parse error: {0}")]
    Parse(String),

    /// The user cancelled an interactive step. Not a failure of the system;
    /// callers must not commit partial state.
    #[error("cancelled by user")]
    Cancelled,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
