//! Run-level error types for ledger storage and configuration

use std::path::PathBuf;

/// Error from loading, mutating, or persisting a [`Ledger`](crate::Ledger).
///
/// Every variant is run-fatal when it surfaces from the walker: the ledger
/// is the only durable record of progress, so a failure to read or write it
/// stops the run rather than risking silent data loss.
#[derive(Debug)]
pub enum LedgerError {
    /// Backing file does not exist
    NotFound(PathBuf),
    /// Header or rows violate the ledger shape (identity column, uniqueness)
    Malformed(String),
    /// Column is not present in the ledger
    UnknownColumn(String),
    /// Column name cannot be used for annotations (empty or the identity column)
    InvalidColumn(String),
    /// Row index past the end of the ledger
    RowOutOfRange { index: usize, len: usize },
    /// Identity already present
    DuplicateIdentity(String),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "ledger not found: {}", path.display()),
            Self::Malformed(reason) => write!(f, "malformed ledger: {reason}"),
            Self::UnknownColumn(name) => write!(f, "unknown column: {name:?}"),
            Self::InvalidColumn(name) => write!(f, "invalid annotation column: {name:?}"),
            Self::RowOutOfRange { index, len } => {
                write!(f, "row {index} out of range (ledger has {len} rows)")
            }
            Self::DuplicateIdentity(id) => write!(f, "duplicate identity: {id}"),
            Self::Csv(e) => write!(f, "CSV: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Csv(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for LedgerError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Invalid run or backend configuration, surfaced before any row is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A setting has a value the pipeline cannot run with
    Invalid { field: &'static str, reason: String },
    /// An annotator backend cannot be constructed (missing key, missing program)
    Backend(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid { field, reason } => write!(f, "invalid `{field}`: {reason}"),
            Self::Backend(msg) => write!(f, "annotator unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
