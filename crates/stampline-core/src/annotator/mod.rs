//! Annotator adapter: uniform interface over external annotation backends.
//!
//! The walker only sees [`Annotator::annotate`], which returns the raw text
//! on success or a classified [`Failure`] value. Backends never write to the
//! ledger and never let an error escape as a panic.

pub mod command;

use std::io;
use std::path::{Path, PathBuf};

use crate::ledger::Ledger;

pub use command::CommandAnnotator;

/// Failure classes an annotator can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, 5xx, connection reset: worth another attempt
    TransientServiceError,
    /// Input cannot be annotated (unreadable image, rejected request)
    MalformedInput,
    /// Rate limit or quota hit: retry after a longer pause
    QuotaExceeded,
    /// Source bytes or remote resource missing
    NotFound,
    /// Credentials rejected; no row can succeed until configuration changes
    Unauthorized,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientServiceError => "transient-service-error",
            Self::MalformedInput => "malformed-input",
            Self::QuotaExceeded => "quota-exceeded",
            Self::NotFound => "not-found",
            Self::Unauthorized => "unauthorized",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "transient-service-error" => Some(Self::TransientServiceError),
            "malformed-input" => Some(Self::MalformedInput),
            "quota-exceeded" => Some(Self::QuotaExceeded),
            "not-found" => Some(Self::NotFound),
            "unauthorized" => Some(Self::Unauthorized),
            _ => None,
        }
    }

    /// Retryability assumed when a backend does not say otherwise
    pub fn default_retryable(self) -> bool {
        matches!(self, Self::TransientServiceError | Self::QuotaExceeded)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified annotation failure, returned as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub retryable: bool,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.default_retryable(),
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientServiceError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedInput, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(FailureKind::QuotaExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unauthorized, message)
    }

    /// Override the kind's default retryability
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Classify an error from reading the source bytes of an item
    pub fn from_io(e: &io::Error, path: &Path) -> Self {
        let msg = format!("{}: {e}", path.display());
        match e.kind() {
            io::ErrorKind::NotFound => Self::not_found(msg),
            io::ErrorKind::InvalidData
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::PermissionDenied => Self::malformed(msg),
            _ => Self::transient(msg),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Outcome of one annotation call
pub type AnnotationResult = Result<String, Failure>;

/// The row being annotated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub index: usize,
    pub identity: String,
}

/// Per-call context: which byte stream to annotate.
///
/// Usually the original image; a pre-processed variant when the run names a
/// source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub source: PathBuf,
}

/// One external annotation capability
pub trait Annotator {
    /// Short backend label used in logs and the run journal
    fn name(&self) -> &str;

    /// Annotate one item. Every failure is returned, never raised.
    fn annotate(&mut self, item: &Item, ctx: &Context) -> AnnotationResult;
}

/// Builds the [`Context`] for a row from the data root and an optional source column.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
    source_column: Option<String>,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>, source_column: Option<String>) -> Self {
        Self {
            root: root.into(),
            source_column,
        }
    }

    /// Source path for row `index`: the source column value if set and
    /// non-empty, else the identity, joined onto the data root.
    pub fn resolve(&self, ledger: &Ledger, index: usize) -> Context {
        let identity = ledger.identity(index).unwrap_or_default();
        let rel = self
            .source_column
            .as_deref()
            .and_then(|col| ledger.get(index, col))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(identity);
        Context {
            source: self.root.join(rel),
        }
    }
}

/// Read the source bytes of an item, classifying I/O failures
pub fn read_source(ctx: &Context) -> Result<Vec<u8>, Failure> {
    let bytes = std::fs::read(&ctx.source).map_err(|e| Failure::from_io(&e, &ctx.source))?;
    if bytes.is_empty() {
        return Err(Failure::malformed(format!(
            "{}: empty file",
            ctx.source.display()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_retryability_by_kind() {
        assert!(Failure::transient("x").is_retryable());
        assert!(Failure::quota("x").is_retryable());
        assert!(!Failure::malformed("x").is_retryable());
        assert!(!Failure::not_found("x").is_retryable());
        assert!(!Failure::unauthorized("x").is_retryable());
    }

    #[test]
    fn retryability_can_be_overridden() {
        let f = Failure::transient("gateway gave up").with_retryable(false);
        assert_eq!(f.kind, FailureKind::TransientServiceError);
        assert!(!f.is_retryable());
    }

    #[test]
    fn kind_name_roundtrip() {
        for kind in [
            FailureKind::TransientServiceError,
            FailureKind::MalformedInput,
            FailureKind::QuotaExceeded,
            FailureKind::NotFound,
            FailureKind::Unauthorized,
        ] {
            assert_eq!(FailureKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(FailureKind::from_name("nope"), None);
    }

    #[test]
    fn io_errors_classified() {
        let p = Path::new("a.jpg");
        let nf = Failure::from_io(&io::Error::new(io::ErrorKind::NotFound, "x"), p);
        assert_eq!(nf.kind, FailureKind::NotFound);
        let bad = Failure::from_io(&io::Error::new(io::ErrorKind::InvalidData, "x"), p);
        assert_eq!(bad.kind, FailureKind::MalformedInput);
        let reset = Failure::from_io(&io::Error::new(io::ErrorKind::ConnectionReset, "x"), p);
        assert!(reset.is_retryable());
    }

    #[test]
    fn display_includes_kind() {
        let f = Failure::quota("429 from backend");
        assert_eq!(format!("{f}"), "quota-exceeded: 429 from backend");
    }

    #[test]
    fn resolver_prefers_source_column() {
        let mut ledger = Ledger::new("path");
        ledger.ensure_column("processed").unwrap();
        ledger.push_row("stamps/a.jpg").unwrap();
        ledger.push_row("stamps/b.jpg").unwrap();
        ledger.set(0, "processed", "bw-stamps/a.jpg").unwrap();

        let resolver = SourceResolver::new("/data", Some("processed".into()));
        assert_eq!(
            resolver.resolve(&ledger, 0).source,
            PathBuf::from("/data/bw-stamps/a.jpg")
        );
        // empty source cell falls back to the identity
        assert_eq!(
            resolver.resolve(&ledger, 1).source,
            PathBuf::from("/data/stamps/b.jpg")
        );

        let plain = SourceResolver::new("/data", None);
        assert_eq!(
            plain.resolve(&ledger, 0).source,
            PathBuf::from("/data/stamps/a.jpg")
        );
    }

    #[test]
    fn read_source_classifies_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        let missing = Context {
            source: dir.path().join("gone.jpg"),
        };
        assert_eq!(
            read_source(&missing).unwrap_err().kind,
            FailureKind::NotFound
        );

        let empty = dir.path().join("empty.jpg");
        std::fs::write(&empty, b"").unwrap();
        let err = read_source(&Context { source: empty }).unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedInput);
    }
}
