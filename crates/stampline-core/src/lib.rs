//! Stampline Core - resumable annotation of image ledgers
//!
//! A ledger is a CSV file with one row per image. The walker visits rows
//! whose target column is still empty, asks an [`Annotator`] backend for
//! text, and checkpoints the ledger after every row so a run can be
//! stopped and resumed at any point.

pub mod annotator;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod http;
pub mod journal;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod pacer;
pub mod progress;
pub mod shutdown;
pub mod walker;

// Re-exports for convenience
pub use annotator::{
    AnnotationResult, Annotator, CommandAnnotator, Context, Failure, FailureKind, Item,
    SourceResolver, read_source,
};
pub use checkpoint::{Checkpoint, FileCheckpoint};
pub use config::{FAILED_PREFIX, RunConfig, STATUS_SUFFIX};
pub use error::{ConfigError, LedgerError};
pub use http::{HttpError, SHARED_RUNTIME, http_client, post_json};
pub use journal::{RunRecord, journal_path};
pub use ledger::{ColumnStats, DEFAULT_IDENTITY_COLUMN, Ledger};
pub use lock::RunLock;
pub use logging::{BarLogger, init_logging};
pub use pacer::{BackoffPolicy, Pacer};
pub use progress::{ProgressContext, fmt_num};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
pub use walker::{HaltCause, RunSummary, StopReason, WalkError, Walker};
