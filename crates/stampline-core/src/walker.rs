//! Resumable walker: annotate pending ledger rows one at a time.
//!
//! State machine:
//!
//! ```text
//! Selecting ──► Calling ──► Updating ──► Checkpointing ──► Selecting
//!    │            │  ▲                                        │
//!    │            └──┘ retryable failure, budget left         │
//!    └──► Done (no pending row / limit / stop flag)           └──► Done (quota stop)
//! ```
//!
//! A row is pending when its target cell is blank and, with failure tracking
//! on, its `<target>:status` cell is blank too. The ledger is persisted after
//! every row, so an interruption loses at most the in-flight call. The stop
//! flag is only read in `Selecting`; a cancelled run always ends on a
//! complete checkpoint.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::annotator::{Annotator, Failure, FailureKind, Item, SourceResolver};
use crate::checkpoint::Checkpoint;
use crate::config::{FAILED_PREFIX, RunConfig};
use crate::error::{ConfigError, LedgerError};
use crate::ledger::Ledger;
use crate::pacer::Pacer;
use crate::shutdown::shutdown_flag;

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// No pending row left in the window
    Completed,
    /// Per-run row limit reached
    LimitReached,
    /// Stop flag observed between rows
    Cancelled,
    /// Consecutive rows exhausted their budget on quota failures
    QuotaExhausted,
    /// Run-fatal error (see [`WalkError::Halted`])
    Halted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::LimitReached => "limit-reached",
            Self::Cancelled => "cancelled",
            Self::QuotaExhausted => "quota-exhausted",
            Self::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// End-of-run counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Rows that received an annotation
    pub succeeded: usize,
    /// Rows given up on (non-retryable failure or budget exhausted)
    pub skipped_failed: usize,
    /// Pending rows left in the window
    pub remaining: usize,
    /// Annotator calls made
    pub calls: usize,
    /// Smallest pending index in the window, where the next run starts
    pub resume_from: Option<usize>,
    pub stop: StopReason,
}

/// Cause of a halted run
#[derive(Debug)]
pub enum HaltCause {
    /// Checkpoint could not be written
    LedgerIo(LedgerError),
    /// Backend rejected the credentials
    Unauthorized(Failure),
}

impl std::fmt::Display for HaltCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LedgerIo(e) => write!(f, "checkpoint failed: {e}"),
            Self::Unauthorized(failure) => write!(f, "configuration rejected: {failure}"),
        }
    }
}

/// Run-level failure
#[derive(Debug)]
pub enum WalkError {
    /// Raised before any row is processed
    Config(ConfigError),
    /// Ledger could not be prepared (unknown source column, schema change)
    Ledger(LedgerError),
    /// Aborted mid-run; the last checkpoint on disk is intact
    Halted {
        row: usize,
        cause: HaltCause,
        summary: RunSummary,
    },
}

impl WalkError {
    /// Index the next invocation should resume from, if known
    pub fn resume_from(&self) -> Option<usize> {
        match self {
            Self::Halted { summary, .. } => summary.resume_from,
            _ => None,
        }
    }
}

impl std::fmt::Display for WalkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Ledger(e) => write!(f, "{e}"),
            Self::Halted {
                row,
                cause,
                summary,
            } => {
                write!(f, "run halted at row {row}: {cause}")?;
                if let Some(resume) = summary.resume_from {
                    write!(f, "; resume from index {resume}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for WalkError {}

impl From<ConfigError> for WalkError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// What happened to a row once its calls are over
enum RowOutcome {
    Annotated(String),
    /// Given up; marked failed when tracking is on
    Skipped(Failure),
    /// Left untouched so the next run picks it up again
    Deferred(Failure),
}

enum Phase {
    Selecting,
    Calling { row: usize, attempt: u32 },
    Updating { row: usize, outcome: RowOutcome },
    Checkpointing { row: usize, then: Option<StopReason> },
    Done(StopReason),
}

/// Single-worker annotation loop over one ledger.
pub struct Walker<'a> {
    ledger: &'a mut Ledger,
    annotator: &'a mut dyn Annotator,
    checkpoint: &'a mut dyn Checkpoint,
    config: &'a RunConfig,
    resolver: SourceResolver,
    status_column: Option<String>,
    pacer: Pacer,
    stop: &'a AtomicBool,
    pb: ProgressBar,
}

impl std::fmt::Debug for Walker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walker")
            .field("annotator", &self.annotator.name())
            .field("target", &self.config.target())
            .field("rows", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Walker<'a> {
    /// Validate the configuration and prepare the target columns.
    ///
    /// Source paths resolve against the current directory until
    /// [`with_root`](Self::with_root) sets the data root.
    pub fn new(
        ledger: &'a mut Ledger,
        annotator: &'a mut dyn Annotator,
        checkpoint: &'a mut dyn Checkpoint,
        config: &'a RunConfig,
    ) -> Result<Self, WalkError> {
        config.validate(ledger.identity_column())?;
        if let Some(source) = config.source_column.as_deref() {
            if !ledger.has_column(source) {
                return Err(WalkError::Ledger(LedgerError::UnknownColumn(
                    source.to_string(),
                )));
            }
        }
        Ok(Self {
            ledger,
            annotator,
            checkpoint,
            config,
            resolver: SourceResolver::new(".", config.source_column.clone()),
            status_column: config.status_column(),
            pacer: Pacer::new(config.policy()),
            stop: shutdown_flag(),
            pb: ProgressBar::hidden(),
        })
    }

    /// Directory identities (and source column values) are relative to
    pub fn with_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.resolver = SourceResolver::new(root, self.config.source_column.clone());
        self
    }

    /// Use a custom stop flag instead of the process-wide shutdown flag
    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// Replace the pacer's sleep function (tests)
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.pacer = self.pacer.with_sleeper(sleeper);
        self
    }

    fn window(&self) -> Range<usize> {
        self.ledger
            .clamp(self.config.start_index, self.config.end_index)
    }

    fn is_pending(&self, row: usize) -> bool {
        self.ledger.is_blank(row, self.config.target())
            && self
                .status_column
                .as_deref()
                .is_none_or(|status| self.ledger.is_blank(row, status))
    }

    fn next_pending(&self, from: usize, window: &Range<usize>) -> Option<usize> {
        (from.max(window.start)..window.end).find(|&row| self.is_pending(row))
    }

    fn count_pending(&self, window: &Range<usize>) -> usize {
        window.clone().filter(|&row| self.is_pending(row)).count()
    }

    /// Walk the window until done, cancelled, or halted.
    pub fn run(mut self) -> Result<RunSummary, WalkError> {
        let target = self.config.target().to_string();
        let status_column = self.status_column.clone();

        let mut added = self
            .ledger
            .ensure_column(&target)
            .map_err(WalkError::Ledger)?;
        if let Some(status) = &status_column {
            added |= self
                .ledger
                .ensure_column(status)
                .map_err(WalkError::Ledger)?;
        }

        let window = self.window();
        let max_attempts = self.pacer.policy().max_retries_per_row;
        let mut summary = RunSummary {
            succeeded: 0,
            skipped_failed: 0,
            remaining: 0,
            calls: 0,
            resume_from: None,
            stop: StopReason::Completed,
        };

        if added {
            if let Err(e) = self.checkpoint.persist(self.ledger) {
                return Err(self.halt(window.start, HaltCause::LedgerIo(e), summary, &window));
            }
        }

        let pending = self.count_pending(&window);
        let planned = self.config.limit.map_or(pending, |l| l.min(pending));
        self.pb.set_length(planned as u64);
        log::info!(
            "{}: {pending} pending rows in [{}, {}) for {target:?}",
            self.annotator.name(),
            window.start,
            window.end,
        );

        let total = self.ledger.len();
        let mut cursor = window.start;
        let mut attempted = 0usize;
        let mut quota_rows = 0u32;
        let mut phase = Phase::Selecting;

        let stop = loop {
            phase = match phase {
                Phase::Selecting => {
                    if self.stop.load(Ordering::Relaxed) {
                        log::warn!("Stop requested, ending run at row {cursor}");
                        Phase::Done(StopReason::Cancelled)
                    } else if self.config.limit.is_some_and(|l| attempted >= l) {
                        Phase::Done(StopReason::LimitReached)
                    } else {
                        match self.next_pending(cursor, &window) {
                            Some(row) => {
                                attempted += 1;
                                Phase::Calling { row, attempt: 1 }
                            }
                            None => Phase::Done(StopReason::Completed),
                        }
                    }
                }

                Phase::Calling { row, attempt } => {
                    let item = Item {
                        index: row,
                        identity: self.ledger.identity(row).unwrap_or_default().to_string(),
                    };
                    let ctx = self.resolver.resolve(self.ledger, row);
                    self.pb.set_message(item.identity.clone());

                    self.pacer.gate();
                    summary.calls += 1;
                    let result = self.annotator.annotate(&item, &ctx);

                    match result {
                        Ok(text) if !text.trim().is_empty() => {
                            self.pacer.on_success();
                            quota_rows = 0;
                            log::info!("{row}/{total} {}: {text}", item.identity);
                            Phase::Updating {
                                row,
                                outcome: RowOutcome::Annotated(text),
                            }
                        }
                        Ok(_) => Phase::Updating {
                            row,
                            outcome: RowOutcome::Skipped(Failure::malformed(
                                "annotator returned empty text",
                            )),
                        },
                        Err(failure) if failure.kind == FailureKind::Unauthorized => {
                            return Err(self.halt(
                                row,
                                HaltCause::Unauthorized(failure),
                                summary,
                                &window,
                            ));
                        }
                        Err(failure) if failure.is_retryable() && attempt < max_attempts => {
                            log::warn!(
                                "{}: attempt {attempt}/{max_attempts} failed: {failure}, retrying",
                                item.identity
                            );
                            self.pb.set_message(format!(
                                "{} retry {attempt}/{max_attempts}",
                                item.identity
                            ));
                            self.pacer.on_failure(failure.kind);
                            Phase::Calling {
                                row,
                                attempt: attempt + 1,
                            }
                        }
                        Err(failure) => {
                            // no retry follows, so no backoff; the gate spaces the next row
                            self.pacer.end_row();
                            let quota_exhausted = failure.is_retryable()
                                && failure.kind == FailureKind::QuotaExceeded;
                            if quota_exhausted {
                                quota_rows += 1;
                            } else {
                                quota_rows = 0;
                            }
                            let halt_after = self.config.quota_halt_after;
                            let outcome = if quota_exhausted
                                && halt_after > 0
                                && quota_rows >= halt_after
                            {
                                RowOutcome::Deferred(failure)
                            } else {
                                RowOutcome::Skipped(failure)
                            };
                            Phase::Updating { row, outcome }
                        }
                    }
                }

                Phase::Updating { row, outcome } => {
                    let identity = self.ledger.identity(row).unwrap_or_default().to_string();
                    let then = match outcome {
                        RowOutcome::Annotated(text) => {
                            self.write_cell(row, &target, text, &summary, &window)?;
                            if let Some(status) = &status_column {
                                self.write_cell(row, status, String::new(), &summary, &window)?;
                            }
                            summary.succeeded += 1;
                            None
                        }
                        RowOutcome::Skipped(failure) => {
                            log::error!("{identity}: giving up: {failure}");
                            if let Some(status) = &status_column {
                                let mark = format!("{FAILED_PREFIX}{}", failure.kind);
                                self.write_cell(row, status, mark, &summary, &window)?;
                            }
                            summary.skipped_failed += 1;
                            None
                        }
                        RowOutcome::Deferred(failure) => {
                            log::error!(
                                "{identity}: quota exhausted on {quota_rows} consecutive rows: {failure}"
                            );
                            Some(StopReason::QuotaExhausted)
                        }
                    };
                    Phase::Checkpointing { row, then }
                }

                Phase::Checkpointing { row, then } => {
                    if let Err(e) = self.checkpoint.persist(self.ledger) {
                        return Err(self.halt(row, HaltCause::LedgerIo(e), summary, &window));
                    }
                    self.pb.inc(1);
                    cursor = row + 1;
                    match then {
                        Some(reason) => Phase::Done(reason),
                        None => Phase::Selecting,
                    }
                }

                Phase::Done(reason) => break reason,
            };
        };

        summary.stop = stop;
        summary.remaining = self.count_pending(&window);
        summary.resume_from = self.next_pending(window.start, &window);
        self.pb.finish_and_clear();
        log::info!(
            "{}: {stop}: {} succeeded, {} failed, {} remaining, {} calls",
            self.annotator.name(),
            summary.succeeded,
            summary.skipped_failed,
            summary.remaining,
            summary.calls
        );
        Ok(summary)
    }

    fn write_cell(
        &mut self,
        row: usize,
        column: &str,
        value: String,
        summary: &RunSummary,
        window: &Range<usize>,
    ) -> Result<(), WalkError> {
        match self.ledger.set(row, column, value) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.halt(row, HaltCause::LedgerIo(e), summary.clone(), window)),
        }
    }

    /// Build the halt error. Rows up to `row` are on disk; `row` itself may
    /// only be updated in memory, so it counts as pending for resumption.
    fn halt(
        &mut self,
        row: usize,
        cause: HaltCause,
        mut summary: RunSummary,
        window: &Range<usize>,
    ) -> WalkError {
        let pending = self.next_pending(window.start, window);
        let row_in_window = window.contains(&row).then_some(row);
        summary.resume_from = match (pending, row_in_window) {
            (Some(p), Some(r)) => Some(p.min(r)),
            (p, r) => p.or(r),
        };
        summary.remaining = self.count_pending(window);
        summary.stop = StopReason::Halted;
        self.pb.abandon();
        log::error!("Run halted at row {row}: {cause}");
        WalkError::Halted {
            row,
            cause,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::{AnnotationResult, Context};
    use crate::checkpoint::Checkpoint;

    struct Memory {
        snapshots: Vec<Vec<u8>>,
    }

    impl Checkpoint for Memory {
        fn persist(&mut self, ledger: &Ledger) -> Result<(), LedgerError> {
            self.snapshots.push(ledger.to_csv_bytes()?);
            Ok(())
        }
    }

    struct Echo;

    impl Annotator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn annotate(&mut self, item: &Item, _ctx: &Context) -> AnnotationResult {
            Ok(format!("seen {}", item.identity))
        }
    }

    fn ledger(n: usize) -> Ledger {
        let mut ledger = Ledger::new("path");
        for i in 0..n {
            ledger.push_row(&format!("stamps/{i}.jpg")).unwrap();
        }
        ledger
    }

    fn config() -> RunConfig {
        RunConfig {
            target_column: "ANNOT".into(),
            base_delay_seconds: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn invalid_config_rejected_before_any_row() {
        let mut ledger = ledger(2);
        let mut ckpt = Memory { snapshots: vec![] };
        let mut echo = Echo;
        let bad = RunConfig {
            max_retries_per_row: 0,
            ..config()
        };
        let err = Walker::new(&mut ledger, &mut echo, &mut ckpt, &bad).unwrap_err();
        assert!(matches!(err, WalkError::Config(_)));
        assert!(ckpt.snapshots.is_empty());
    }

    #[test]
    fn unknown_source_column_rejected() {
        let mut ledger = ledger(1);
        let mut ckpt = Memory { snapshots: vec![] };
        let mut echo = Echo;
        let cfg = RunConfig {
            source_column: Some("processed".into()),
            ..config()
        };
        let err = Walker::new(&mut ledger, &mut echo, &mut ckpt, &cfg).unwrap_err();
        assert!(matches!(
            err,
            WalkError::Ledger(LedgerError::UnknownColumn(_))
        ));
    }

    #[test]
    fn adds_columns_and_checkpoints_each_row() {
        let mut ledger = ledger(3);
        let mut ckpt = Memory { snapshots: vec![] };
        let mut echo = Echo;
        let stop = AtomicBool::new(false);
        let cfg = config();
        let summary = Walker::new(&mut ledger, &mut echo, &mut ckpt, &cfg)
            .unwrap()
            .with_stop_flag(&stop)
            .run()
            .unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.stop, StopReason::Completed);
        assert_eq!(summary.resume_from, None);
        // schema change + one per row
        assert_eq!(ckpt.snapshots.len(), 4);
        assert!(ledger.has_column("ANNOT:status"));
        assert_eq!(ledger.get(2, "ANNOT"), Some("seen stamps/2.jpg"));
    }

    #[test]
    fn limit_caps_attempted_rows() {
        let mut ledger = ledger(5);
        let mut ckpt = Memory { snapshots: vec![] };
        let mut echo = Echo;
        let stop = AtomicBool::new(false);
        let cfg = RunConfig {
            limit: Some(2),
            ..config()
        };
        let summary = Walker::new(&mut ledger, &mut echo, &mut ckpt, &cfg)
            .unwrap()
            .with_stop_flag(&stop)
            .run()
            .unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.remaining, 3);
        assert_eq!(summary.resume_from, Some(2));
        assert_eq!(summary.stop, StopReason::LimitReached);
    }

    #[test]
    fn window_restricts_rows() {
        let mut ledger = ledger(5);
        let mut ckpt = Memory { snapshots: vec![] };
        let mut echo = Echo;
        let stop = AtomicBool::new(false);
        let cfg = RunConfig {
            start_index: 1,
            end_index: Some(3),
            ..config()
        };
        let summary = Walker::new(&mut ledger, &mut echo, &mut ckpt, &cfg)
            .unwrap()
            .with_stop_flag(&stop)
            .run()
            .unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(ledger.get(0, "ANNOT"), Some(""));
        assert_eq!(ledger.get(3, "ANNOT"), Some(""));
        assert_eq!(ledger.get(1, "ANNOT"), Some("seen stamps/1.jpg"));
    }

    #[test]
    fn preset_stop_flag_processes_nothing() {
        let mut ledger = ledger(3);
        let mut ckpt = Memory { snapshots: vec![] };
        let mut echo = Echo;
        let stop = AtomicBool::new(true);
        let cfg = config();
        let summary = Walker::new(&mut ledger, &mut echo, &mut ckpt, &cfg)
            .unwrap()
            .with_stop_flag(&stop)
            .run()
            .unwrap();
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(summary.calls, 0);
        assert_eq!(summary.resume_from, Some(0));
    }

    #[test]
    fn halt_display_names_resume_index() {
        let err = WalkError::Halted {
            row: 4,
            cause: HaltCause::LedgerIo(LedgerError::Io(std::io::Error::other("disk gone"))),
            summary: RunSummary {
                succeeded: 4,
                skipped_failed: 0,
                remaining: 6,
                calls: 5,
                resume_from: Some(4),
                stop: StopReason::Halted,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("row 4"));
        assert!(msg.contains("resume from index 4"));
        assert_eq!(err.resume_from(), Some(4));
    }
}
