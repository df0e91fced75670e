//! Annotate subcommand - fill pending rows of one column with a backend

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, ValueEnum};
use stampline_core::{
    Annotator, CommandAnnotator, ConfigError, FileCheckpoint, Ledger, ProgressContext, RunConfig,
    RunLock, RunSummary, StopReason, WalkError, Walker, fmt_num, install_signal_handlers,
    journal::{self, RunRecord},
};
use stampline_gemini::GeminiAnnotator;

use super::print_summary;
use crate::EXIT_CONFIG;
use crate::config::Config;

/// Exit code when the run stopped on a quota ceiling
const EXIT_QUOTA: u8 = 3;
/// Exit code after SIGINT/SIGTERM (128 + SIGINT)
const EXIT_CANCELLED: u8 = 130;

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Backend {
    /// Gemini generateContent API
    Gemini,
    /// Local program configured under [command]
    Command,
}

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Backend to call
    #[arg(short, long, value_enum, default_value = "gemini")]
    pub backend: Backend,

    /// Column receiving the annotations (overrides run.target_column)
    #[arg(long)]
    pub column: Option<String>,

    /// First row index of the window
    #[arg(long)]
    pub start: Option<usize>,

    /// Row index the window stops before
    #[arg(long)]
    pub end: Option<usize>,

    /// Maximum number of rows to process in this run
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Base delay between calls, in seconds
    #[arg(long)]
    pub delay: Option<f64>,

    /// Attempts per row before it is given up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Consecutive quota-exhausted rows that stop the run
    #[arg(long)]
    pub quota_halt_after: Option<u32>,

    /// Column holding the image path to send (default: the identity)
    #[arg(long)]
    pub source_column: Option<String>,

    /// Leave failed rows unmarked so the next run retries them
    #[arg(long)]
    pub no_track_failures: bool,

    /// Gemini model (overrides gemini.model)
    #[arg(long)]
    pub model: Option<String>,

    /// Program to run (overrides command.program)
    #[arg(long)]
    pub program: Option<String>,

    /// Program argument, placed before the image path (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl AnnotateArgs {
    fn run_config(&self, base: &RunConfig) -> RunConfig {
        let mut run = base.clone();
        if let Some(column) = &self.column {
            run.target_column = column.clone();
        }
        if let Some(start) = self.start {
            run.start_index = start;
        }
        if self.end.is_some() {
            run.end_index = self.end;
        }
        if self.limit.is_some() {
            run.limit = self.limit;
        }
        if let Some(delay) = self.delay {
            run.base_delay_seconds = delay;
        }
        if let Some(n) = self.max_retries {
            run.max_retries_per_row = n;
        }
        if let Some(n) = self.quota_halt_after {
            run.quota_halt_after = n;
        }
        if self.source_column.is_some() {
            run.source_column = self.source_column.clone();
        }
        if self.no_track_failures {
            run.track_failures = false;
        }
        run
    }
}

fn build_annotator(
    args: &AnnotateArgs,
    config: &Config,
) -> Result<Box<dyn Annotator>, ConfigError> {
    match args.backend {
        Backend::Gemini => {
            let mut gemini = config.gemini.clone();
            if let Some(model) = &args.model {
                gemini.model = model.clone();
            }
            Ok(Box::new(GeminiAnnotator::new(gemini)?))
        }
        Backend::Command => {
            let program = args
                .program
                .as_deref()
                .or(config.command.program.as_deref())
                .ok_or_else(|| {
                    ConfigError::Backend("no program given (--program or command.program)".into())
                })?;
            let extra = if args.args.is_empty() {
                config.command.args.clone()
            } else {
                args.args.clone()
            };
            let mut annotator = CommandAnnotator::new(program, extra)?;
            if let Some(name) = &config.command.name {
                annotator = annotator.with_name(name);
            }
            Ok(Box::new(annotator))
        }
    }
}

fn summary_rows(summary: &RunSummary, elapsed_secs: f64) -> Vec<(&'static str, String)> {
    vec![
        ("Annotated", fmt_num(summary.succeeded)),
        ("Failed", fmt_num(summary.skipped_failed)),
        ("Remaining", fmt_num(summary.remaining)),
        ("Calls", fmt_num(summary.calls)),
        (
            "Resume from",
            summary
                .resume_from
                .map_or("-".to_string(), |i| i.to_string()),
        ),
        ("Stop", summary.stop.to_string()),
        ("Elapsed", format!("{elapsed_secs:.1}s")),
    ]
}

pub fn run(args: AnnotateArgs, config: &Config, progress: &ProgressContext) -> Result<ExitCode> {
    let run = args.run_config(&config.run);
    let path = config.ledger_path();

    let mut annotator = match build_annotator(&args, config) {
        Ok(a) => a,
        Err(e) => {
            log::error!("{e}");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let _lock = match RunLock::acquire(&path) {
        Ok(lock) => lock,
        Err(e) => {
            log::error!("Cannot lock ledger: {e}");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };
    if let Err(e) = install_signal_handlers() {
        log::warn!("Cannot install signal handlers: {e}");
    }

    let mut ledger = match Ledger::load(&path, &config.ledger.identity_column) {
        Ok(l) => l,
        Err(e) => {
            log::error!("{e}");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let name = annotator.name().to_string();
    log::info!(
        "Annotating {} column {:?} with {name}",
        path.display(),
        run.target()
    );

    let started_at = Utc::now();
    let start = Instant::now();
    let pb = progress.row_bar(&name, 0);
    let mut checkpoint = FileCheckpoint::new(&path);
    let result = Walker::new(&mut ledger, annotator.as_mut(), &mut checkpoint, &run)
        .map(|walker| {
            walker
                .with_root(&config.ledger.root)
                .with_progress(pb.clone())
                .run()
        })
        .and_then(|r| r);
    pb.finish_and_clear();
    let elapsed = start.elapsed().as_secs_f64();
    log::debug!("{} checkpoints written", checkpoint.writes());

    let summary = match &result {
        Ok(summary) => Some(summary),
        Err(WalkError::Halted { summary, .. }) => Some(summary),
        Err(_) => None,
    };
    if let Some(summary) = summary {
        let record = RunRecord::new(
            started_at,
            &name,
            run.target(),
            (run.start_index, run.end_index),
            summary,
        );
        let journal_path = journal::journal_path(&path);
        if let Err(e) = journal::append(&journal_path, &record) {
            log::warn!("Cannot append to {}: {e}", journal_path.display());
        }
        print_summary(
            &format!("Annotate {}", run.target()),
            &summary_rows(summary, elapsed),
        );
    }

    let code = match result {
        Ok(summary) => match summary.stop {
            StopReason::Completed | StopReason::LimitReached => ExitCode::SUCCESS,
            StopReason::Cancelled => {
                log::warn!("Interrupted; rerun to continue");
                ExitCode::from(EXIT_CANCELLED)
            }
            StopReason::QuotaExhausted => {
                log::warn!("Quota exhausted; rerun once the quota resets");
                ExitCode::from(EXIT_QUOTA)
            }
            StopReason::Halted => ExitCode::FAILURE,
        },
        Err(e @ WalkError::Halted { .. }) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(EXIT_CONFIG)
        }
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: AnnotateArgs,
    }

    fn parse(argv: &[&str]) -> AnnotateArgs {
        Harness::parse_from(std::iter::once("annotate").chain(argv.iter().copied())).args
    }

    #[test]
    fn overrides_apply_on_top_of_config() {
        let args = parse(&[
            "--column",
            "OCR",
            "--end",
            "50",
            "-n",
            "10",
            "--no-track-failures",
        ]);
        let run = args.run_config(&RunConfig::default());
        assert_eq!(run.target_column, "OCR");
        assert_eq!(run.end_index, Some(50));
        assert_eq!(run.limit, Some(10));
        assert!(!run.track_failures);
        assert_eq!(run.start_index, 0);
    }

    #[test]
    fn missing_program_is_a_config_error() {
        let args = parse(&["--backend", "command"]);
        let err = build_annotator(&args, &Config::default()).err().unwrap();
        assert!(matches!(err, ConfigError::Backend(_)));
    }

    #[test]
    fn program_args_accept_flags() {
        let args = parse(&[
            "-b", "command", "--program", "ocr", "--arg", "--lang", "--arg", "eng",
        ]);
        assert_eq!(args.args, ["--lang", "eng"]);
    }
}
