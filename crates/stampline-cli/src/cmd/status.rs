//! Status subcommand - fill counts, failure marks and recent runs

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use stampline_core::{FAILED_PREFIX, Ledger, STATUS_SUFFIX, fmt_num, journal};

use super::{print_summary, styled_table};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Column to report the resume point for (overrides run.target_column)
    #[arg(long)]
    pub column: Option<String>,

    /// Number of journal entries to show
    #[arg(long, default_value_t = 5)]
    pub runs: usize,
}

fn failure_marks(ledger: &Ledger, status: &str) -> usize {
    (0..ledger.len())
        .filter(|&row| {
            ledger
                .get(row, status)
                .is_some_and(|v| v.starts_with(FAILED_PREFIX))
        })
        .count()
}

/// First row in the configured window the next annotate run would pick up
fn next_pending(ledger: &Ledger, config: &Config, target: &str) -> Option<usize> {
    let status = format!("{target}{STATUS_SUFFIX}");
    let window = ledger.clamp(config.run.start_index, config.run.end_index);
    if !ledger.has_column(target) {
        return (!window.is_empty()).then_some(window.start);
    }
    window.into_iter().find(|&row| {
        ledger.is_blank(row, target)
            && (!config.run.track_failures
                || !ledger.has_column(&status)
                || ledger.is_blank(row, &status))
    })
}

pub fn run(args: StatusArgs, config: &Config) -> Result<ExitCode> {
    let path = config.ledger_path();
    let ledger = Ledger::load(&path, &config.ledger.identity_column)?;
    let target = args.column.as_deref().unwrap_or(config.run.target());

    let mut table = styled_table(&["Column", "Filled", "Empty", "Failed"]);
    for column in ledger.columns().iter().skip(1) {
        if column.ends_with(STATUS_SUFFIX) {
            continue;
        }
        let Some(stats) = ledger.column_stats(column) else {
            continue;
        };
        let status = format!("{column}{STATUS_SUFFIX}");
        let failed = if ledger.has_column(&status) {
            fmt_num(failure_marks(&ledger, &status))
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(column),
            Cell::new(fmt_num(stats.filled)),
            Cell::new(fmt_num(stats.empty)),
            Cell::new(failed),
        ]);
    }
    eprintln!("\n{table}");

    print_summary(
        "Ledger",
        &[
            ("Path", path.display().to_string()),
            ("Rows", fmt_num(ledger.len())),
            ("Target column", target.to_string()),
            (
                "Next pending row",
                next_pending(&ledger, config, target)
                    .map_or("none".to_string(), |i| i.to_string()),
            ),
        ],
    );

    let journal_path = journal::journal_path(&path);
    let records = journal::read_all(&journal_path)
        .with_context(|| format!("Cannot read {}", journal_path.display()))?;
    if !records.is_empty() && args.runs > 0 {
        let mut runs = styled_table(&[
            "Started", "Backend", "Column", "Done", "Failed", "Left", "Calls", "Stop",
        ]);
        for record in &records[records.len().saturating_sub(args.runs)..] {
            runs.add_row(vec![
                Cell::new(record.started_at.format("%Y-%m-%d %H:%M")),
                Cell::new(&record.annotator),
                Cell::new(&record.target_column),
                Cell::new(fmt_num(record.succeeded)),
                Cell::new(fmt_num(record.skipped_failed)),
                Cell::new(fmt_num(record.remaining)),
                Cell::new(fmt_num(record.calls)),
                Cell::new(record.stop),
            ]);
        }
        eprintln!("\n{runs}");
    }
    Ok(ExitCode::SUCCESS)
}
