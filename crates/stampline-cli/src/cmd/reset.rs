//! Reset subcommand - clear annotations or failure marks for a new pass

use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::Args;
use stampline_core::{FAILED_PREFIX, STATUS_SUFFIX, fmt_num};

use super::{lock_and_load, print_summary};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Annotation column to reset
    #[arg(long)]
    pub column: String,

    /// Only clear failure marks, keep annotations
    #[arg(long)]
    pub failed_only: bool,
}

pub fn run(args: ResetArgs, config: &Config) -> Result<ExitCode> {
    let path = config.ledger_path();
    let (_lock, mut ledger) = lock_and_load(config)?;

    let status = format!("{}{STATUS_SUFFIX}", args.column);
    if !ledger.has_column(&args.column) && !ledger.has_column(&status) {
        bail!("ledger has no column {:?}", args.column);
    }

    let mut cleared_marks = 0;
    let mut cleared_values = 0;
    for row in 0..ledger.len() {
        if ledger
            .get(row, &status)
            .is_some_and(|mark| mark.starts_with(FAILED_PREFIX))
        {
            ledger.set(row, &status, "")?;
            cleared_marks += 1;
        }
        if !args.failed_only
            && ledger.has_column(&args.column)
            && !ledger.is_blank(row, &args.column)
        {
            ledger.set(row, &args.column, "")?;
            cleared_values += 1;
        }
    }
    ledger.persist(&path)?;

    print_summary(
        "Reset",
        &[
            ("Column", args.column),
            ("Failure marks cleared", fmt_num(cleared_marks)),
            ("Annotations cleared", fmt_num(cleared_values)),
        ],
    );
    Ok(ExitCode::SUCCESS)
}
