//! Info subcommand - country and entry/exit guesses from file names

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use stampline_core::fmt_num;

use super::{lock_and_load, print_summary};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Column to fill
    #[arg(long, default_value = "info")]
    pub column: String,

    /// Replace values already in the column
    #[arg(long)]
    pub overwrite: bool,
}

pub fn run(args: InfoArgs, config: &Config) -> Result<ExitCode> {
    let path = config.ledger_path();
    let (_lock, mut ledger) = lock_and_load(config)?;

    let report = stampline_dataset::fill_info_column(&mut ledger, &args.column, args.overwrite)?;
    ledger.persist(&path)?;

    print_summary(
        "Info",
        &[
            ("Column", args.column),
            ("Written", fmt_num(report.written)),
            ("Kept", fmt_num(report.kept)),
            ("Nothing detected", fmt_num(report.blank)),
        ],
    );
    Ok(ExitCode::SUCCESS)
}
