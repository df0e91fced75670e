//! Contrast subcommand - black-and-white variants for OCR backends

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use stampline_core::{
    ProgressContext, fmt_num, install_signal_handlers, is_shutdown_requested, shutdown_flag,
};

use super::{lock_and_load, print_summary};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ContrastArgs {
    /// Reprocess images whose output already exists
    #[arg(short, long)]
    pub force: bool,

    /// Contrast factor (overrides contrast.factor)
    #[arg(long)]
    pub factor: Option<f32>,

    /// Black/white threshold, 0-255 (overrides contrast.threshold)
    #[arg(long)]
    pub threshold: Option<u8>,
}

pub fn run(args: ContrastArgs, config: &Config, progress: &ProgressContext) -> Result<ExitCode> {
    let mut contrast = config.contrast.clone();
    if let Some(factor) = args.factor {
        contrast.factor = factor;
    }
    if let Some(threshold) = args.threshold {
        contrast.threshold = threshold;
    }

    let path = config.ledger_path();
    let (_lock, mut ledger) = lock_and_load(config)?;
    if let Err(e) = install_signal_handlers() {
        log::warn!("Cannot install signal handlers: {e}");
    }

    let start = Instant::now();
    let pb = progress.row_bar("contrast", 0);
    let report = stampline_dataset::run_contrast(
        &mut ledger,
        &config.ledger.root,
        &contrast,
        args.force,
        shutdown_flag(),
        &pb,
    )?;
    pb.finish_and_clear();
    ledger.persist(&path)?;

    print_summary(
        "Contrast",
        &[
            ("Column", contrast.column.clone()),
            ("Processed", fmt_num(report.processed)),
            ("Already present", fmt_num(report.existing)),
            ("Failed", fmt_num(report.failed)),
            ("Unmapped", fmt_num(report.unmapped)),
            ("Elapsed", format!("{:.1}s", start.elapsed().as_secs_f64())),
        ],
    );

    if is_shutdown_requested() {
        log::warn!("Interrupted; rerun to process the remaining images");
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
