//! Scan subcommand - create or extend the ledger from an image folder

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use stampline_core::{Ledger, RunLock, fmt_num};

use super::print_summary;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image folder, relative to the data root (overrides scan.images)
    #[arg(short, long)]
    pub images: Option<PathBuf>,

    /// Empty column to add to the ledger (repeatable)
    #[arg(long = "column")]
    pub columns: Vec<String>,
}

pub fn run(args: ScanArgs, config: &Config) -> Result<ExitCode> {
    let root = &config.ledger.root;
    let images = root.join(args.images.as_ref().unwrap_or(&config.scan.images));
    let path = config.ledger_path();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let _lock = RunLock::acquire(&path).context("Cannot lock ledger")?;
    let mut ledger = if path.exists() {
        Ledger::load(&path, &config.ledger.identity_column)?
    } else {
        log::info!("Creating ledger {}", path.display());
        Ledger::new(&config.ledger.identity_column)
    };

    let mut new_columns = 0;
    for column in config.scan.columns.iter().chain(&args.columns) {
        if ledger.ensure_column(column)? {
            new_columns += 1;
        }
    }

    let found = stampline_dataset::find_images(root, &images)?;
    let report = stampline_dataset::merge_identities(&mut ledger, &found)?;
    log::info!(
        "Scanned {}: {} files, {} new",
        images.display(),
        report.found,
        report.added
    );

    ledger.persist(&path)?;

    print_summary(
        "Scan",
        &[
            ("Ledger", path.display().to_string()),
            ("Files found", fmt_num(report.found)),
            ("Rows added", fmt_num(report.added)),
            ("Already present", fmt_num(report.existing)),
            ("Columns added", fmt_num(new_columns)),
            ("Total rows", fmt_num(ledger.len())),
        ],
    );
    Ok(ExitCode::SUCCESS)
}
