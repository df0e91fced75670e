pub mod annotate;
pub mod contrast;
pub mod info;
pub mod reset;
pub mod scan;
pub mod status;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use stampline_core::{Ledger, RunLock};

use crate::config::Config;

/// Table with the house style: rounded UTF-8 borders, cyan header
pub fn styled_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = styled_table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// Take the run lock, then load the ledger
pub fn lock_and_load(config: &Config) -> Result<(RunLock, Ledger)> {
    let path = config.ledger_path();
    let lock = RunLock::acquire(&path).context("Cannot lock ledger")?;
    let ledger = Ledger::load(&path, &config.ledger.identity_column)?;
    Ok((lock, ledger))
}

pub fn print_config(config: &Config) {
    let run = &config.run;
    let rows = [
        ("Ledger", config.ledger_path().display().to_string()),
        ("Identity column", config.ledger.identity_column.clone()),
        ("Data root", config.ledger.root.display().to_string()),
        ("Image folder", config.scan.images.display().to_string()),
        ("Target column", run.target_column.clone()),
        (
            "Window",
            format!(
                "[{}, {})",
                run.start_index,
                run.end_index.map_or("end".to_string(), |e| e.to_string())
            ),
        ),
        (
            "Limit",
            run.limit.map_or("none".to_string(), |l| l.to_string()),
        ),
        ("Base delay", format!("{}s", run.base_delay_seconds)),
        ("Backoff multiplier", run.backoff_multiplier.to_string()),
        ("Max backoff", format!("{}s", run.max_backoff_seconds)),
        ("Attempts per row", run.max_retries_per_row.to_string()),
        ("Quota factor", run.quota_backoff_factor.to_string()),
        ("Quota stop after", format!("{} rows", run.quota_halt_after)),
        ("Track failures", run.track_failures.to_string()),
        (
            "Source column",
            run.source_column.clone().unwrap_or_else(|| "(identity)".to_string()),
        ),
        ("Gemini model", config.gemini.model.clone()),
        ("Gemini endpoint", config.gemini.endpoint()),
        (
            "Gemini API key",
            if config.gemini.resolve_api_key().is_ok() {
                "configured".to_string()
            } else {
                "not set".to_string()
            },
        ),
        (
            "Command",
            match &config.command.program {
                Some(p) => format!("{p} {}", config.command.args.join(" ")).trim_end().to_string(),
                None => "not set".to_string(),
            },
        ),
        (
            "Contrast",
            format!(
                "factor {} threshold {} ({} -> {})",
                config.contrast.factor,
                config.contrast.threshold,
                config.contrast.input_segment,
                config.contrast.output_segment
            ),
        ),
    ];
    print_summary("Setting", &rows);
}
