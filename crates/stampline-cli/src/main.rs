//! stampline - resumable annotation of passport-stamp image ledgers
//!
//! Builds a CSV ledger from an image folder, prepares images, and fills
//! annotation columns one row at a time through cloud or local backends.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

/// Exit code for configuration and startup errors
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "stampline")]
#[command(about = "Resumable annotation of passport-stamp image ledgers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./stampline.toml or ~/.config/stampline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ledger CSV file (overrides ledger.path)
    #[arg(short, long, global = true)]
    ledger: Option<PathBuf>,

    /// Directory ledger identities are relative to (overrides ledger.root)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create or extend the ledger from an image folder
    Scan(cmd::scan::ScanArgs),
    /// Fill a column with country/type guesses from file names
    Info(cmd::info::InfoArgs),
    /// Write high-contrast black-and-white variants of every image
    Contrast(cmd::contrast::ContrastArgs),
    /// Annotate pending rows with a backend
    Annotate(cmd::annotate::AnnotateArgs),
    /// Show column fill counts, failure marks and recent runs
    Status(cmd::status::StatusArgs),
    /// Clear a column or its failure marks so the next run retries them
    Reset(cmd::reset::ResetArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = stampline_core::ProgressContext::new();

    // TTY: quiet (warn) unless --debug, the row bar shows activity
    // non-TTY: info, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    stampline_core::init_logging(quiet, cli.debug, multi);

    let loaded = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(ledger) = cli.ledger {
        config.ledger.path = ledger;
    }
    if let Some(root) = cli.root {
        config.ledger.root = root;
    }

    let result = match cli.command {
        Command::Scan(args) => cmd::scan::run(args, &config),
        Command::Info(args) => cmd::info::run(args, &config),
        Command::Contrast(args) => cmd::contrast::run(args, &config, &progress),
        Command::Annotate(args) => cmd::annotate::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Reset(args) => cmd::reset::run(args, &config),
        Command::Config => {
            cmd::print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
