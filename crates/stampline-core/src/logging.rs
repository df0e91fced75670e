//! Log output for annotation runs.
//!
//! On a terminal, lines are printed through the row bar's `MultiProgress` so
//! they never tear the bar. Elsewhere each line starts with a UTC timestamp:
//! unattended runs spend hours in backoff and the gaps matter.

use std::fmt;

use chrono::Utc;
use indicatif::MultiProgress;
use log::Level;

/// Bracketed level label, ANSI-colored on a terminal
#[derive(Debug, Clone, Copy)]
struct LevelTag {
    level: Level,
    color: bool,
}

impl LevelTag {
    fn ansi(self) -> &'static str {
        match self.level {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }
}

impl fmt::Display for LevelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = format!("{:<5}", self.level.as_str());
        if self.color {
            write!(f, "[{}{label}\x1b[0m]", self.ansi())
        } else {
            write!(f, "[{label}]")
        }
    }
}

/// One log line without timestamp. Debug and trace lines name their
/// module so HTTP client chatter stays apart from run progress.
fn render(level: Level, target: &str, args: fmt::Arguments<'_>, color: bool) -> String {
    let tag = LevelTag { level, color };
    if level >= Level::Debug {
        format!("{tag} {target}: {args}")
    } else {
        format!("{tag} {args}")
    }
}

/// Logger that suspends the row bar while a line is printed
pub struct BarLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl BarLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for BarLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.matches(record) {
            let line = render(record.level(), record.target(), *record.args(), true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn default_level(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Install the global logger. `RUST_LOG` overrides the level flags.
///
/// Calling twice is harmless; the second call leaves the first logger in place.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(default_level(quiet, debug));

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();
        if log::set_boxed_logger(Box::new(BarLogger::new(logger, multi.clone()))).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        let _ = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} {}",
                    Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    render(record.level(), record.target(), *record.args(), false)
                )
            })
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_wins_over_quiet() {
        assert_eq!(default_level(true, true), "debug");
        assert_eq!(default_level(true, false), "warn");
        assert_eq!(default_level(false, false), "info");
    }

    #[test]
    fn plain_lines_have_no_ansi() {
        let line = render(Level::Warn, "stampline_core::walker", format_args!("429, retrying"), false);
        assert_eq!(line, "[WARN ] 429, retrying");
    }

    #[test]
    fn debug_lines_name_their_module() {
        let line = render(Level::Debug, "reqwest::connect", format_args!("starting"), true);
        assert_eq!(line, "[\x1b[36mDEBUG\x1b[0m] reqwest::connect: starting");
    }
}
