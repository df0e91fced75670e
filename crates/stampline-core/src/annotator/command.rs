//! Local annotator backend: run an external program per image.
//!
//! The program receives the configured arguments followed by the source
//! path, and prints the annotation on stdout. Exit status follows sysexits:
//!
//! | status | meaning          | failure kind            |
//! |--------|------------------|-------------------------|
//! | 0      | success          | -                       |
//! | 65     | `EX_DATAERR`     | malformed-input         |
//! | 66     | `EX_NOINPUT`     | not-found               |
//! | 75     | `EX_TEMPFAIL`    | quota-exceeded          |
//! | 77     | `EX_NOPERM`      | unauthorized            |
//! | other  | crash, signal    | transient-service-error |

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{AnnotationResult, Annotator, Context, Failure, FailureKind, Item};
use crate::error::ConfigError;

const EX_DATAERR: i32 = 65;
const EX_NOINPUT: i32 = 66;
const EX_TEMPFAIL: i32 = 75;
const EX_NOPERM: i32 = 77;

/// Longest stderr excerpt kept in a failure message
const STDERR_EXCERPT: usize = 240;

/// Runs `program args... <source>` and returns its trimmed stdout
#[derive(Debug, Clone)]
pub struct CommandAnnotator {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandAnnotator {
    /// Resolve `program` (a path or a name on `PATH`) up front so a typo
    /// fails the run before any row is attempted.
    pub fn new(program: &str, args: Vec<String>) -> Result<Self, ConfigError> {
        let resolved = resolve_program(program).ok_or_else(|| {
            ConfigError::Backend(format!("program not found: {program:?}"))
        })?;
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());
        Ok(Self {
            name,
            program: resolved,
            args,
        })
    }

    /// Override the label used in logs and the run journal
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Map a non-zero exit status to a failure kind
fn classify_exit(code: Option<i32>) -> FailureKind {
    match code {
        Some(EX_DATAERR) => FailureKind::MalformedInput,
        Some(EX_NOINPUT) => FailureKind::NotFound,
        Some(EX_TEMPFAIL) => FailureKind::QuotaExceeded,
        Some(EX_NOPERM) => FailureKind::Unauthorized,
        _ => FailureKind::TransientServiceError,
    }
}

/// Join non-empty stdout lines with single spaces
fn collapse_lines(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

impl Annotator for CommandAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotate(&mut self, item: &Item, ctx: &Context) -> AnnotationResult {
        if !ctx.source.exists() {
            return Err(Failure::not_found(format!(
                "{}: source missing",
                ctx.source.display()
            )));
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&ctx.source)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Failure::transient(format!("{}: spawn failed: {e}", self.program.display()))
            })?;

        if output.status.success() {
            return Ok(collapse_lines(&String::from_utf8_lossy(&output.stdout)));
        }

        let kind = classify_exit(output.status.code());
        let status = output
            .status
            .code()
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit {c}"));
        log::debug!("{}: {} ({status})", item.identity, self.name);
        Err(Failure::new(
            kind,
            format!("{} {status}: {}", self.name, stderr_excerpt(&output.stderr)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandAnnotator {
        // `sh -c script sh <source>`: the source path arrives as $1
        CommandAnnotator::new("sh", vec!["-c".into(), script.into(), "sh".into()]).unwrap()
    }

    fn item() -> Item {
        Item {
            index: 0,
            identity: "stamps/a.jpg".into(),
        }
    }

    fn ctx_with_file(dir: &TempDir) -> Context {
        let source = dir.path().join("a.jpg");
        std::fs::write(&source, b"\xff\xd8fake").unwrap();
        Context { source }
    }

    #[test]
    fn missing_program_is_config_error() {
        let err = CommandAnnotator::new("definitely-not-a-real-ocr-tool", vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Backend(_)));
    }

    #[test]
    fn name_defaults_to_program_file_name() {
        let a = CommandAnnotator::new("sh", vec![]).unwrap();
        assert_eq!(a.name(), "sh");
        assert_eq!(a.with_name("trocr").name(), "trocr");
    }

    #[test]
    fn success_returns_collapsed_stdout() {
        let dir = TempDir::new().unwrap();
        let mut a = sh("printf 'ARRIVED\\n\\n  12 MAR 2019 \\n'");
        let text = a.annotate(&item(), &ctx_with_file(&dir)).unwrap();
        assert_eq!(text, "ARRIVED 12 MAR 2019");
    }

    #[test]
    fn source_path_is_last_argument() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_with_file(&dir);
        let mut a = sh("basename \"$1\"");
        assert_eq!(a.annotate(&item(), &ctx).unwrap(), "a.jpg");
    }

    #[test]
    fn exit_codes_map_to_kinds() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_with_file(&dir);
        for (code, kind) in [
            (65, FailureKind::MalformedInput),
            (66, FailureKind::NotFound),
            (75, FailureKind::QuotaExceeded),
            (77, FailureKind::Unauthorized),
            (1, FailureKind::TransientServiceError),
        ] {
            let mut a = sh(&format!("echo boom >&2; exit {code}"));
            let err = a.annotate(&item(), &ctx).unwrap_err();
            assert_eq!(err.kind, kind, "exit {code}");
            assert!(err.message.contains("boom"));
        }
    }

    #[test]
    fn missing_source_is_not_found_without_spawning() {
        let dir = TempDir::new().unwrap();
        let mut a = sh("exit 0");
        let ctx = Context {
            source: dir.path().join("gone.jpg"),
        };
        let err = a.annotate(&item(), &ctx).unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn stderr_excerpt_truncates() {
        let long = "x".repeat(1000);
        let excerpt = stderr_excerpt(long.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.len(), STDERR_EXCERPT + 3);
    }
}
