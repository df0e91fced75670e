//! Ledger creation from an image folder

use std::path::{Component, Path};

use anyhow::Context;
use stampline_core::{Ledger, LedgerError};

/// Outcome of merging a scan into a ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub found: usize,
    pub added: usize,
    pub existing: usize,
}

fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Files under `images`, as `/`-separated paths relative to `root`, sorted.
///
/// Hidden files and anything inside hidden directories are skipped.
pub fn find_images(root: &Path, images: &Path) -> anyhow::Result<Vec<String>> {
    anyhow::ensure!(
        images.is_dir(),
        "image directory not found: {}",
        images.display()
    );
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot resolve data root {}", root.display()))?;
    let images = images
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", images.display()))?;
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&images.to_string_lossy())
    );

    let mut found = Vec::new();
    for entry in glob::glob(&pattern).context("invalid glob pattern")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let rel = path.strip_prefix(&root).with_context(|| {
            format!(
                "{} is not under the data root {}",
                path.display(),
                root.display()
            )
        })?;
        if is_hidden(rel) {
            continue;
        }
        let rel: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        found.push(rel.join("/"));
    }
    found.sort();
    Ok(found)
}

/// Append identities missing from the ledger, in the given order.
/// Existing rows keep their position and annotations.
pub fn merge_identities(
    ledger: &mut Ledger,
    identities: &[String],
) -> Result<ScanReport, LedgerError> {
    let mut report = ScanReport {
        found: identities.len(),
        ..Default::default()
    };
    for identity in identities {
        if ledger.index_of(identity).is_some() {
            report.existing += 1;
        } else {
            ledger.push_row(identity)?;
            report.added += 1;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn finds_nested_files_sorted_and_relative() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "data/stamps/b.jpg");
        touch(dir.path(), "data/stamps/a.png");
        touch(dir.path(), "data/stamps/2019/c.jpg");
        touch(dir.path(), "data/stamps/.DS_Store");
        touch(dir.path(), "data/stamps/.cache/d.jpg");

        let found = find_images(dir.path(), &dir.path().join("data/stamps")).unwrap();
        assert_eq!(
            found,
            [
                "data/stamps/2019/c.jpg",
                "data/stamps/a.png",
                "data/stamps/b.jpg"
            ]
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = find_images(dir.path(), &dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn images_outside_root_rejected() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        touch(other.path(), "a.jpg");
        assert!(find_images(root.path(), other.path()).is_err());
    }

    #[test]
    fn merge_appends_only_new() {
        let mut ledger = Ledger::new("path");
        ledger.ensure_column("GEM").unwrap();
        ledger.push_row("stamps/b.jpg").unwrap();
        ledger.set(0, "GEM", "done").unwrap();

        let scanned = vec!["stamps/a.jpg".to_string(), "stamps/b.jpg".to_string()];
        let report = merge_identities(&mut ledger, &scanned).unwrap();
        assert_eq!(
            report,
            ScanReport {
                found: 2,
                added: 1,
                existing: 1
            }
        );
        assert_eq!(ledger.identity(0), Some("stamps/b.jpg"));
        assert_eq!(ledger.get(0, "GEM"), Some("done"));
        assert_eq!(ledger.identity(1), Some("stamps/a.jpg"));
        assert_eq!(ledger.get(1, "GEM"), Some(""));
    }
}
