//! Checkpoint writer: persist the full ledger after every row transition

use std::path::{Path, PathBuf};

use crate::error::LedgerError;
use crate::ledger::Ledger;

/// Durable snapshot sink for the walker
pub trait Checkpoint {
    fn persist(&mut self, ledger: &Ledger) -> Result<(), LedgerError>;
}

/// Writes the ledger back to its CSV file (tmp + rename)
#[derive(Debug)]
pub struct FileCheckpoint {
    path: PathBuf,
    writes: usize,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshots written so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Checkpoint for FileCheckpoint {
    fn persist(&mut self, ledger: &Ledger) -> Result<(), LedgerError> {
        ledger.persist(&self.path)?;
        self.writes += 1;
        log::trace!("checkpoint #{} -> {}", self.writes, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn persist_counts_writes_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stamps.csv");
        let mut ledger = Ledger::new("path");
        ledger.push_row("stamps/a.jpg").unwrap();
        ledger.ensure_column("GEM").unwrap();

        let mut ckpt = FileCheckpoint::new(&path);
        ckpt.persist(&ledger).unwrap();
        ledger.set(0, "GEM", "2020-01-01, entry").unwrap();
        ckpt.persist(&ledger).unwrap();

        assert_eq!(ckpt.writes(), 2);
        let reloaded = Ledger::load(ckpt.path(), "path").unwrap();
        assert_eq!(reloaded.get(0, "GEM"), Some("2020-01-01, entry"));
    }

    #[test]
    fn persist_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let mut ckpt = FileCheckpoint::new(dir.path().join("gone/stamps.csv"));
        let err = ckpt.persist(&Ledger::new("path")).unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));
        assert_eq!(ckpt.writes(), 0);
    }
}
