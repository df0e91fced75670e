//! Run lock: one writer per ledger file, by convention.
//!
//! `<ledger>.lock` is created exclusively at the start of a run and removed
//! when the guard drops. A lock left behind by a killed process must be
//! removed by hand; its content names the owning pid.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Lock file path for a ledger (`stamps.csv` → `stamps.csv.lock`)
pub fn lock_path(ledger: &Path) -> PathBuf {
    let mut name = ledger.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    ledger.with_file_name(name)
}

/// RAII guard; removes the lock file on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(ledger: &Path) -> io::Result<Self> {
        let path = lock_path(ledger);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default();
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "{} exists (held by pid {}); another run is using this ledger. \
                         Remove the file if that run is gone.",
                        path.display(),
                        owner.trim()
                    ),
                ));
            }
            Err(e) => return Err(e),
        };
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Cannot remove run lock {}: {e}", self.path.display());
        }
    }
}
