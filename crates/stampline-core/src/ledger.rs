//! Tabular ledger: one row per dataset item, identity first, annotation columns after.
//!
//! Stored as CSV. The first column holds the item identity (a relative path),
//! which is unique and never rewritten. Annotation columns are appended over
//! the dataset's life; a missing value is an empty field, never a sentinel.

use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::Range;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::error::LedgerError;

/// Default name of the identity column
pub const DEFAULT_IDENTITY_COLUMN: &str = "path";

/// Filled/empty counts for one column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnStats {
    pub filled: usize,
    pub empty: usize,
}

/// In-memory ledger with a name→index column map.
#[derive(Debug, Clone)]
pub struct Ledger {
    columns: Vec<String>,
    column_index: FxHashMap<String, usize>,
    rows: Vec<Vec<String>>,
    identities: FxHashMap<String, usize>,
}

/// Temporary sibling used for atomic replace (`stamps.csv` → `stamps.csv.tmp`)
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl Ledger {
    /// Create an empty ledger with only the identity column.
    pub fn new(identity_column: &str) -> Self {
        let mut column_index = FxHashMap::default();
        column_index.insert(identity_column.to_string(), 0);
        Self {
            columns: vec![identity_column.to_string()],
            column_index,
            rows: Vec::new(),
            identities: FxHashMap::default(),
        }
    }

    /// Load from a CSV file whose first header cell must be `identity_column`.
    pub fn load(path: &Path, identity_column: &str) -> Result<Self, LedgerError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LedgerError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(LedgerError::Io(e)),
        };
        Self::from_reader(file, identity_column).map_err(|e| match e {
            LedgerError::Malformed(reason) => {
                LedgerError::Malformed(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Parse a ledger from any CSV source.
    pub fn from_reader(reader: impl Read, identity_column: &str) -> Result<Self, LedgerError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = csv_reader.records();

        let header = match records.next() {
            Some(record) => record?,
            None => return Err(LedgerError::Malformed("missing header row".into())),
        };

        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                // Spreadsheet exports prepend a BOM to the first cell
                let cell = if i == 0 {
                    cell.trim_start_matches('\u{feff}')
                } else {
                    cell
                };
                cell.to_string()
            })
            .collect();

        match columns.first() {
            Some(first) if first == identity_column => {}
            Some(first) => {
                return Err(LedgerError::Malformed(format!(
                    "first column is {first:?}, expected identity column {identity_column:?}"
                )));
            }
            None => return Err(LedgerError::Malformed("empty header row".into())),
        }

        let mut column_index = FxHashMap::default();
        for (i, name) in columns.iter().enumerate() {
            if name.is_empty() {
                return Err(LedgerError::Malformed(format!("column {i} has no name")));
            }
            if name.trim() != name {
                return Err(LedgerError::Malformed(format!(
                    "column {i} name {name:?} has surrounding whitespace"
                )));
            }
            if column_index.insert(name.clone(), i).is_some() {
                return Err(LedgerError::Malformed(format!("duplicate column {name:?}")));
            }
        }

        let width = columns.len();
        let mut rows = Vec::new();
        let mut identities = FxHashMap::default();
        for (n, record) in records.enumerate() {
            let record = record?;
            // header is line 1
            let line = n + 2;
            if record.len() > width {
                return Err(LedgerError::Malformed(format!(
                    "line {line}: {} fields, header has {width}",
                    record.len()
                )));
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());

            if row[0].is_empty() {
                return Err(LedgerError::Malformed(format!("line {line}: empty identity")));
            }
            if identities.insert(row[0].clone(), rows.len()).is_some() {
                return Err(LedgerError::Malformed(format!(
                    "line {line}: duplicate identity {:?}",
                    row[0]
                )));
            }
            rows.push(row);
        }

        Ok(Self {
            columns,
            column_index,
            rows,
            identities,
        })
    }

    /// Write the full ledger to `path` via tmp file + rename.
    ///
    /// A crash at any point leaves either the previous snapshot or the new
    /// one on disk, never a truncated file.
    pub fn persist(&self, path: &Path) -> Result<(), LedgerError> {
        let tmp = tmp_path(path);
        let file = File::create(&tmp)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Serialize to CSV bytes (used for diffing snapshots)
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        let out = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(out)
    }

    /// Add `name` with empty values for every row. Returns `true` if it was added.
    pub fn ensure_column(&mut self, name: &str) -> Result<bool, LedgerError> {
        if name.trim().is_empty() || name.trim() != name || name == self.identity_column() {
            return Err(LedgerError::InvalidColumn(name.to_string()));
        }
        if self.column_index.contains_key(name) {
            return Ok(false);
        }
        self.column_index.insert(name.to_string(), self.columns.len());
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        log::debug!("Added column {name:?}");
        Ok(true)
    }

    /// Cell value; `None` for unknown column or row, `Some("")` when empty.
    pub fn get(&self, index: usize, column: &str) -> Option<&str> {
        let col = *self.column_index.get(column)?;
        self.rows.get(index).map(|row| row[col].as_str())
    }

    /// True when the cell exists and holds only whitespace
    pub fn is_blank(&self, index: usize, column: &str) -> bool {
        self.get(index, column).is_some_and(|v| v.trim().is_empty())
    }

    /// Overwrite one annotation cell in place.
    pub fn set(
        &mut self,
        index: usize,
        column: &str,
        value: impl Into<String>,
    ) -> Result<(), LedgerError> {
        let col = *self
            .column_index
            .get(column)
            .ok_or_else(|| LedgerError::UnknownColumn(column.to_string()))?;
        if col == 0 {
            return Err(LedgerError::InvalidColumn(column.to_string()));
        }
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(index)
            .ok_or(LedgerError::RowOutOfRange { index, len })?;
        row[col] = value.into();
        Ok(())
    }

    /// Append a row with empty annotations. Returns its index.
    pub fn push_row(&mut self, identity: &str) -> Result<usize, LedgerError> {
        if identity.is_empty() {
            return Err(LedgerError::Malformed("empty identity".into()));
        }
        if self.identities.contains_key(identity) {
            return Err(LedgerError::DuplicateIdentity(identity.to_string()));
        }
        let index = self.rows.len();
        let mut row = vec![String::new(); self.columns.len()];
        row[0] = identity.to_string();
        self.rows.push(row);
        self.identities.insert(identity.to_string(), index);
        Ok(index)
    }

    pub fn identity(&self, index: usize) -> Option<&str> {
        self.rows.get(index).map(|row| row[0].as_str())
    }

    pub fn index_of(&self, identity: &str) -> Option<usize> {
        self.identities.get(identity).copied()
    }

    pub fn identity_column(&self) -> &str {
        &self.columns[0]
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Clamp a requested `[start, end)` window to the ledger bounds
    pub fn clamp(&self, start: usize, end: Option<usize>) -> Range<usize> {
        let end = end.unwrap_or(self.rows.len()).min(self.rows.len());
        start.min(end)..end
    }

    /// Count filled and empty cells of `column`
    pub fn column_stats(&self, column: &str) -> Option<ColumnStats> {
        let col = *self.column_index.get(column)?;
        let mut stats = ColumnStats::default();
        for row in &self.rows {
            if row[col].trim().is_empty() {
                stats.empty += 1;
            } else {
                stats.filled += 1;
            }
        }
        Some(stats)
    }

    /// Smallest index in `window` whose `column` cell is blank
    pub fn first_empty(&self, column: &str, window: Range<usize>) -> Option<usize> {
        window.into_iter().find(|&i| self.is_blank(i, column))
    }
}
