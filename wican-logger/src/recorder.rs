//! Dynamic-schema CSV recorder
//!
//! The device decides which parameters it reports, and may start reporting
//! new ones at any point. The recorder keeps the union of every key seen so
//! far (first-seen order) and guarantees that the file on disk always has:
//! - a header equal to `timestamp` + that union
//! - exactly one field per header column on every row
//!
//! When the union grows, the whole file is rewritten into a temp file next to
//! it and renamed over the existing file, then the new row is appended. Rows are
//! appended as one complete line per write, so an interrupted session leaves
//! a readable file.

use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::record::{Record, TIMESTAMP_COLUMN};

/// Storage failures; always fatal for the session
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read or encode CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to replace {} with rewritten store: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// Ordered set of every parameter name seen this session
#[derive(Debug, Clone, Default)]
pub struct SchemaUnion {
    columns: Vec<String>,
    known: HashSet<String>,
}

impl SchemaUnion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of `record` not yet in the union, in record order
    pub fn missing<'a>(&self, record: &'a Record) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        record
            .keys()
            .filter(|key| !self.known.contains(*key) && seen.insert(*key))
            .collect()
    }

    /// Append unseen keys; returns how many were added
    pub fn extend<I, S>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.columns.len();
        for key in keys {
            let key = key.into();
            if self.known.insert(key.clone()) {
                self.columns.push(key);
            }
        }
        self.columns.len() - before
    }

    pub fn contains(&self, key: &str) -> bool {
        self.known.contains(key)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// What happened to one recorded row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// 1-based row number in the store
    pub row: usize,
    pub new_columns: Vec<String>,
    pub reconciled: bool,
}

/// Owner of the CSV store; single writer
pub struct Recorder {
    path: PathBuf,
    union: SchemaUnion,
    rows: usize,
    /// Header width currently on disk, `None` until the file exists
    persisted_width: Option<usize>,
}

impl Recorder {
    /// Store named `<prefix>_<YYYYmmdd_HHMMSS>.csv` inside `directory`
    pub fn new(directory: &Path, prefix: &str, started_at: DateTime<Local>) -> Self {
        let file_name = format!("{}_{}.csv", prefix, started_at.format("%Y%m%d_%H%M%S"));
        Self::at_path(directory.join(file_name))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            union: SchemaUnion::new(),
            rows: 0,
            persisted_width: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn union(&self) -> &SchemaUnion {
        &self.union
    }

    /// Full header: `timestamp` followed by the union
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(TIMESTAMP_COLUMN)
            .chain(self.union.columns().iter().map(String::as_str))
            .collect()
    }

    /// Persist one record, growing the schema first if needed
    pub fn record(&mut self, record: &Record) -> Result<RecordOutcome, StoreError> {
        // Keys first seen in the same record enter the union sorted
        let mut new_columns: Vec<String> = self
            .union
            .missing(record)
            .into_iter()
            .map(str::to_string)
            .collect();
        new_columns.sort();
        self.union.extend(new_columns.iter().cloned());

        let reconciled = self.reconcile()?;
        self.append(record)?;
        self.rows += 1;

        if !new_columns.is_empty() {
            if self.rows == 1 {
                info!("Initial fields: {} parameters", self.union.len());
            } else {
                info!("[+] New fields: {:?}", new_columns);
            }
        }

        Ok(RecordOutcome {
            row: self.rows,
            new_columns,
            reconciled,
        })
    }

    /// Bring the file's header and rows in line with the union.
    /// Returns `false` without touching the disk when already consistent.
    pub fn reconcile(&mut self) -> Result<bool, StoreError> {
        let width = self.union.len() + 1;
        if self.persisted_width == Some(width) {
            return Ok(false);
        }

        self.write_snapshot()?;
        debug!(
            "Store {} rewritten with {} columns ({} rows)",
            self.path.display(),
            width,
            self.rows
        );
        self.persisted_width = Some(width);
        Ok(true)
    }

    fn write_snapshot(&self) -> Result<(), StoreError> {
        let header = self.header();
        let width = header.len();

        let mut staged = NamedTempFile::new_in(self.directory()).map_err(|e| self.io_error(e))?;
        {
            let mut writer = csv::Writer::from_writer(staged.as_file_mut());
            writer
                .write_record(&header)
                .map_err(|e| self.csv_error(e))?;

            if self.persisted_width.is_some() {
                let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.csv_error(e))?;
                for row in reader.records() {
                    let row = row.map_err(|e| self.csv_error(e))?;
                    let mut cells: Vec<&str> = row.iter().collect();
                    cells.resize(width, "");
                    writer.write_record(&cells).map_err(|e| self.csv_error(e))?;
                }
            }

            writer.flush().map_err(|e| self.io_error(e))?;
        }

        staged.as_file().sync_all().map_err(|e| self.io_error(e))?;
        staged.persist(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    fn append(&self, record: &Record) -> Result<(), StoreError> {
        let mut cells = Vec::with_capacity(self.union.len() + 1);
        cells.push(record.timestamp());
        for column in self.union.columns() {
            cells.push(record.get(column).map(|v| v.to_string()).unwrap_or_default());
        }

        let mut line = csv::Writer::from_writer(Vec::new());
        line.write_record(&cells).map_err(|e| self.csv_error(e))?;
        let bytes = line
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(&bytes).map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}
