/*!
Test harness for logger sessions

Provides a scratch output directory and CSV read-back so tests can assert on
what actually reached the disk.
*/

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory for one test
pub struct TestHarness {
    dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        env_logger::try_init().ok();

        let dir = tempfile::tempdir().context("Failed to create scratch directory")?;
        log::info!("📁 Test harness at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// CSV files currently in the scratch directory, sorted by name
    pub fn csv_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.dir.path())? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("csv") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Exactly one CSV must exist; read it back
    pub fn single_csv(&self) -> Result<CsvSnapshot> {
        let files = self.csv_files()?;
        match files.as_slice() {
            [only] => CsvSnapshot::read(only),
            _ => bail!("Expected exactly one CSV in {}, found {}", self.path().display(), files.len()),
        }
    }
}

/// Parsed view of a CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSnapshot {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvSnapshot {
    /// Read a CSV file; ragged rows are kept as-is so they can be asserted on
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let header = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        Ok(Self { header, rows })
    }

    /// Every row must be exactly as wide as the header
    pub fn assert_rectangular(&self) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.header.len() {
                bail!(
                    "Row {} has {} fields, header has {}",
                    i + 1,
                    row.len(),
                    self.header.len()
                );
            }
        }
        Ok(())
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.header.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_detects_ragged_rows() {
        let harness = TestHarness::new().unwrap();
        let path = harness.path().join("ragged.csv");
        std::fs::write(&path, "timestamp,A,B\nt1,1\nt2,2,5\n").unwrap();

        let snapshot = harness.single_csv().unwrap();
        assert_eq!(snapshot.header, vec!["timestamp", "A", "B"]);
        assert!(snapshot.assert_rectangular().is_err());
        assert_eq!(snapshot.column("B").unwrap(), vec!["", "5"]);
    }

    #[test]
    fn test_single_csv_requires_one_file() {
        let harness = TestHarness::new().unwrap();
        assert!(harness.single_csv().is_err());
    }
}
