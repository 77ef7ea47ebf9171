//! Tabular dataset model and the on-disk partition layout.
//!
//! A dataset partition on disk is a schema document (`schema.json`) plus
//! one tabular data file (`data.csv`). The splitter writes two such
//! layouts per split, train and test, under a content-hashed directory
//! name. Delimiter handling here is deliberately naive; full CSV/Parquet
//! fidelity belongs to the serialization layer outside this subsystem.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const SCHEMA_FILE: &str = "schema.json";
const DATA_FILE: &str = "data.csv";

/// An in-memory tabular dataset: one header row plus data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// Number of data rows, excluding the header.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|c| c == name)
    }

    /// A copy of this table holding only the given rows.
    pub fn with_rows(&self, rows: Vec<Vec<String>>) -> Self {
        Self {
            header: self.header.clone(),
            rows,
        }
    }
}

/// The schema document written alongside each partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDoc {
    pub columns: Vec<String>,
    pub row_count: usize,
}

/// One dataset partition on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    dir: PathBuf,
}

impl DatasetLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the tabular data file, used as a dataset URI by callers.
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    /// `true` when both the schema document and the data file exist.
    pub fn exists(&self) -> bool {
        self.dir.join(SCHEMA_FILE).is_file() && self.dir.join(DATA_FILE).is_file()
    }

    /// Write a table as this partition, creating the directory.
    pub fn write(&self, table: &TableData) -> CoreResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let schema = SchemaDoc {
            columns: table.header.clone(),
            row_count: table.rows.len(),
        };
        let schema_json = serde_json::to_vec_pretty(&schema)?;
        std::fs::write(self.dir.join(SCHEMA_FILE), schema_json)?;

        let mut out = String::new();
        out.push_str(&table.header.join(","));
        out.push('\n');
        for row in &table.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        std::fs::write(self.dir.join(DATA_FILE), out)?;
        Ok(())
    }

    /// Read this partition back into a table.
    pub fn read(&self) -> CoreResult<TableData> {
        let content = std::fs::read_to_string(self.data_path())?;
        let mut lines = content.lines();
        let header: Vec<String> = lines
            .next()
            .ok_or_else(|| CoreError::Split(format!("empty data file in {}", self.dir.display())))?
            .split(',')
            .map(str::to_string)
            .collect();
        let rows = lines
            .map(|l| l.split(',').map(str::to_string).collect())
            .collect();
        Ok(TableData::new(header, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_table() -> TableData {
        TableData::new(
            vec!["id".into(), "value".into()],
            vec![
                vec!["0".into(), "a".into()],
                vec!["1".into(), "b".into()],
            ],
        )
    }

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path().join("train"));
        let table = sample_table();

        assert!(!layout.exists());
        layout.write(&table).unwrap();
        assert!(layout.exists());

        let back = layout.read().unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_column_index() {
        let table = sample_table();
        assert_eq!(table.column_index("value"), Some(1));
        assert_eq!(table.column_index("missing"), None);
    }
}
