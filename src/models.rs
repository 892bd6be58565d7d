//! Core data models used throughout the ingestion pipeline.
//!
//! The parser produces a [`TableRegistry`] of [`TableBlock`]s; the
//! orchestrator turns each block into rows stamped with the file id of a
//! [`FileMetadata`] record.

use serde::Serialize;
use std::collections::HashMap;

/// Sanitized column name to its zero-based position in the raw `%F` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    positions: Vec<(String, usize)>,
}

impl ColumnMapping {
    pub fn new(columns: &[String]) -> Self {
        Self {
            positions: columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), i))
                .collect(),
        }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, i)| *i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.positions.iter().map(|(n, i)| (n.as_str(), *i))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// One data row, as ordered `(column, value)` pairs in column order.
///
/// Empty input values are stored as `None`, never as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    pub fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A `%T` table section of an XER file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableBlock {
    pub name: String,
    pub columns: Vec<String>,
    pub mapping: ColumnMapping,
    pub records: Vec<Record>,
}

impl TableBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Tables parsed from one file, in order of first appearance.
///
/// Re-opening a table name replaces the earlier block in place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableRegistry {
    tables: Vec<TableBlock>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh block for `name` and return its slot.
    pub fn open(&mut self, name: &str) -> usize {
        match self.index.get(name) {
            Some(&slot) => {
                self.tables[slot] = TableBlock::new(name);
                slot
            }
            None => {
                self.tables.push(TableBlock::new(name));
                let slot = self.tables.len() - 1;
                self.index.insert(name.to_string(), slot);
                slot
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TableBlock> {
        self.index.get(name).map(|&slot| &self.tables[slot])
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> &mut TableBlock {
        &mut self.tables[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableBlock> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }
}

/// One row of the `file_metadata` table, as derived from a file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub project_name: Option<String>,
    pub project_id: Option<i64>,
    /// `YYYY-MM-DD HH:MM:SS`
    pub snapshot_date: Option<String>,
    pub file_category: Option<String>,
    pub bl_version: Option<String>,
}
