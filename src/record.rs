//! Records and batches handed to the pipeline by a record source.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::value::{Cell, Message, Primitive, Severity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row: ordered cells keyed by field, plus free-form metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    id: RecordId,
    cells: Vec<Cell>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, JsonValue>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            cells: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builds a record from `(key, value)` pairs. Keys stay unique: a repeated
    /// key keeps its first position and takes the later value.
    pub fn from_values<K, I>(id: RecordId, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Option<Primitive>)>,
    {
        let mut record = Self::new(id);
        for (key, value) in values {
            let key = key.into();
            record.cell_mut(&key).value = value;
        }
        record
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, key: &str) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.key == key)
    }

    /// Current value of `key`; `None` when the key is absent or holds no value.
    pub fn get(&self, key: &str) -> Option<&Primitive> {
        self.cell(key).and_then(|cell| cell.value.as_ref())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Primitive>) {
        self.cell_mut(key).value = Some(value.into());
    }

    /// Drops the value of `key`, leaving the cell and its messages in place.
    pub fn unset(&mut self, key: &str) {
        if let Some(cell) = self.cells.iter_mut().find(|cell| cell.key == key) {
            cell.value = None;
        }
    }

    /// Replaces the value of `key` with `f(value)` when a non-null value is present.
    pub fn compute_if_present<F>(&mut self, key: &str, f: F)
    where
        F: FnOnce(&Primitive) -> Primitive,
    {
        if let Some(cell) = self.cells.iter_mut().find(|cell| cell.key == key)
            && let Some(current) = cell.value.as_ref().filter(|value| !value.is_null())
        {
            cell.value = Some(f(current));
        }
    }

    pub fn add_error(&mut self, key: &str, text: impl Into<String>) {
        self.add_message(key, text, Severity::Error);
    }

    pub fn add_warning(&mut self, key: &str, text: impl Into<String>) {
        self.add_message(key, text, Severity::Warn);
    }

    pub fn add_info(&mut self, key: &str, text: impl Into<String>) {
        self.add_message(key, text, Severity::Info);
    }

    pub fn add_message(&mut self, key: &str, text: impl Into<String>, severity: Severity) {
        let message = Message {
            field: key.to_string(),
            text: text.into(),
            severity,
        };
        self.cell_mut(key).messages.push(message);
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.cells.iter().flat_map(|cell| cell.messages.iter())
    }

    pub fn has_errors(&self) -> bool {
        self.cells.iter().any(Cell::has_errors)
    }

    pub fn metadata(&self) -> &BTreeMap<String, JsonValue> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: BTreeMap<String, JsonValue>) {
        self.metadata = metadata;
    }

    fn cell_mut(&mut self, key: &str) -> &mut Cell {
        let idx = match self.cells.iter().position(|cell| cell.key == key) {
            Some(idx) => idx,
            None => {
                self.cells.push(Cell::new(key, None));
                self.cells.len() - 1
            }
        };
        &mut self.cells[idx]
    }
}

/// The records of one pipeline run, all cast against the same sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub sheet_id: String,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn new(sheet_id: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn message_count(&self) -> usize {
        self.records.iter().map(|record| record.messages().count()).sum()
    }
}
