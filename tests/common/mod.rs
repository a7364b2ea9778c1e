#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use autocast::record::{Batch, Record, RecordId};
use autocast::schema::{FieldDecl, FieldType, SheetSchema};
use autocast::value::Primitive;
use tempfile::{TempDir, tempdir};

pub const CONTACTS_YAML: &str = "\
slug: contacts
fields:
  - key: firstName
    type: string
  - key: age
    type: number
  - key: alive
    type: boolean
  - key: joined
    type: date
  - key: category
    type: enum
";

pub fn contacts_schema() -> SheetSchema {
    SheetSchema::new(
        "contacts",
        vec![
            FieldDecl::new("firstName", FieldType::String),
            FieldDecl::new("age", FieldType::Number),
            FieldDecl::new("alive", FieldType::Boolean),
            FieldDecl::new("joined", FieldType::Date),
            FieldDecl::new("category", FieldType::Enum),
        ],
    )
}

/// Builds a record from `(key, raw text)` pairs; empty text means absent.
pub fn text_record(id: u64, values: &[(&str, &str)]) -> Record {
    Record::from_values(
        RecordId(id),
        values.iter().map(|(key, raw)| {
            let value = if raw.is_empty() {
                None
            } else {
                Some(Primitive::from(*raw))
            };
            (key.to_string(), value)
        }),
    )
}

pub fn contacts_batch(sheet_id: &str) -> Batch {
    Batch::new(
        sheet_id,
        vec![
            text_record(
                1,
                &[
                    ("firstName", "John"),
                    ("age", "1,234"),
                    ("alive", "YES"),
                    ("joined", "0"),
                    ("category", "one"),
                ],
            ),
            text_record(
                2,
                &[
                    ("firstName", "Jane"),
                    ("age", "abc"),
                    ("alive", "maybe"),
                    ("joined", "2024-05-06"),
                    ("category", "two"),
                ],
            ),
            text_record(
                3,
                &[
                    ("firstName", "Jim"),
                    ("age", ""),
                    ("alive", "off"),
                    ("joined", "not-a-date"),
                    ("category", ""),
                ],
            ),
        ],
    )
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}
