//! CSV-backed record source and commit sink.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use log::info;
use serde::Serialize;

use crate::{
    io_utils,
    provider::{CommitSink, RecordSource},
    record::{Batch, Record, RecordId},
    value::{Primitive, Severity},
};

/// Reads every row of a CSV file into one batch. Headers become field keys,
/// blank cells become absent values and record ids are 1-based row numbers.
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvRecordSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let delimiter = io_utils::resolve_delimiter(Some(&path), None);
        Self {
            path,
            delimiter,
            encoding: UTF_8,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn read_batch(&self, sheet_id: &str) -> Result<Batch> {
        let mut reader = io_utils::open_csv_reader(&self.path, self.delimiter)?;
        let header_record = reader
            .byte_headers()
            .with_context(|| format!("Reading headers from {:?}", self.path))?
            .clone();
        let headers = io_utils::decode_record(&header_record, self.encoding)?;
        if let Some(repeated) = first_repeated(&headers) {
            bail!(
                "Header '{repeated}' appears more than once in {:?}",
                self.path
            );
        }

        let mut records = Vec::new();
        for (idx, row) in reader.byte_records().enumerate() {
            let row = row.with_context(|| format!("Reading row {} in {:?}", idx + 2, self.path))?;
            let values = io_utils::decode_record(&row, self.encoding)
                .with_context(|| format!("Decoding row {} in {:?}", idx + 2, self.path))?;
            let cells = headers.iter().zip(values).map(|(key, value)| {
                let value = if value.is_empty() {
                    None
                } else {
                    Some(Primitive::String(value))
                };
                (key.clone(), value)
            });
            records.push(Record::from_values(RecordId(idx as u64 + 1), cells));
        }
        info!(
            "Read {} record(s) with {} field(s) from {:?}",
            records.len(),
            headers.len(),
            self.path
        );
        Ok(Batch::new(sheet_id, records))
    }
}

fn first_repeated(headers: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .find(|header| !seen.insert(header.as_str()))
        .map(String::as_str)
}

#[async_trait]
impl RecordSource for CsvRecordSource {
    async fn fetch_batch(&self, sheet_id: &str) -> Result<Batch> {
        self.read_batch(sheet_id)
    }
}

/// Writes a committed batch back out as CSV.
#[derive(Debug, Clone)]
pub struct CsvCommitSink {
    output: Option<PathBuf>,
    delimiter: u8,
    encoding: &'static Encoding,
    headers: Option<Vec<String>>,
}

impl CsvCommitSink {
    /// `None` writes to stdout.
    pub fn new(output: Option<PathBuf>) -> Self {
        let delimiter = io_utils::resolve_delimiter(output.as_deref(), None);
        Self {
            output,
            delimiter,
            encoding: UTF_8,
            headers: None,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Fixes the column order; keys not listed are appended in first-seen order.
    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn render(&self, batch: &Batch) -> Result<String> {
        let headers = self.resolve_headers(batch);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());
        writer
            .write_record(&headers)
            .context("Writing output headers")?;
        for record in &batch.records {
            let row = headers.iter().map(|key| {
                record
                    .get(key)
                    .map(Primitive::as_display)
                    .unwrap_or_default()
            });
            writer
                .write_record(row)
                .with_context(|| format!("Writing record {}", record.id()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow!("Flushing CSV output: {}", err.error()))?;
        String::from_utf8(bytes).context("CSV output is not valid UTF-8")
    }

    fn resolve_headers(&self, batch: &Batch) -> Vec<String> {
        let mut headers = self.headers.clone().unwrap_or_default();
        for record in &batch.records {
            for cell in record.cells() {
                if !headers.contains(&cell.key) {
                    headers.push(cell.key.clone());
                }
            }
        }
        headers
    }
}

#[async_trait]
impl CommitSink for CsvCommitSink {
    async fn commit(&self, batch: &Batch) -> Result<()> {
        let rendered = self.render(batch)?;
        io_utils::write_encoded(self.output.as_deref(), &rendered, self.encoding)?;
        info!(
            "Wrote {} record(s) -> {}",
            batch.len(),
            self.output
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "stdout".to_string())
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRow {
    pub record: RecordId,
    pub field: String,
    pub severity: Severity,
    pub text: String,
}

pub fn message_rows(batch: &Batch) -> Vec<MessageRow> {
    batch
        .records
        .iter()
        .flat_map(|record| {
            record.messages().map(move |message| MessageRow {
                record: record.id(),
                field: message.field.clone(),
                severity: message.severity,
                text: message.text.clone(),
            })
        })
        .collect()
}

pub fn write_message_report(batch: &Batch, path: &Path) -> Result<()> {
    let rows = message_rows(batch);
    let rendered =
        serde_json::to_string_pretty(&rows).context("Serializing message report to JSON")?;
    io_utils::write_encoded(Some(path), &rendered, UTF_8)
        .with_context(|| format!("Writing message report {path:?}"))
}
