//! Boundary traits for the collaborators around the pipeline, plus the
//! in-process implementations used by the CLI and tests.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use crate::{record::Batch, schema::SheetSchema};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Schema for sheet '{sheet_id}' is unavailable: {reason}")]
pub struct SchemaUnavailable {
    pub sheet_id: String,
    pub reason: String,
}

impl SchemaUnavailable {
    pub fn new(sheet_id: &str, reason: impl Into<String>) -> Self {
        Self {
            sheet_id: sheet_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn get_schema(&self, sheet_id: &str) -> Result<SheetSchema, SchemaUnavailable>;
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_batch(&self, sheet_id: &str) -> Result<Batch>;
}

#[async_trait]
pub trait CommitSink: Send + Sync {
    async fn commit(&self, batch: &Batch) -> Result<()>;
}

/// Schemas held in memory, keyed by sheet id.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    schemas: BTreeMap<String, SheetSchema>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet_id: impl Into<String>, schema: SheetSchema) -> Self {
        self.schemas.insert(sheet_id.into(), schema);
        self
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn get_schema(&self, sheet_id: &str) -> Result<SheetSchema, SchemaUnavailable> {
        self.schemas
            .get(sheet_id)
            .cloned()
            .ok_or_else(|| SchemaUnavailable::new(sheet_id, "sheet not found"))
    }
}

/// Schemas loaded from YAML files on each request.
#[derive(Debug, Clone, Default)]
pub struct YamlSchemaProvider {
    paths: BTreeMap<String, PathBuf>,
}

impl YamlSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.paths
            .insert(sheet_id.into(), path.as_ref().to_path_buf());
        self
    }
}

#[async_trait]
impl SchemaProvider for YamlSchemaProvider {
    async fn get_schema(&self, sheet_id: &str) -> Result<SheetSchema, SchemaUnavailable> {
        let path = self
            .paths
            .get(sheet_id)
            .ok_or_else(|| SchemaUnavailable::new(sheet_id, "no schema file registered"))?;
        debug!("Loading schema for sheet '{}' from {:?}", sheet_id, path);
        SheetSchema::load(path).map_err(|err| SchemaUnavailable::new(sheet_id, format!("{err:#}")))
    }
}

/// Hands out a fixed batch per sheet id.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    batches: BTreeMap<String, Batch>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(mut self, batch: Batch) -> Self {
        self.batches.insert(batch.sheet_id.clone(), batch);
        self
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_batch(&self, sheet_id: &str) -> Result<Batch> {
        self.batches
            .get(sheet_id)
            .cloned()
            .ok_or_else(|| anyhow!("No records available for sheet '{sheet_id}'"))
    }
}

/// Keeps every committed batch; handy for asserting on commit behaviour.
#[derive(Debug, Default)]
pub struct MemorySink {
    commits: Mutex<Vec<Batch>>,
}

impl MemorySink {
    pub fn commits(&self) -> Vec<Batch> {
        self.commits
            .lock()
            .map(|commits| commits.clone())
            .unwrap_or_default()
    }

    pub fn commit_count(&self) -> usize {
        self.commits
            .lock()
            .map(|commits| commits.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommitSink for MemorySink {
    async fn commit(&self, batch: &Batch) -> Result<()> {
        self.commits
            .lock()
            .map_err(|_| anyhow!("Commit log lock poisoned"))?
            .push(batch.clone());
        Ok(())
    }
}
