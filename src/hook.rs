//! Chunked execution of record handlers over a batch.
//!
//! The batch is split into ordered chunks of at most `chunk_size` records and
//! up to `parallel` chunk futures are driven at once. Each chunk borrows a
//! disjoint slice of the batch, so handlers mutate records in place without
//! locking. A handler error or panic is contained to its chunk: it is logged
//! and reported, and the remaining chunks still run.

use std::{any::Any, panic::AssertUnwindSafe};

use anyhow::Result;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt, stream};
use log::{Level, debug, error, log};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{Batch, Record};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_PARALLEL: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("Chunk size must be at least 1")]
    ChunkSize,
    #[error("Parallel chunk count must be at least 1")]
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOptions {
    pub chunk_size: usize,
    pub parallel: usize,
    /// Promote per-chunk and no-op diagnostics from `debug` to `info`.
    pub debug: bool,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: DEFAULT_PARALLEL,
            debug: false,
        }
    }
}

impl HookOptions {
    pub fn new(chunk_size: usize, parallel: usize, debug: bool) -> Result<Self, OptionsError> {
        let options = Self {
            chunk_size,
            parallel,
            debug,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.chunk_size == 0 {
            return Err(OptionsError::ChunkSize);
        }
        if self.parallel == 0 {
            return Err(OptionsError::Parallel);
        }
        Ok(())
    }

    pub(crate) fn diagnostic_level(&self) -> Level {
        if self.debug { Level::Info } else { Level::Debug }
    }
}

/// Work applied to one chunk of records.
#[async_trait]
pub trait ChunkHandler: Send + Sync {
    async fn handle(&self, records: &mut [Record]) -> Result<()>;
}

/// Runs a closure on each record of a chunk; the first error ends the chunk.
pub struct RecordHook<F> {
    handler: F,
}

impl<F> RecordHook<F>
where
    F: Fn(&mut Record) -> Result<()> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> ChunkHandler for RecordHook<F>
where
    F: Fn(&mut Record) -> Result<()> + Send + Sync,
{
    async fn handle(&self, records: &mut [Record]) -> Result<()> {
        for record in records.iter_mut() {
            (self.handler)(record)?;
        }
        Ok(())
    }
}

/// Runs a closure on a whole chunk at once.
pub struct BulkRecordHook<F> {
    handler: F,
}

impl<F> BulkRecordHook<F>
where
    F: Fn(&mut [Record]) -> Result<()> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> ChunkHandler for BulkRecordHook<F>
where
    F: Fn(&mut [Record]) -> Result<()> + Send + Sync,
{
    async fn handle(&self, records: &mut [Record]) -> Result<()> {
        (self.handler)(records)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub records: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub chunks: usize,
    pub records: usize,
    pub failures: Vec<ChunkFailure>,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub async fn execute_chunks(
    batch: &mut Batch,
    handler: &dyn ChunkHandler,
    options: &HookOptions,
) -> ExecutionReport {
    let chunk_size = options.chunk_size.max(1);
    let parallel = options.parallel.max(1);
    let records = batch.records.len();
    let chunks = records.div_ceil(chunk_size);
    let level = options.diagnostic_level();

    log!(
        level,
        "Processing {} record(s) of sheet '{}' in {} chunk(s) (chunk_size={}, parallel={})",
        records,
        batch.sheet_id,
        chunks,
        chunk_size,
        parallel
    );

    let results: Vec<Option<ChunkFailure>> =
        stream::iter(batch.records.chunks_mut(chunk_size).enumerate())
            .map(move |(index, chunk)| async move {
                let size = chunk.len();
                debug!("Starting chunk {} / {} ({} record(s))", index + 1, chunks, size);
                let outcome = AssertUnwindSafe(handler.handle(chunk)).catch_unwind().await;
                let message = match outcome {
                    Ok(Ok(())) => {
                        log!(level, "Completed chunk {} / {}", index + 1, chunks);
                        return None;
                    }
                    Ok(Err(err)) => format!("{err:#}"),
                    Err(panic) => panic_message(panic.as_ref()),
                };
                error!("An error occurred while running the handler: {message}");
                Some(ChunkFailure {
                    index,
                    records: size,
                    message,
                })
            })
            .buffer_unordered(parallel)
            .collect()
            .await;

    let mut failures: Vec<ChunkFailure> = results.into_iter().flatten().collect();
    failures.sort_by_key(|failure| failure.index);

    ExecutionReport {
        chunks,
        records,
        failures,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
