//! Change detection and the commit gate.
//!
//! A [`BatchSnapshot`] is taken before any handler runs. Once every chunk has
//! resolved, the gate diffs the batch against it: an unchanged batch is a
//! no-op and the sink is never called, otherwise the sink receives the full
//! batch exactly once.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use log::{info, log};
use serde::Serialize;
use thiserror::Error;

use crate::{
    provider::CommitSink,
    record::{Batch, Record, RecordId},
    value::Primitive,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Pending,
    Executing,
    NoOp,
    Committing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid batch transition from {from:?} to {to:?}")]
pub struct StateError {
    pub from: BatchState,
    pub to: BatchState,
}

impl BatchState {
    pub fn advance(self, to: BatchState) -> Result<BatchState, StateError> {
        use BatchState::*;
        match (self, to) {
            (Pending, Executing)
            | (Executing, NoOp)
            | (Executing, Committing)
            | (NoOp, Done)
            | (Committing, Done) => Ok(to),
            (from, to) => Err(StateError { from, to }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub records_changed: usize,
    pub cells_changed: usize,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.cells_changed == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Disposition {
    NoOp,
    Committed(ChangeSummary),
}

type CellValues = BTreeMap<String, Option<Primitive>>;

#[derive(Debug, Clone, Default)]
pub struct BatchSnapshot {
    records: HashMap<RecordId, CellValues>,
}

impl BatchSnapshot {
    pub fn capture(batch: &Batch) -> Self {
        let records = batch
            .records
            .iter()
            .map(|record| (record.id(), cell_values(record)))
            .collect();
        Self { records }
    }

    pub fn diff(&self, batch: &Batch) -> ChangeSummary {
        let empty = CellValues::new();
        let mut summary = ChangeSummary::default();
        for record in &batch.records {
            let before = self.records.get(&record.id()).unwrap_or(&empty);
            let after = cell_values(record);
            let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
            let changed = keys
                .into_iter()
                .filter(|key| value_of(before, key) != value_of(&after, key))
                .count();
            if changed > 0 {
                summary.records_changed += 1;
                summary.cells_changed += changed;
            }
        }
        summary
    }
}

fn cell_values(record: &Record) -> CellValues {
    record
        .cells()
        .iter()
        .map(|cell| (cell.key.clone(), cell.value.clone()))
        .collect()
}

fn value_of<'a>(values: &'a CellValues, key: &str) -> Option<&'a Primitive> {
    values.get(key).and_then(Option::as_ref)
}

/// Tracks one batch through `Pending → Executing → {NoOp | Committing} → Done`.
#[derive(Debug)]
pub struct CommitGate {
    state: BatchState,
    debug: bool,
}

impl CommitGate {
    pub fn new(debug: bool) -> Self {
        Self {
            state: BatchState::Pending,
            debug,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn begin(&mut self) -> Result<(), StateError> {
        self.state = self.state.advance(BatchState::Executing)?;
        Ok(())
    }

    pub async fn settle(
        &mut self,
        batch: &Batch,
        snapshot: &BatchSnapshot,
        sink: &dyn CommitSink,
    ) -> Result<Disposition> {
        let summary = snapshot.diff(batch);
        if summary.is_empty() {
            self.state = self.state.advance(BatchState::NoOp)?;
            let level = if self.debug {
                log::Level::Info
            } else {
                log::Level::Debug
            };
            log!(level, "No records modified");
            self.state = self.state.advance(BatchState::Done)?;
            return Ok(Disposition::NoOp);
        }

        self.state = self.state.advance(BatchState::Committing)?;
        info!(
            "Committing sheet '{}': {} cell(s) changed across {} record(s)",
            batch.sheet_id, summary.cells_changed, summary.records_changed
        );
        sink.commit(batch)
            .await
            .with_context(|| format!("Committing batch for sheet '{}'", batch.sheet_id))?;
        self.state = self.state.advance(BatchState::Done)?;
        Ok(Disposition::Committed(summary))
    }
}
