//! The autocast pipeline: schema → field selection → chunked casting →
//! change detection → commit.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    commit::{BatchSnapshot, CommitGate, Disposition},
    hook::{ChunkHandler, ExecutionReport, HookOptions, execute_chunks},
    mutate::{CastFields, CastTally},
    provider::{CommitSink, RecordSource, SchemaProvider},
    record::Batch,
    select::{select_fields, unknown_keys},
};

/// Matches every sheet slug when used as the slug filter.
pub const ANY_SHEET: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRun {
    pub disposition: Disposition,
    pub execution: ExecutionReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastSummary {
    pub disposition: Disposition,
    pub execution: ExecutionReport,
    pub tally: CastTally,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The schema could not be fetched; the batch was not touched.
    SchemaUnavailable,
    /// The sheet's slug did not match the configured slug filter.
    Ignored { slug: String },
    Settled(CastSummary),
}

/// Runs `handler` over `batch` and commits through `sink` only if a value changed.
pub async fn run_hook(
    batch: &mut Batch,
    handler: &dyn ChunkHandler,
    options: &HookOptions,
    sink: &dyn CommitSink,
) -> Result<HookRun> {
    options.validate()?;
    let mut gate = CommitGate::new(options.debug);
    let snapshot = BatchSnapshot::capture(batch);
    gate.begin()?;
    let execution = execute_chunks(batch, handler, options).await;
    let disposition = gate.settle(batch, &snapshot, sink).await?;
    Ok(HookRun {
        disposition,
        execution,
    })
}

pub struct Autocast {
    provider: Arc<dyn SchemaProvider>,
    sink: Arc<dyn CommitSink>,
    fields: Option<Vec<String>>,
    sheet_slug: Option<String>,
    options: HookOptions,
}

impl Autocast {
    pub fn new(provider: Arc<dyn SchemaProvider>, sink: Arc<dyn CommitSink>) -> Self {
        Self {
            provider,
            sink,
            fields: None,
            sheet_slug: None,
            options: HookOptions::default(),
        }
    }

    /// Restricts casting to these keys, string fields included.
    pub fn with_fields(mut self, fields: Option<Vec<String>>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_sheet_slug(mut self, slug: impl Into<String>) -> Self {
        self.sheet_slug = Some(slug.into());
        self
    }

    pub fn with_options(mut self, options: HookOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &HookOptions {
        &self.options
    }

    pub async fn run(&self, batch: &mut Batch) -> Result<RunOutcome> {
        let schema = match self.provider.get_schema(&batch.sheet_id).await {
            Ok(schema) => schema,
            Err(err) => {
                warn!("Failed to fetch sheet: {err}");
                return Ok(RunOutcome::SchemaUnavailable);
            }
        };

        if let Some(expected) = self.sheet_slug.as_deref()
            && expected != ANY_SHEET
            && expected != schema.slug
        {
            info!(
                "Skipping sheet '{}': slug '{}' does not match '{}'",
                batch.sheet_id, schema.slug, expected
            );
            return Ok(RunOutcome::Ignored { slug: schema.slug });
        }

        if let Some(allow) = self.fields.as_deref() {
            let unknown = unknown_keys(&schema, allow);
            if !unknown.is_empty() {
                warn!(
                    "Ignoring field(s) not declared on sheet '{}': {}",
                    schema.slug,
                    unknown.join(", ")
                );
            }
        }

        let eligible = select_fields(&schema, self.fields.as_deref())
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        let field_keys = eligible
            .iter()
            .map(|field| field.key.clone())
            .collect::<Vec<_>>();
        info!(
            "Casting {} field(s) on sheet '{}': {}",
            field_keys.len(),
            schema.slug,
            field_keys.join(", ")
        );

        let handler = CastFields::new(eligible);
        let run = run_hook(batch, &handler, &self.options, self.sink.as_ref())
            .await
            .with_context(|| format!("Casting sheet '{}'", batch.sheet_id))?;
        let tally = handler.tally()?;
        info!(
            "Cast {} cell(s), {} failed, {} skipped",
            tally.cast, tally.failed, tally.skipped
        );

        Ok(RunOutcome::Settled(CastSummary {
            disposition: run.disposition,
            execution: run.execution,
            tally,
            fields: field_keys,
        }))
    }

    pub async fn run_from_source(
        &self,
        source: &dyn RecordSource,
        sheet_id: &str,
    ) -> Result<(Batch, RunOutcome)> {
        let mut batch = source
            .fetch_batch(sheet_id)
            .await
            .with_context(|| format!("Fetching records for sheet '{sheet_id}'"))?;
        let outcome = self.run(&mut batch).await?;
        Ok((batch, outcome))
    }
}
