pub mod cast;
pub mod cli;
pub mod commit;
pub mod csv_store;
pub mod hook;
pub mod io_utils;
pub mod mutate;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod report;
pub mod schema;
pub mod select;
pub mod value;

use std::{env, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    commit::Disposition,
    csv_store::{CsvCommitSink, CsvRecordSource},
    hook::HookOptions,
    pipeline::{Autocast, RunOutcome},
    provider::YamlSchemaProvider,
    schema::SheetSchema,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("autocast", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Cast(args) => handle_cast(&args),
        Commands::Fields(args) => handle_fields(&args),
    }
}

fn handle_cast(args: &cli::CastArgs) -> Result<()> {
    let options = HookOptions::new(args.chunk_size, args.parallel, args.debug)?;
    let input_encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let delimiter = io_utils::resolve_delimiter(Some(&args.input), args.delimiter);
    let output_delimiter = args.output_delimiter.unwrap_or(delimiter);
    let destination = args
        .output
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());
    info!(
        "Casting '{}' -> {} against {:?} (delimiter '{}')",
        args.input.display(),
        destination,
        args.schema,
        io_utils::printable_delimiter(delimiter)
    );

    let provider =
        Arc::new(YamlSchemaProvider::new().with_sheet(args.sheet_id.as_str(), &args.schema));
    let sink = Arc::new(
        CsvCommitSink::new(args.output.clone())
            .with_delimiter(output_delimiter)
            .with_encoding(output_encoding),
    );
    let source = CsvRecordSource::new(&args.input)
        .with_delimiter(delimiter)
        .with_encoding(input_encoding);

    let mut pipeline = Autocast::new(provider, sink)
        .with_fields(select::parse_field_filter(&args.fields))
        .with_options(options);
    if let Some(slug) = &args.sheet_slug {
        pipeline = pipeline.with_sheet_slug(slug.as_str());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    let (batch, outcome) = runtime.block_on(pipeline.run_from_source(&source, &args.sheet_id))?;

    let summary = match outcome {
        RunOutcome::SchemaUnavailable => {
            bail!(
                "Schema {:?} could not be loaded; no records were cast",
                args.schema
            )
        }
        RunOutcome::Ignored { slug } => {
            info!("Sheet slug '{slug}' not selected; nothing to do");
            return Ok(());
        }
        RunOutcome::Settled(summary) => summary,
    };

    for failure in &summary.execution.failures {
        warn!(
            "Chunk {} ({} record(s)) did not complete: {}",
            failure.index + 1,
            failure.records,
            failure.message
        );
    }
    match summary.disposition {
        Disposition::NoOp => info!("No records modified; {destination} not written"),
        Disposition::Committed(changes) => info!(
            "Committed {} changed cell(s) across {} record(s)",
            changes.cells_changed, changes.records_changed
        ),
    }

    let messages = csv_store::message_rows(&batch);
    if !messages.is_empty() {
        eprint!("{}", report::messages_table(&messages, args.max_messages));
    }
    if let Some(path) = &args.report {
        csv_store::write_message_report(&batch, path)?;
        info!("Wrote {} message(s) to {:?}", messages.len(), path);
    }
    Ok(())
}

fn handle_fields(args: &cli::FieldsArgs) -> Result<()> {
    let schema = SheetSchema::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    let allow = select::parse_field_filter(&args.fields);
    if let Some(keys) = allow.as_deref() {
        let unknown = select::unknown_keys(&schema, keys);
        if !unknown.is_empty() {
            warn!("Unknown field key(s): {}", unknown.join(", "));
        }
    }
    debug!("Allow-list: {:?}", allow);

    if schema.fields.is_empty() {
        info!("Schema {:?} does not declare any fields", args.schema);
        return Ok(());
    }
    print!("{}", report::fields_table(&schema, allow.as_deref()));
    let eligible = select::select_fields(&schema, allow.as_deref()).len();
    info!(
        "{} of {} field(s) on sheet '{}' would be cast",
        eligible,
        schema.fields.len(),
        schema.slug
    );
    Ok(())
}
