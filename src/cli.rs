use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::hook::{DEFAULT_CHUNK_SIZE, DEFAULT_PARALLEL};

#[derive(Debug, Parser)]
#[command(author, version, about = "Cast CSV records to the types declared by a sheet schema", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Cast records to their declared types and write them out if anything changed
    Cast(CastArgs),
    /// List the fields of a sheet schema and whether they would be cast
    Fields(FieldsArgs),
}

#[derive(Debug, Args)]
pub struct CastArgs {
    /// Input CSV file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Sheet schema YAML file
    #[arg(short = 's', long = "schema")]
    pub schema: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Sheet id the records belong to
    #[arg(long = "sheet-id", default_value = "local")]
    pub sheet_id: String,
    /// Only cast records when the schema slug matches ('*' matches any)
    #[arg(long = "sheet-slug")]
    pub sheet_slug: Option<String>,
    /// Cast only these comma-separated field keys, string fields included
    #[arg(short = 'f', long = "fields", action = clap::ArgAction::Append)]
    pub fields: Vec<String>,
    /// Records per chunk
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Chunks processed concurrently
    #[arg(long = "parallel", default_value_t = DEFAULT_PARALLEL)]
    pub parallel: usize,
    /// Emit chunk progress and no-op diagnostics at info level
    #[arg(long)]
    pub debug: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Output delimiter (defaults to the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding of the output file (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Write every cell message as JSON to this file
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
    /// Maximum number of messages printed to the terminal
    #[arg(long = "max-messages", default_value_t = 20)]
    pub max_messages: usize,
}

#[derive(Debug, Args)]
pub struct FieldsArgs {
    /// Sheet schema YAML file
    #[arg(short = 's', long = "schema")]
    pub schema: PathBuf,
    /// Explicit comma-separated allow-list to evaluate
    #[arg(short = 'f', long = "fields", action = clap::ArgAction::Append)]
    pub fields: Vec<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" => Ok(b','),
        "pipe" => Ok(b'|'),
        "semicolon" => Ok(b';'),
        other => match other.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            [] => Err("Delimiter cannot be empty".to_string()),
            [_] => Err("Delimiter must be ASCII".to_string()),
            _ => Err("Delimiter must be a single character".to_string()),
        },
    }
}
