pub mod cli;
pub mod compare;
pub mod constraints;
pub mod data;
pub mod error;
pub mod frame;
pub mod io_utils;
pub mod issues;
pub mod parse;
pub mod primary_key;
pub mod process;
pub mod rows;
pub mod schema;
pub mod schema_file;
pub mod validity;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands, DiagnoseArgs, EnforceArgs};

pub use crate::{
    compare::CompareOptions,
    error::SchemaError,
    frame::{Column, Table},
    issues::{Entity, Issue, IssueReport},
    process::{Enforced, EnforcedFiles, FileOptions, diagnose, diagnose_file, enforce, enforce_file},
    schema::{ColumnSchema, ColumnType, TableSchema},
    schema_file::load_schema,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_conform", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Diagnose(args) => handle_diagnose(&args),
        Commands::Enforce(args) => handle_enforce(&args),
    }
}

fn handle_diagnose(args: &DiagnoseArgs) -> Result<()> {
    let schema = load_schema(&args.common.schema)
        .with_context(|| format!("Loading schema {:?}", args.common.schema))?;
    let report = diagnose_file(&args.common.input, &schema, &args.file_options())
        .with_context(|| format!("Diagnosing {:?}", args.common.input))?;
    print_report("Input issues", &report);
    Ok(())
}

fn handle_enforce(args: &EnforceArgs) -> Result<()> {
    let schema = load_schema(&args.common.schema)
        .with_context(|| format!("Loading schema {:?}", args.common.schema))?;
    let result = enforce_file(&args.common.input, &schema, &args.file_options())
        .with_context(|| format!("Enforcing schema on {:?}", args.common.input))?;
    info!("Transformed data written to {:?}", result.output);
    print_report("Input issues", &result.input_issues);
    println!();
    print_report("Output issues", &result.output_issues);
    Ok(())
}

fn print_report(title: &str, report: &IssueReport) {
    println!("{title}:");
    if report.is_empty() {
        println!("none");
    } else {
        print!("{}", report.render());
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
