use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{compare::CompareOptions, process::FileOptions};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Check delimited files against a table schema and coerce them to it",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report how a file deviates from a schema without changing it
    Diagnose(DiagnoseArgs),
    /// Write a copy of a file coerced to a schema, with before/after issue reports
    Enforce(EnforceArgs),
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Schema file (YAML, or JSON by extension)
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Input CSV/TSV file
    #[arg(short, long)]
    pub input: PathBuf,
    /// Input-issue report (defaults to <input>_input_issues.tsv)
    #[arg(long = "input-issues")]
    pub input_issues: Option<PathBuf>,
    /// The input is sorted by primary key; checks keys in constant memory
    #[arg(long)]
    pub sorted: bool,
    /// Load the whole file into memory instead of streaming it
    #[arg(long = "in-memory")]
    pub in_memory: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct EnforceArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Transformed output file (defaults to <input>_transformed.<ext>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Output-issue report (defaults to <input>_output_issues.tsv)
    #[arg(long = "output-issues")]
    pub output_issues: Option<PathBuf>,
    /// Replace values outside a column's valid values with missing values
    #[arg(long = "invalid-to-missing")]
    pub invalid_to_missing: bool,
    /// Rows buffered between writes (estimated from file size by default)
    #[arg(long = "batch-rows", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_rows: Option<u64>,
    /// Character encoding for the transformed output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

impl CommonArgs {
    fn file_options(&self, set_invalid_to_missing: bool) -> FileOptions {
        FileOptions {
            compare: CompareOptions {
                set_invalid_to_missing,
                sorted_by_primary_key: self.sorted,
            },
            input_issues: self.input_issues.clone(),
            delimiter: self.delimiter,
            input_encoding: self.input_encoding.clone(),
            in_memory: self.in_memory,
            ..FileOptions::default()
        }
    }
}

impl DiagnoseArgs {
    pub fn file_options(&self) -> FileOptions {
        self.common.file_options(false)
    }
}

impl EnforceArgs {
    pub fn file_options(&self) -> FileOptions {
        FileOptions {
            output: self.output.clone(),
            output_issues: self.output_issues.clone(),
            output_encoding: self.output_encoding.clone(),
            batch_rows: self
                .batch_rows
                .map(|rows| usize::try_from(rows).unwrap_or(usize::MAX)),
            ..self.common.file_options(self.invalid_to_missing)
        }
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn enforce_flags_map_to_file_options() {
        let cli = Cli::try_parse_from([
            "csv-conform",
            "enforce",
            "-s",
            "schema.yml",
            "-i",
            "data.tsv",
            "--invalid-to-missing",
            "--sorted",
            "--batch-rows",
            "500",
            "-o",
            "clean.tsv",
        ])
        .unwrap();
        let Commands::Enforce(args) = cli.command else {
            panic!("expected enforce");
        };
        let options = args.file_options();
        assert!(options.compare.set_invalid_to_missing);
        assert!(options.compare.sorted_by_primary_key);
        assert_eq!(options.batch_rows, Some(500));
        assert_eq!(options.output, Some(PathBuf::from("clean.tsv")));
        assert!(!options.in_memory);
    }

    #[test]
    fn zero_batch_rows_is_rejected() {
        let parsed = Cli::try_parse_from([
            "csv-conform", "enforce", "-s", "s.yml", "-i", "d.csv", "--batch-rows", "0",
        ]);
        assert!(parsed.is_err());
    }
}
