//! Comparison orchestration.
//!
//! Drives one pass of a [`RowSource`] through a [`RowComparator`], hands
//! transformed rows to an [`OutputSink`] and builds the issue reports. The
//! in-memory and streaming entry points differ only in their source and
//! sink; both run the same engine, so their reports agree.

use std::{
    fmt,
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::{ByteRecord, QuoteStyle};
use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    compare::{ColumnDescriptor, CompareOptions, RowComparator, View},
    data::{RawCell, Value},
    frame::Table,
    io_utils,
    issues::{IssueReport, aggregate},
    schema::TableSchema,
};

/// Anything that can hand the engine rows of raw cells.
pub trait RowSource {
    /// Columns in the order cells are handed over.
    fn columns(&self) -> &[ColumnDescriptor];

    fn for_each_row(&mut self, visit: &mut dyn FnMut(&[RawCell<'_>]) -> Result<()>) -> Result<()>;
}

pub struct TableSource<'t> {
    table: &'t Table,
    descriptors: Vec<ColumnDescriptor>,
}

impl<'t> TableSource<'t> {
    pub fn new(table: &'t Table) -> Self {
        Self {
            table,
            descriptors: table.descriptors(),
        }
    }
}

impl RowSource for TableSource<'_> {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.descriptors
    }

    fn for_each_row(&mut self, visit: &mut dyn FnMut(&[RawCell<'_>]) -> Result<()>) -> Result<()> {
        let mut cells = Vec::with_capacity(self.descriptors.len());
        for idx in 0..self.table.row_count() {
            self.table.row_cells(idx, &mut cells);
            visit(&cells)?;
        }
        Ok(())
    }
}

/// Streams records from a delimited file. Every column is untyped text.
pub struct CsvSource {
    path: PathBuf,
    reader: csv::Reader<BufReader<File>>,
    encoding: &'static Encoding,
    descriptors: Vec<ColumnDescriptor>,
}

impl CsvSource {
    pub fn open(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers of {path:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            encoding,
            descriptors: headers.into_iter().map(ColumnDescriptor::text).collect(),
        })
    }
}

impl RowSource for CsvSource {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.descriptors
    }

    fn for_each_row(&mut self, visit: &mut dyn FnMut(&[RawCell<'_>]) -> Result<()>) -> Result<()> {
        let mut record = ByteRecord::new();
        let mut line = 1usize;
        while self
            .reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Reading row {} of {:?}", line + 1, self.path))?
        {
            line += 1;
            let fields = io_utils::decode_record(&record, self.encoding)
                .with_context(|| format!("Decoding row {line} of {:?}", self.path))?;
            let cells: Vec<RawCell<'_>> = fields.iter().map(|f| RawCell::Text(f.as_str())).collect();
            visit(&cells)?;
        }
        Ok(())
    }
}

/// Where transformed rows go.
pub enum OutputSink {
    /// Diagnose only; no transformed rows are produced.
    Discard,
    Table(Vec<Vec<Option<Value>>>),
    Csv {
        writer: csv::Writer<Box<dyn Write>>,
        buffer: Vec<Vec<Option<Value>>>,
        capacity: usize,
        flushes: usize,
    },
}

impl OutputSink {
    pub fn csv(
        path: &Path,
        schema: &TableSchema,
        delimiter: u8,
        encoding: &'static Encoding,
        quote_style: QuoteStyle,
        capacity: usize,
    ) -> Result<Self> {
        let mut writer = io_utils::open_csv_writer(path, delimiter, encoding, quote_style)?;
        writer
            .write_record(schema.columns().iter().map(|c| c.name()))
            .with_context(|| format!("Writing header to {path:?}"))?;
        Ok(OutputSink::Csv {
            writer,
            buffer: Vec::with_capacity(capacity),
            capacity,
            flushes: 0,
        })
    }

    fn push(&mut self, row: Vec<Option<Value>>) -> Result<()> {
        match self {
            OutputSink::Discard => Ok(()),
            OutputSink::Table(rows) => {
                rows.push(row);
                Ok(())
            }
            OutputSink::Csv {
                buffer, capacity, ..
            } => {
                buffer.push(row);
                if buffer.len() >= *capacity {
                    self.flush()?;
                }
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        let OutputSink::Csv {
            writer,
            buffer,
            flushes,
            ..
        } = self
        else {
            return Ok(());
        };
        if buffer.is_empty() {
            return Ok(());
        }
        let mut record: Vec<String> = Vec::new();
        for row in buffer.drain(..) {
            record.clear();
            record.extend(
                row.iter()
                    .map(|value| value.as_ref().map(Value::as_display).unwrap_or_default()),
            );
            writer
                .write_record(&record)
                .context("Writing transformed row")?;
        }
        writer.flush().context("Flushing transformed output")?;
        *flushes += 1;
        debug!("Flushed output batch {flushes}");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    HeaderResolved,
    RowProcessing,
    Flushing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::HeaderResolved => "header-resolved",
            Stage::RowProcessing => "row-processing",
            Stage::Flushing => "flushing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

struct Outcome {
    rows: usize,
    sink: OutputSink,
    input_issues: IssueReport,
    output_issues: Option<IssueReport>,
}

struct CompareEngine<'s> {
    comparator: RowComparator<'s>,
    sink: OutputSink,
    stage: Stage,
}

impl<'s> CompareEngine<'s> {
    fn new(schema: &'s TableSchema, options: &CompareOptions, sink: OutputSink) -> Self {
        let build_output = !matches!(sink, OutputSink::Discard);
        Self {
            comparator: RowComparator::new(schema, options, build_output),
            sink,
            stage: Stage::Init,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(
            "Comparison against '{}': {} -> {}",
            self.comparator.schema().name(),
            self.stage,
            next
        );
        self.stage = next;
    }

    fn run(mut self, source: &mut dyn RowSource) -> Result<Outcome> {
        let observed: Vec<String> = source.columns().iter().map(|c| c.name.clone()).collect();
        self.comparator.check_columns(&observed);
        self.advance(Stage::HeaderResolved);

        self.advance(Stage::RowProcessing);
        let comparator = &mut self.comparator;
        let sink = &mut self.sink;
        source.for_each_row(&mut |cells| match comparator.compare_row(cells) {
            Some(row) => sink.push(row),
            None => Ok(()),
        })?;

        self.advance(Stage::Flushing);
        self.sink.flush()?;

        let schema = self.comparator.schema();
        self.comparator
            .check_realized_columns(View::Input, source.columns());
        let realized: Vec<ColumnDescriptor> = schema
            .columns()
            .iter()
            .map(|c| ColumnDescriptor::typed(c.name(), c.data_type(), c.is_categorical()))
            .collect();
        self.comparator
            .check_realized_columns(View::Output, &realized);
        self.advance(Stage::Done);

        let rows = self.comparator.rows();
        let (input, output) = self.comparator.finish();
        Ok(Outcome {
            rows,
            sink: self.sink,
            input_issues: aggregate(schema, &input),
            output_issues: output.map(|counters| aggregate(schema, &counters)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Enforced {
    pub table: Table,
    pub input_issues: IssueReport,
    pub output_issues: IssueReport,
}

/// Reports the issues in `table` without building a transformed copy.
pub fn diagnose(table: &Table, schema: &TableSchema, options: &CompareOptions) -> Result<IssueReport> {
    let outcome = CompareEngine::new(schema, options, OutputSink::Discard)
        .run(&mut TableSource::new(table))?;
    info!(
        "Diagnosed {} row(s) against schema '{}': {} issue(s)",
        outcome.rows,
        schema.name(),
        outcome.input_issues.len()
    );
    Ok(outcome.input_issues)
}

/// Coerces `table` to `schema`, reporting issues before and after.
pub fn enforce(table: &Table, schema: &TableSchema, options: &CompareOptions) -> Result<Enforced> {
    let sink = OutputSink::Table(Vec::with_capacity(table.row_count()));
    let outcome = CompareEngine::new(schema, options, sink).run(&mut TableSource::new(table))?;
    let rows = match outcome.sink {
        OutputSink::Table(rows) => rows,
        _ => Vec::new(),
    };
    let output_issues = outcome.output_issues.unwrap_or_default();
    info!(
        "Enforced schema '{}' on {} row(s): {} input issue(s), {} output issue(s)",
        schema.name(),
        outcome.rows,
        outcome.input_issues.len(),
        output_issues.len()
    );
    Ok(Enforced {
        table: Table::from_schema_rows(schema, rows),
        input_issues: outcome.input_issues,
        output_issues,
    })
}

#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub compare: CompareOptions,
    /// Transformed output; defaults to `<stem>_transformed.<ext>` beside the input.
    pub output: Option<PathBuf>,
    pub input_issues: Option<PathBuf>,
    pub output_issues: Option<PathBuf>,
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
    pub output_encoding: Option<String>,
    /// Rows buffered between output flushes; estimated from the file size when unset.
    pub batch_rows: Option<usize>,
    /// Load the whole file into a [`Table`] instead of streaming it.
    pub in_memory: bool,
}

#[derive(Debug, Clone)]
pub struct EnforcedFiles {
    pub rows: usize,
    pub output: PathBuf,
    pub input_issues_path: PathBuf,
    pub output_issues_path: PathBuf,
    pub input_issues: IssueReport,
    pub output_issues: IssueReport,
}

struct FileSettings {
    delimiter: u8,
    input_encoding: &'static Encoding,
    output_encoding: &'static Encoding,
}

impl FileSettings {
    fn resolve(path: &Path, options: &FileOptions) -> Result<Self> {
        Ok(Self {
            delimiter: io_utils::resolve_input_delimiter(path, options.delimiter),
            input_encoding: io_utils::resolve_encoding(options.input_encoding.as_deref())?,
            output_encoding: io_utils::resolve_encoding(options.output_encoding.as_deref())?,
        })
    }
}

/// Diagnoses a delimited file and writes the input-issue report.
pub fn diagnose_file(path: &Path, schema: &TableSchema, options: &FileOptions) -> Result<IssueReport> {
    let settings = FileSettings::resolve(path, options)?;
    let issues_path = options
        .input_issues
        .clone()
        .unwrap_or_else(|| io_utils::default_input_issues_path(path));
    info!(
        "Diagnosing '{}' against schema '{}' (delimiter '{}')",
        path.display(),
        schema.name(),
        crate::printable_delimiter(settings.delimiter)
    );

    let report = if options.in_memory {
        let table = Table::read_csv(path, settings.delimiter, settings.input_encoding)?;
        diagnose(&table, schema, &options.compare)?
    } else {
        let mut source = CsvSource::open(path, settings.delimiter, settings.input_encoding)?;
        let outcome = CompareEngine::new(schema, &options.compare, OutputSink::Discard)
            .run(&mut source)?;
        info!(
            "Diagnosed {} row(s): {} issue(s)",
            outcome.rows,
            outcome.input_issues.len()
        );
        outcome.input_issues
    };

    report.write_tsv(&issues_path)?;
    info!("Input issues written to {issues_path:?}");
    Ok(report)
}

/// Enforces `schema` on a delimited file, writing the transformed file and
/// both issue reports.
pub fn enforce_file(path: &Path, schema: &TableSchema, options: &FileOptions) -> Result<EnforcedFiles> {
    let settings = FileSettings::resolve(path, options)?;
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| io_utils::default_output_path(path));
    let input_issues_path = options
        .input_issues
        .clone()
        .unwrap_or_else(|| io_utils::default_input_issues_path(path));
    let output_issues_path = options
        .output_issues
        .clone()
        .unwrap_or_else(|| io_utils::default_output_issues_path(path));
    let output_delimiter = io_utils::resolve_output_delimiter(&output, settings.delimiter);
    let quote_style = io_utils::quote_style_for(io_utils::detect_quoted_input(path)?);
    info!(
        "Enforcing schema '{}' on '{}' -> '{}' (delimiter '{}', output '{}')",
        schema.name(),
        path.display(),
        output.display(),
        crate::printable_delimiter(settings.delimiter),
        crate::printable_delimiter(output_delimiter)
    );

    let (rows, input_issues, output_issues) = if options.in_memory {
        let table = Table::read_csv(path, settings.delimiter, settings.input_encoding)?;
        let enforced = enforce(&table, schema, &options.compare)?;
        enforced.table.write_csv(
            &output,
            output_delimiter,
            settings.output_encoding,
            quote_style,
        )?;
        (table.row_count(), enforced.input_issues, enforced.output_issues)
    } else {
        let capacity = match options.batch_rows {
            Some(rows) => rows.max(1),
            None => {
                let size = fs::metadata(path)
                    .with_context(|| format!("Reading metadata of {path:?}"))?
                    .len();
                io_utils::estimate_buffer_rows(size, schema.estimated_row_width())
            }
        };
        debug!("Buffering up to {capacity} row(s) per output batch");
        let mut source = CsvSource::open(path, settings.delimiter, settings.input_encoding)?;
        let sink = OutputSink::csv(
            &output,
            schema,
            output_delimiter,
            settings.output_encoding,
            quote_style,
            capacity,
        )?;
        let outcome = CompareEngine::new(schema, &options.compare, sink).run(&mut source)?;
        (
            outcome.rows,
            outcome.input_issues,
            outcome.output_issues.unwrap_or_default(),
        )
    };

    input_issues.write_tsv(&input_issues_path)?;
    output_issues.write_tsv(&output_issues_path)?;
    info!(
        "Enforced {} row(s): {} input issue(s) -> {:?}, {} output issue(s) -> {:?}",
        rows,
        input_issues.len(),
        input_issues_path,
        output_issues.len(),
        output_issues_path
    );
    Ok(EnforcedFiles {
        rows,
        output,
        input_issues_path,
        output_issues_path,
        input_issues,
        output_issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::Column,
        schema::{ColumnSchema, ColumnType},
        validity::ValidValues,
    };
    use std::fs;
    use tempfile::tempdir;

    fn schema() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                ColumnSchema::new("id", ColumnType::Int64).required(true).unique(true),
                ColumnSchema::new("age", ColumnType::Int64)
                    .required(true)
                    .with_valid_values(ValidValues::range(Value::Integer(0), Value::Integer(120)))
                    .unwrap(),
            ],
            ["id"],
        )
        .unwrap()
    }

    #[test]
    fn streaming_flushes_in_batches_and_preserves_order() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("people.csv");
        fs::write(&input, "id,age\n1,10\n2,20\n3,30\n4,40\n5,50\n").unwrap();
        let options = FileOptions {
            batch_rows: Some(2),
            ..FileOptions::default()
        };
        let result = enforce_file(&input, &schema(), &options).unwrap();
        assert_eq!(result.rows, 5);
        assert_eq!(result.output, dir.path().join("people_transformed.csv"));
        assert_eq!(
            fs::read_to_string(&result.output).unwrap(),
            "id,age\n1,10\n2,20\n3,30\n4,40\n5,50\n"
        );
        assert!(result.input_issues.is_empty());
    }

    #[test]
    fn in_memory_diagnose_flags_realized_type() {
        let table = Table::new(vec![
            Column::new("id", ColumnType::Int64, vec![Some(Value::Integer(1))]),
            Column::new("age", ColumnType::Float64, vec![Some(Value::Float(30.0))]),
        ])
        .unwrap();
        let report = diagnose(&table, &schema(), &CompareOptions::default()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.issues()[0].message, "Data type is Float64; should be Int64");
    }

    #[test]
    fn missing_input_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = diagnose_file(
            &dir.path().join("absent.csv"),
            &schema(),
            &FileOptions::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Opening input file"));
    }
}
