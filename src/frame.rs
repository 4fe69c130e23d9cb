//! Minimal in-memory column store.
//!
//! A [`Table`] is what the in-memory comparison path consumes and produces:
//! named columns of optional [`Value`]s, each carrying the type it was
//! realized as. Columns read from a delimited file hold untyped text.

use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::QuoteStyle;
use encoding_rs::Encoding;

use crate::{
    compare::ColumnDescriptor,
    data::{RawCell, Value},
    io_utils,
    schema::{ColumnType, TableSchema},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data_type: Option<ColumnType>,
    categorical: bool,
    values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type),
            categorical: false,
            values,
        }
    }

    /// An untyped column of raw text; empty strings become absent.
    pub fn text<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(Into::into)
            .map(|text: String| (!text.is_empty()).then_some(Value::String(text)))
            .collect();
        Self {
            name: name.into(),
            data_type: None,
            categorical: false,
            values,
        }
    }

    pub fn categorical(mut self, categorical: bool) -> Self {
        self.categorical = categorical;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> Option<ColumnType> {
        self.data_type
    }

    pub fn is_categorical(&self) -> bool {
        self.categorical
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn descriptor(&self) -> ColumnDescriptor {
        ColumnDescriptor {
            name: self.name.clone(),
            data_type: self.data_type,
            categorical: self.categorical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map_or(0, Column::len);
        for (idx, column) in columns.iter().enumerate() {
            if column.len() != rows {
                bail!(
                    "Column '{}' has {} values but the table has {} rows",
                    column.name,
                    column.len(),
                    rows
                );
            }
            if columns[..idx].iter().any(|c| c.name == column.name) {
                bail!("Duplicate column '{}'", column.name);
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a table in schema column order from rows already in that order.
    /// Columns take the schema's declared type and categorical flag.
    pub fn from_schema_rows(schema: &TableSchema, rows: Vec<Vec<Option<Value>>>) -> Self {
        let row_count = rows.len();
        let mut columns: Vec<Column> = schema
            .columns()
            .iter()
            .map(|c| {
                Column::new(c.name(), c.data_type(), Vec::with_capacity(row_count))
                    .categorical(c.is_categorical())
            })
            .collect();
        for row in rows {
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Self {
            columns,
            rows: row_count,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.columns.iter().map(Column::descriptor).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Cells of row `idx` in column order.
    pub fn row_cells<'a>(&'a self, idx: usize, cells: &mut Vec<RawCell<'a>>) {
        cells.clear();
        cells.extend(
            self.columns
                .iter()
                .map(|c| RawCell::from_option(c.values.get(idx).and_then(Option::as_ref))),
        );
    }

    /// Reads a delimited file with a header row into untyped text columns.
    pub fn read_csv(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers of {path:?}"))?;
        let mut values: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (ordinal, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", ordinal + 2))?;
            let fields = io_utils::decode_record(&record, encoding)?;
            for (column, field) in values.iter_mut().zip(fields) {
                column.push(field);
            }
        }
        let columns = headers
            .into_iter()
            .zip(values)
            .map(|(name, column)| Column::text(name, column))
            .collect();
        Table::new(columns)
    }

    /// Writes the table with a header row; absent values become empty fields.
    pub fn write_csv(
        &self,
        path: &Path,
        delimiter: u8,
        encoding: &'static Encoding,
        quote_style: QuoteStyle,
    ) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(path, delimiter, encoding, quote_style)?;
        writer
            .write_record(self.columns.iter().map(|c| c.name.as_str()))
            .with_context(|| format!("Writing header to {path:?}"))?;
        let mut record = Vec::with_capacity(self.columns.len());
        for idx in 0..self.rows {
            record.clear();
            record.extend(self.columns.iter().map(|c| {
                c.values[idx]
                    .as_ref()
                    .map(Value::as_display)
                    .unwrap_or_default()
            }));
            writer
                .write_record(&record)
                .with_context(|| format!("Writing row {} to {path:?}", idx + 2))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {path:?}"))?;
        Ok(())
    }
}
