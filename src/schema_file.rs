//! Schema documents on disk.
//!
//! A schema file is YAML (or JSON, by `.json` extension):
//!
//! ```yaml
//! name: people
//! primary_key: [id]
//! columns:
//!   - name: id
//!     datatype: Int64
//!     required: true
//!     unique: true
//!   - name: age
//!     datatype: Int64
//!     valid_values: { min: 0, max: 120 }
//!   - name: visited
//!     datatype: Date
//!     parser: { kind: date, format: "%d.%m.%Y" }
//! constraints:
//!   - description: minors hold no licence
//!     expression: "age >= 18 || licensed == false"
//! ```
//!
//! Constraint expressions are compiled once when the document is converted.
//! At evaluation time each present value is bound under its normalized column
//! name; an expression that cannot be evaluated (an unbound variable because
//! a value is absent, a type error) is treated as undecided.

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use evalexpr::{ContextWithMutableVariables, HashMapContext, Node};
use serde::Deserialize;

use crate::{
    data::{RawCell, Value, normalize_column_name, value_to_evalexpr},
    error::SchemaError,
    parse::{CustomParser, parse_cell, parse_str},
    schema::{ColumnSchema, ColumnType, IntraRowConstraint, TableSchema},
    validity::ValidValues,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub primary_key: KeyDocument,
    pub columns: Vec<ColumnDocument>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyDocument {
    Single(String),
    Composite(Vec<String>),
}

impl KeyDocument {
    fn into_columns(self) -> Vec<String> {
        match self {
            KeyDocument::Single(column) => vec![column],
            KeyDocument::Composite(columns) => columns,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDocument {
    pub name: String,
    pub datatype: ColumnType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub categorical: bool,
    #[serde(default)]
    pub valid_values: Option<ValidValuesDocument>,
    #[serde(default)]
    pub parser: Option<ParserDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValidValuesDocument {
    Range { min: Scalar, max: Scalar },
    List(Vec<Scalar>),
}

/// A literal as written in the document, before parsing into the column type.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn to_text(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParserDocument {
    Date {
        format: String,
    },
    Datetime {
        format: String,
    },
    Time {
        format: String,
    },
    /// Timezone-aware timestamp, normalized to UTC.
    TimestampTz {
        format: String,
    },
    Boolean {
        true_values: Vec<String>,
        false_values: Vec<String>,
    },
    Trimmed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintDocument {
    pub description: String,
    pub expression: String,
}

impl SchemaDocument {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing YAML schema")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Parsing JSON schema")
    }

    pub fn into_schema(self) -> Result<TableSchema, SchemaError> {
        let columns = self
            .columns
            .into_iter()
            .map(ColumnDocument::into_column)
            .collect::<Result<Vec<_>, _>>()?;
        let schema = TableSchema::new(self.name, columns, self.primary_key.into_columns())?
            .with_description(self.description);
        let constraints = self
            .constraints
            .into_iter()
            .map(|doc| compile_constraint(&schema, doc))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schema.with_constraints(constraints))
    }
}

impl ColumnDocument {
    fn into_column(self) -> Result<ColumnSchema, SchemaError> {
        let mut column = ColumnSchema::new(&self.name, self.datatype)
            .with_description(self.description)
            .required(self.required)
            .unique(self.unique)
            .categorical(self.categorical);
        if let Some(parser) = self.parser {
            column = column.with_parser(build_parser(&self.name, self.datatype, parser)?);
        }
        let Some(valid_values) = self.valid_values else {
            return Ok(column);
        };
        let parse_member = |scalar: &Scalar| {
            let text = scalar.to_text();
            parse_cell(&column, RawCell::Text(&text)).ok_or_else(|| SchemaError::ValidValueType {
                column: self.name.clone(),
                value: text.clone(),
                expected: self.datatype.to_string(),
            })
        };
        let valid_values = match valid_values {
            ValidValuesDocument::Range { min, max } => {
                ValidValues::range(parse_member(&min)?, parse_member(&max)?)
            }
            ValidValuesDocument::List(members) => ValidValues::set(
                members
                    .iter()
                    .map(parse_member)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        column.with_valid_values(valid_values)
    }
}

fn build_parser(
    column: &str,
    datatype: ColumnType,
    document: ParserDocument,
) -> Result<CustomParser, SchemaError> {
    let accepts = |produced: &[ColumnType]| {
        if datatype == ColumnType::String || produced.contains(&datatype) {
            Ok(())
        } else {
            Err(SchemaError::InvalidParser {
                column: column.to_string(),
                reason: format!("parser output cannot become {datatype}"),
            })
        }
    };
    let parser = match document {
        ParserDocument::Date { format } => {
            accepts(&[ColumnType::Date, ColumnType::DateTime])?;
            CustomParser::new("date", move |text| {
                NaiveDate::parse_from_str(text.trim(), &format)
                    .ok()
                    .map(Value::Date)
            })
        }
        ParserDocument::Datetime { format } => {
            accepts(&[ColumnType::DateTime, ColumnType::Date])?;
            CustomParser::new("datetime", move |text| {
                NaiveDateTime::parse_from_str(text.trim(), &format)
                    .ok()
                    .map(Value::DateTime)
            })
        }
        ParserDocument::Time { format } => {
            accepts(&[ColumnType::Time])?;
            CustomParser::new("time", move |text| {
                NaiveTime::parse_from_str(text.trim(), &format)
                    .ok()
                    .map(Value::Time)
            })
        }
        ParserDocument::TimestampTz { format } => {
            accepts(&[ColumnType::DateTime, ColumnType::Date])?;
            CustomParser::new("timestamp_tz", move |text| {
                DateTime::parse_from_str(text.trim(), &format)
                    .ok()
                    .map(|parsed| Value::DateTime(parsed.naive_utc()))
            })
        }
        ParserDocument::Boolean {
            true_values,
            false_values,
        } => {
            accepts(&[
                ColumnType::Boolean,
                ColumnType::Int8,
                ColumnType::Int16,
                ColumnType::Int32,
                ColumnType::Int64,
                ColumnType::UInt8,
                ColumnType::UInt16,
                ColumnType::UInt32,
                ColumnType::UInt64,
            ])?;
            if true_values.iter().any(|t| false_values.iter().any(|f| f.eq_ignore_ascii_case(t))) {
                return Err(SchemaError::InvalidParser {
                    column: column.to_string(),
                    reason: "a token is listed as both true and false".to_string(),
                });
            }
            CustomParser::new("boolean", move |text| {
                let text = text.trim();
                if true_values.iter().any(|t| t.eq_ignore_ascii_case(text)) {
                    Some(Value::Boolean(true))
                } else if false_values.iter().any(|f| f.eq_ignore_ascii_case(text)) {
                    Some(Value::Boolean(false))
                } else {
                    None
                }
            })
        }
        ParserDocument::Trimmed => {
            CustomParser::new("trimmed", move |text| parse_str(text.trim(), datatype))
        }
    };
    Ok(parser)
}

fn compile_constraint(
    schema: &TableSchema,
    document: ConstraintDocument,
) -> Result<IntraRowConstraint, SchemaError> {
    let node: Node = evalexpr::build_operator_tree(&document.expression).map_err(|err| {
        SchemaError::InvalidConstraint {
            description: document.description.clone(),
            reason: err.to_string(),
        }
    })?;
    let bindings: Vec<String> = schema
        .columns()
        .iter()
        .map(|column| normalize_column_name(column.name()))
        .collect();
    if let Some(unknown) = node
        .iter_variable_identifiers()
        .find(|identifier| !bindings.iter().any(|binding| binding.as_str() == *identifier))
    {
        return Err(SchemaError::InvalidConstraint {
            description: document.description,
            reason: format!("'{unknown}' does not name a column"),
        });
    }
    let node = Arc::new(node);
    Ok(IntraRowConstraint::new(document.description, move |row| {
        let mut context: HashMapContext = HashMapContext::new();
        for (binding, value) in bindings.iter().zip(row.values()) {
            if let Some(value) = value {
                context
                    .set_value(binding.clone(), value_to_evalexpr(value))
                    .ok()?;
            }
        }
        node.eval_boolean_with_context(&context).ok()
    }))
}

/// Loads a schema file, choosing JSON or YAML by extension.
pub fn load_schema(path: &Path) -> Result<TableSchema> {
    let text = fs::read_to_string(path).with_context(|| format!("Reading schema file {path:?}"))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let document = if is_json {
        SchemaDocument::from_json_str(&text)
    } else {
        SchemaDocument::from_yaml_str(&text)
    }
    .with_context(|| format!("Parsing schema file {path:?}"))?;
    document
        .into_schema()
        .with_context(|| format!("Building schema from {path:?}"))
}
