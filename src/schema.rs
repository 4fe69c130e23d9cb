//! Table schema model.
//!
//! A [`TableSchema`] is an immutable description of one table: the ordered
//! [`ColumnSchema`] list (which also fixes the output column order), the
//! primary key and any named intra-row constraints. Every consistency rule is
//! checked when the schema is built, so the engine never has to deal with a
//! half-valid schema at runtime.
//!
//! Schemas are `Send + Sync`; one instance can back any number of
//! independent comparisons running on different threads.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    data::Value,
    error::SchemaError,
    parse::CustomParser,
    rows::RowView,
    validity::ValidValues,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Boolean,
    Decimal,
    Date,
    DateTime,
    Time,
    Guid,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "String",
            ColumnType::Int8 => "Int8",
            ColumnType::Int16 => "Int16",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::UInt8 => "UInt8",
            ColumnType::UInt16 => "UInt16",
            ColumnType::UInt32 => "UInt32",
            ColumnType::UInt64 => "UInt64",
            ColumnType::Float32 => "Float32",
            ColumnType::Float64 => "Float64",
            ColumnType::Boolean => "Boolean",
            ColumnType::Decimal => "Decimal",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
            ColumnType::Time => "Time",
            ColumnType::Guid => "Guid",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string", "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64",
            "float32", "float64", "boolean", "decimal", "date", "datetime", "time", "guid",
        ]
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ColumnType::Float32 | ColumnType::Float64)
    }

    /// Inclusive bounds of an integer column type, widened to `i128`.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            ColumnType::Int8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            ColumnType::Int16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            ColumnType::Int32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            ColumnType::Int64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            ColumnType::UInt8 => (0, i128::from(u8::MAX)),
            ColumnType::UInt16 => (0, i128::from(u16::MAX)),
            ColumnType::UInt32 => (0, i128::from(u32::MAX)),
            ColumnType::UInt64 => (0, i128::from(u64::MAX)),
            _ => return None,
        };
        Some(bounds)
    }

    /// Bytes per cell assumed when sizing the streaming output buffer.
    pub fn estimated_width(&self) -> u64 {
        match self {
            ColumnType::String => 30,
            _ => 8,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let parsed = match normalized.as_str() {
            "string" | "str" | "text" => ColumnType::String,
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" => ColumnType::Int32,
            "int64" | "int" | "integer" => ColumnType::Int64,
            "uint8" => ColumnType::UInt8,
            "uint16" => ColumnType::UInt16,
            "uint32" => ColumnType::UInt32,
            "uint64" | "uint" => ColumnType::UInt64,
            "float32" => ColumnType::Float32,
            "float64" | "float" | "double" => ColumnType::Float64,
            "boolean" | "bool" => ColumnType::Boolean,
            "decimal" => ColumnType::Decimal,
            "date" => ColumnType::Date,
            "datetime" | "date-time" | "timestamp" => ColumnType::DateTime,
            "time" => ColumnType::Time,
            "guid" | "uuid" => ColumnType::Guid,
            _ => return Err(SchemaError::UnknownType(value.to_string())),
        };
        Ok(parsed)
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| {
            de::Error::custom(format!(
                "{err}. Supported types: {}",
                ColumnType::variants().join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    name: String,
    description: String,
    data_type: ColumnType,
    categorical: bool,
    required: bool,
    unique: bool,
    valid_values: ValidValues,
    parser: Option<CustomParser>,
}

impl ColumnSchema {
    /// An optional, non-unique, non-categorical column accepting any value of `data_type`.
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_type,
            categorical: false,
            required: false,
            unique: false,
            valid_values: ValidValues::Any,
            parser: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn categorical(mut self, categorical: bool) -> Self {
        self.categorical = categorical;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_parser(mut self, parser: CustomParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Restricts the column to `valid_values`; every member (or range
    /// endpoint) must already be of the column's declared type.
    pub fn with_valid_values(mut self, valid_values: ValidValues) -> Result<Self, SchemaError> {
        valid_values.ensure_consistent(&self.name, &self.data_type)?;
        self.valid_values = valid_values;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn data_type(&self) -> ColumnType {
        self.data_type
    }

    pub fn is_categorical(&self) -> bool {
        self.categorical
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn valid_values(&self) -> &ValidValues {
        &self.valid_values
    }

    pub fn parser(&self) -> Option<&CustomParser> {
        self.parser.as_ref()
    }
}

pub type RowPredicate = Arc<dyn Fn(&RowView<'_>) -> Option<bool> + Send + Sync>;

/// A named boolean predicate over one row. `None` means the predicate could
/// not be decided (typically because an input was missing).
#[derive(Clone)]
pub struct IntraRowConstraint {
    description: String,
    predicate: RowPredicate,
}

impl IntraRowConstraint {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RowView<'_>) -> Option<bool> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn check(&self, row: &RowView<'_>) -> Option<bool> {
        (self.predicate)(row)
    }
}

impl fmt::Debug for IntraRowConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntraRowConstraint")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    description: String,
    columns: Vec<ColumnSchema>,
    primary_key: Vec<String>,
    primary_key_indices: Vec<usize>,
    constraints: Vec<IntraRowConstraint>,
    positions: HashMap<String, usize>,
}

impl TableSchema {
    pub fn new<K, S>(
        name: impl Into<String>,
        columns: Vec<ColumnSchema>,
        primary_key: K,
    ) -> Result<Self, SchemaError>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if positions.insert(column.name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        let primary_key: Vec<String> = primary_key.into_iter().map(Into::into).collect();
        if primary_key.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey(name));
        }
        let mut primary_key_indices = Vec::with_capacity(primary_key.len());
        for key in &primary_key {
            let idx = *positions
                .get(key)
                .ok_or_else(|| SchemaError::UnknownKeyColumn(key.clone()))?;
            if primary_key_indices.contains(&idx) {
                return Err(SchemaError::RepeatedKeyColumn(key.clone()));
            }
            if !columns[idx].required {
                return Err(SchemaError::NullableKeyColumn(key.clone()));
            }
            primary_key_indices.push(idx);
        }
        if let [idx] = primary_key_indices.as_slice()
            && !columns[*idx].unique
        {
            return Err(SchemaError::NonUniqueKeyColumn(columns[*idx].name.clone()));
        }

        Ok(Self {
            name,
            description: String::new(),
            columns,
            primary_key,
            primary_key_indices,
            constraints: Vec::new(),
            positions,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_constraint<F>(mut self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RowView<'_>) -> Option<bool> + Send + Sync + 'static,
    {
        self.constraints
            .push(IntraRowConstraint::new(description, predicate));
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<IntraRowConstraint>) -> Self {
        self.constraints.extend(constraints);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn primary_key_indices(&self) -> &[usize] {
        &self.primary_key_indices
    }

    pub fn constraints(&self) -> &[IntraRowConstraint] {
        &self.constraints
    }

    /// Assumed bytes per row, used to size the streaming output buffer.
    pub fn estimated_row_width(&self) -> u64 {
        self.columns
            .iter()
            .map(|c| c.data_type.estimated_width())
            .sum::<u64>()
            .max(1)
    }

    pub(crate) fn value_at<'r>(&self, row: &'r [Option<Value>], name: &str) -> Option<&'r Value> {
        self.column_index(name)
            .and_then(|idx| row.get(idx))
            .and_then(Option::as_ref)
    }
}
