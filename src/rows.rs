//! Named access to a single parsed row.
//!
//! [`RowView`] is what intra-row predicates see: the row's typed cells in
//! schema order plus name-based lookup. Absent cells read as `None`, which
//! lets predicates bail out with `?` and report "unknown".

use rust_decimal::prelude::ToPrimitive;

use crate::{data::Value, schema::TableSchema};

#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    schema: &'a TableSchema,
    values: &'a [Option<Value>],
}

impl<'a> RowView<'a> {
    pub fn new(schema: &'a TableSchema, values: &'a [Option<Value>]) -> Self {
        Self { schema, values }
    }

    pub fn schema(&self) -> &'a TableSchema {
        self.schema
    }

    pub fn values(&self) -> &'a [Option<Value>] {
        self.values
    }

    /// The typed value of `column`, or `None` if absent or not in the schema.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.schema.value_at(self.values, column)
    }

    pub fn get_str(&self, column: &str) -> Option<&'a str> {
        match self.get(column)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(i) => Some(*i),
            Value::Unsigned(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Numeric cells of any width widened to `f64`.
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Integer(i) => Some(*i as f64),
            Value::Unsigned(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }
}
