//! Conversion of raw cells into a column's declared type.
//!
//! Parsing never fails loudly: anything that cannot become a value of the
//! column's type (empty text, malformed text, out-of-range or inexact
//! numeric narrowing) yields `None`, and validation carries on treating the
//! cell as absent.

use std::{fmt, str::FromStr, sync::Arc};

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use uuid::Uuid;

use crate::{
    data::{RawCell, Value, parse_naive_date, parse_naive_datetime, parse_naive_time},
    schema::{ColumnSchema, ColumnType},
};

pub type ParseFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Column-specific text parser, resolved once when the schema is built.
#[derive(Clone)]
pub struct CustomParser {
    name: String,
    func: ParseFn,
}

impl CustomParser {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse(&self, text: &str) -> Option<Value> {
        (self.func)(text)
    }
}

impl fmt::Debug for CustomParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomParser")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Parses one cell for `column`. Text goes through the column's custom
/// parser when it has one, then through the same narrowing rules as typed
/// input so both paths agree on what a legal value is.
pub fn parse_cell(column: &ColumnSchema, cell: RawCell<'_>) -> Option<Value> {
    match cell {
        RawCell::Missing => None,
        RawCell::Text(text) => parse_text(column, text),
        RawCell::Typed(Value::String(text)) => parse_text(column, text),
        RawCell::Typed(value) => convert_value(value, column.data_type()),
    }
}

fn parse_text(column: &ColumnSchema, text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    match column.parser() {
        Some(parser) => {
            let parsed = parser.parse(text)?;
            if parsed.matches_type(&column.data_type()) {
                Some(parsed)
            } else {
                convert_value(&parsed, column.data_type())
            }
        }
        None => parse_str(text, column.data_type()),
    }
}

/// Default text parsing for a column type.
pub fn parse_str(text: &str, ty: ColumnType) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    match ty {
        ColumnType::String => Some(Value::String(text.to_string())),
        _ if ty.is_integer() => {
            let trimmed = text.trim();
            match trimmed.parse::<i128>() {
                Ok(parsed) => integer_value(parsed, ty),
                Err(_) => trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(exact_integer)
                    .and_then(|parsed| integer_value(parsed, ty)),
            }
        }
        ColumnType::Float32 | ColumnType::Float64 => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|parsed| float_value(parsed, ty)),
        ColumnType::Boolean => parse_boolean(text).map(Value::Boolean),
        ColumnType::Decimal => {
            let trimmed = text.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .ok()
                .map(Value::Decimal)
        }
        ColumnType::Date => parse_naive_date(text.trim()).ok().map(Value::Date),
        ColumnType::DateTime => parse_naive_datetime(text.trim()).ok().map(Value::DateTime),
        ColumnType::Time => parse_naive_time(text.trim()).ok().map(Value::Time),
        ColumnType::Guid => {
            let trimmed = text.trim().trim_matches(|c| matches!(c, '{' | '}'));
            Uuid::parse_str(trimmed).ok().map(Value::Guid)
        }
        _ => None,
    }
}

pub fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Converts an already-typed value into `ty`.
///
/// Values already of the target type pass through unchanged. Numeric
/// narrowing is range-checked before converting and refuses inexact results,
/// so `2.5` never becomes an integer and `300` never becomes an `Int8`.
pub fn convert_value(value: &Value, ty: ColumnType) -> Option<Value> {
    if value.matches_type(&ty) {
        return Some(value.clone());
    }
    match (ty, value) {
        (ColumnType::String, other) => Some(Value::String(other.as_display())),
        (_, Value::String(text)) => parse_str(text, ty),
        (target, source) if target.is_integer() => {
            let widened = match source {
                Value::Integer(i) => i128::from(*i),
                Value::Unsigned(u) => i128::from(*u),
                Value::Boolean(b) => i128::from(*b),
                Value::Float(f) => exact_integer(*f)?,
                Value::Decimal(d) if d.fract().is_zero() => d.to_i128()?,
                _ => return None,
            };
            integer_value(widened, target)
        }
        (target, source) if target.is_float() => match source {
            Value::Integer(i) => exact_float(i128::from(*i), target),
            Value::Unsigned(u) => exact_float(i128::from(*u), target),
            Value::Boolean(b) => float_value(if *b { 1.0 } else { 0.0 }, target),
            Value::Float(f) => float_value(*f, target),
            Value::Decimal(d) => d.to_f64().and_then(|f| float_value(f, target)),
            _ => None,
        },
        (ColumnType::Decimal, source) => match source {
            Value::Integer(i) => Some(Value::Decimal(Decimal::from(*i))),
            Value::Unsigned(u) => Some(Value::Decimal(Decimal::from(*u))),
            Value::Float(f) => Decimal::from_f64(*f).map(Value::Decimal),
            _ => None,
        },
        (ColumnType::Boolean, source) => match source {
            Value::Integer(0) | Value::Unsigned(0) => Some(Value::Boolean(false)),
            Value::Integer(1) | Value::Unsigned(1) => Some(Value::Boolean(true)),
            Value::Float(f) if *f == 0.0 => Some(Value::Boolean(false)),
            Value::Float(f) if *f == 1.0 => Some(Value::Boolean(true)),
            _ => None,
        },
        (ColumnType::Date, Value::DateTime(dt)) if dt.date().and_hms_opt(0, 0, 0) == Some(*dt) => {
            Some(Value::Date(dt.date()))
        }
        (ColumnType::DateTime, Value::Date(d)) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
        _ => None,
    }
}

fn integer_value(value: i128, ty: ColumnType) -> Option<Value> {
    let (min, max) = ty.integer_bounds()?;
    if value < min || value > max {
        return None;
    }
    if ty.is_signed_integer() {
        i64::try_from(value).ok().map(Value::Integer)
    } else {
        u64::try_from(value).ok().map(Value::Unsigned)
    }
}

/// The integer a float denotes, if it has no fractional part and fits.
fn exact_integer(value: f64) -> Option<i128> {
    const LIMIT: f64 = 1.7e38;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() >= LIMIT {
        return None;
    }
    Some(value as i128)
}

fn exact_float(value: i128, ty: ColumnType) -> Option<Value> {
    let exact = match ty {
        ColumnType::Float32 => (value as f32) as i128 == value,
        _ => (value as f64) as i128 == value,
    };
    exact.then_some(Value::Float(value as f64))
}

fn float_value(value: f64, ty: ColumnType) -> Option<Value> {
    match ty {
        ColumnType::Float32 if value.is_finite() && value.abs() > f64::from(f32::MAX) => None,
        ColumnType::Float32 | ColumnType::Float64 => Some(Value::Float(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn column(ty: ColumnType) -> ColumnSchema {
        ColumnSchema::new("c", ty)
    }

    #[test]
    fn empty_and_missing_cells_are_absent() {
        let col = column(ColumnType::String);
        assert_eq!(parse_cell(&col, RawCell::Missing), None);
        assert_eq!(parse_cell(&col, RawCell::Text("")), None);
        let empty = Value::String(String::new());
        assert_eq!(parse_cell(&col, RawCell::Typed(&empty)), None);
    }

    #[test]
    fn integer_text_is_range_checked() {
        assert_eq!(parse_str("127", ColumnType::Int8), Some(Value::Integer(127)));
        assert_eq!(parse_str("128", ColumnType::Int8), None);
        assert_eq!(parse_str("-1", ColumnType::UInt32), None);
        assert_eq!(
            parse_str("18446744073709551615", ColumnType::UInt64),
            Some(Value::Unsigned(u64::MAX))
        );
        assert_eq!(parse_str("9223372036854775808", ColumnType::Int64), None);
    }

    #[test]
    fn integral_float_text_becomes_integer_but_fractions_do_not() {
        assert_eq!(parse_str("3.0", ColumnType::Int64), Some(Value::Integer(3)));
        assert_eq!(parse_str("2.5", ColumnType::Int64), None);
        assert_eq!(parse_str("abc", ColumnType::Int64), None);
    }

    #[test]
    fn typed_narrowing_checks_range_and_exactness() {
        assert_eq!(convert_value(&Value::Integer(300), ColumnType::Int16), Some(Value::Integer(300)));
        assert_eq!(convert_value(&Value::Integer(300), ColumnType::UInt8), None);
        assert_eq!(convert_value(&Value::Unsigned(7), ColumnType::Int8), Some(Value::Integer(7)));
        assert_eq!(convert_value(&Value::Boolean(true), ColumnType::UInt8), Some(Value::Unsigned(1)));
        assert_eq!(convert_value(&Value::Float(4.0), ColumnType::Int32), Some(Value::Integer(4)));
        assert_eq!(convert_value(&Value::Float(4.5), ColumnType::Int32), None);
        assert_eq!(convert_value(&Value::Float(f64::NAN), ColumnType::Int32), None);
    }

    #[test]
    fn float_conversions_respect_target_range() {
        assert_eq!(convert_value(&Value::Float(1e300), ColumnType::Float32), None);
        assert_eq!(convert_value(&Value::Float(1.5), ColumnType::Float32), Some(Value::Float(1.5)));
        assert_eq!(convert_value(&Value::Integer(i64::MAX), ColumnType::Float64), None);
        assert_eq!(convert_value(&Value::Integer(1 << 20), ColumnType::Float32), Some(Value::Float(1048576.0)));
        assert_eq!(convert_value(&Value::Integer((1 << 24) + 1), ColumnType::Float32), None);
    }

    #[test]
    fn values_of_the_declared_type_pass_through() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(convert_value(&date, ColumnType::Date), Some(date.clone()));
        let guid = Value::Guid(Uuid::nil());
        assert_eq!(convert_value(&guid, ColumnType::Guid), Some(guid.clone()));
    }

    #[test]
    fn temporal_conversions_refuse_to_drop_time_of_day() {
        let midnight = NaiveDateTime::parse_from_str("2024-01-02 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let noon = NaiveDateTime::parse_from_str("2024-01-02 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            convert_value(&Value::DateTime(midnight), ColumnType::Date),
            Some(Value::Date(midnight.date()))
        );
        assert_eq!(convert_value(&Value::DateTime(noon), ColumnType::Date), None);
    }

    #[test]
    fn anything_renders_into_string_columns() {
        assert_eq!(
            convert_value(&Value::Integer(12), ColumnType::String),
            Some(Value::String("12".to_string()))
        );
    }

    #[test]
    fn custom_parser_output_is_narrowed_to_column_type() {
        let parser = CustomParser::new("percent", |text: &str| {
            text.strip_suffix('%')
                .and_then(|digits| digits.parse::<f64>().ok())
                .map(Value::Float)
        });
        let col = ColumnSchema::new("share", ColumnType::UInt8).with_parser(parser);
        assert_eq!(parse_cell(&col, RawCell::Text("42%")), Some(Value::Unsigned(42)));
        assert_eq!(parse_cell(&col, RawCell::Text("42.5%")), None);
        assert_eq!(parse_cell(&col, RawCell::Text("42")), None);
    }

    #[test]
    fn booleans_and_guids_accept_common_spellings() {
        assert_eq!(parse_str("Yes", ColumnType::Boolean), Some(Value::Boolean(true)));
        assert_eq!(parse_str("0", ColumnType::Boolean), Some(Value::Boolean(false)));
        assert_eq!(parse_str("maybe", ColumnType::Boolean), None);
        let braced = "{550e8400-e29b-41d4-a716-446655440000}";
        assert!(matches!(parse_str(braced, ColumnType::Guid), Some(Value::Guid(_))));
    }

    #[test]
    fn decimals_parse_plain_and_scientific_text() {
        assert_eq!(
            parse_str("12.50", ColumnType::Decimal),
            Some(Value::Decimal(Decimal::new(1250, 2)))
        );
        assert!(matches!(parse_str("1.5e3", ColumnType::Decimal), Some(Value::Decimal(_))));
    }
}
