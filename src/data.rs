use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ColumnType;

/// A typed cell value.
///
/// Signed integer columns realize as [`Value::Integer`], unsigned ones as
/// [`Value::Unsigned`] and both float widths as [`Value::Float`]; the column
/// type carries the width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Guid(Uuid),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Unsigned(u) => u.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            Value::Guid(g) => g.to_string(),
        }
    }

    /// True when this value is a legal member of a column of type `ty`.
    pub fn matches_type(&self, ty: &ColumnType) -> bool {
        match (self, ty) {
            (Value::String(_), ColumnType::String) => true,
            (Value::Integer(i), _) if ty.is_signed_integer() => ty
                .integer_bounds()
                .is_some_and(|(min, max)| (min..=max).contains(&i128::from(*i))),
            (Value::Unsigned(u), _) if ty.is_unsigned_integer() => ty
                .integer_bounds()
                .is_some_and(|(_, max)| i128::from(*u) <= max),
            (Value::Float(_), ColumnType::Float64) => true,
            (Value::Float(f), ColumnType::Float32) => {
                !f.is_finite() || f.abs() <= f64::from(f32::MAX)
            }
            (Value::Boolean(_), ColumnType::Boolean) => true,
            (Value::Decimal(_), ColumnType::Decimal) => true,
            (Value::Date(_), ColumnType::Date) => true,
            (Value::DateTime(_), ColumnType::DateTime) => true,
            (Value::Time(_), ColumnType::Time) => true,
            (Value::Guid(_), ColumnType::Guid) => true,
            _ => false,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::String(_) => 0,
            Value::Integer(_) => 1,
            Value::Unsigned(_) => 2,
            Value::Float(_) => 3,
            Value::Boolean(_) => 4,
            Value::Decimal(_) => 5,
            Value::Date(_) => 6,
            Value::DateTime(_) => 7,
            Value::Time(_) => 8,
            Value::Guid(_) => 9,
        }
    }
}

// Floats compare by canonical bit pattern so that values can live in hash
// sets: 0.0 == -0.0 and every NaN equals every other NaN.
fn canonical_float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Unsigned(a), Value::Unsigned(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => canonical_float_bits(*a) == canonical_float_bits(*b),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Unsigned(u) => u.hash(state),
            Value::Float(f) => canonical_float_bits(*f).hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Decimal(d) => d.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Guid(g) => g.hash(state),
        }
    }
}

/// Values of the same variant order naturally; values of different variants
/// are unordered.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Unsigned(a), Value::Unsigned(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => {
                if canonical_float_bits(*a) == canonical_float_bits(*b) {
                    Some(Ordering::Equal)
                } else {
                    a.partial_cmp(b)
                }
            }
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// A cell as handed over by a row source, before parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawCell<'a> {
    Missing,
    Text(&'a str),
    Typed(&'a Value),
}

impl<'a> RawCell<'a> {
    pub fn from_option(value: Option<&'a Value>) -> Self {
        value.map_or(RawCell::Missing, RawCell::Typed)
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime> {
    const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];
    for fmt in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as time"))
}

pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase()
}

pub fn value_to_evalexpr(value: &Value) -> evalexpr::Value {
    match value {
        Value::String(s) => evalexpr::Value::String(s.clone()),
        Value::Integer(i) => evalexpr::Value::Int(*i),
        Value::Unsigned(u) => match i64::try_from(*u) {
            Ok(i) => evalexpr::Value::Int(i),
            Err(_) => evalexpr::Value::Float(*u as f64),
        },
        Value::Float(f) => evalexpr::Value::Float(*f),
        Value::Boolean(b) => evalexpr::Value::Boolean(*b),
        Value::Decimal(d) => {
            use rust_decimal::prelude::ToPrimitive;
            d.to_f64()
                .map(evalexpr::Value::Float)
                .unwrap_or_else(|| evalexpr::Value::String(d.to_string()))
        }
        Value::Date(_) | Value::DateTime(_) | Value::Time(_) | Value::Guid(_) => {
            evalexpr::Value::String(value.as_display())
        }
    }
}
