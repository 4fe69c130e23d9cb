//! Permitted values for a column and the membership test used per cell.

use std::{cmp::Ordering, collections::HashSet};

use itertools::Itertools;

use crate::{data::Value, error::SchemaError, schema::ColumnType};

#[derive(Debug, Clone, Default)]
pub enum ValidValues {
    /// Any value of the column's type.
    #[default]
    Any,
    Set(ValueSet),
    /// Inclusive range. Only the endpoints are consulted.
    Range { min: Value, max: Value },
}

/// Ordered list of permitted values with a hashed lookup.
#[derive(Debug, Clone)]
pub struct ValueSet {
    ordered: Vec<Value>,
    members: HashSet<Value>,
}

impl ValueSet {
    pub fn values(&self) -> &[Value] {
        &self.ordered
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.members.contains(value)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

impl ValidValues {
    pub fn set<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut members = HashSet::new();
        let ordered = values
            .into_iter()
            .filter(|value| members.insert(value.clone()))
            .collect();
        ValidValues::Set(ValueSet { ordered, members })
    }

    pub fn range(min: Value, max: Value) -> Self {
        ValidValues::Range { min, max }
    }

    pub fn describe(&self) -> String {
        match self {
            ValidValues::Any => "any".to_string(),
            ValidValues::Set(set) => format!("{{{}}}", set.values().iter().join(", ")),
            ValidValues::Range { min, max } => format!("{min}:{max}"),
        }
    }

    pub(crate) fn ensure_consistent(&self, column: &str, ty: &ColumnType) -> Result<(), SchemaError> {
        let check_member = |value: &Value| {
            if value.matches_type(ty) {
                Ok(())
            } else {
                Err(SchemaError::ValidValueType {
                    column: column.to_string(),
                    value: value.as_display(),
                    expected: ty.to_string(),
                })
            }
        };
        match self {
            ValidValues::Any => Ok(()),
            ValidValues::Set(set) => set.values().iter().try_for_each(check_member),
            ValidValues::Range { min, max } => {
                check_member(min)?;
                check_member(max)?;
                match min.partial_cmp(max) {
                    Some(Ordering::Greater) => Err(SchemaError::InvertedRange {
                        column: column.to_string(),
                        min: min.as_display(),
                        max: max.as_display(),
                    }),
                    Some(_) => Ok(()),
                    None => Err(SchemaError::UnorderedRange {
                        column: column.to_string(),
                        min: min.as_display(),
                        max: max.as_display(),
                    }),
                }
            }
        }
    }
}

/// Membership of an already-typed value in the column's permitted values.
///
/// Ranges are checked against their two endpoints only, so `min <= value <= max`
/// under the type's natural ordering is all that is required.
pub fn is_valid(value: &Value, valid_values: &ValidValues) -> bool {
    match valid_values {
        ValidValues::Any => true,
        ValidValues::Set(set) => set.contains(value),
        ValidValues::Range { min, max } => {
            matches!(
                min.partial_cmp(value),
                Some(Ordering::Less | Ordering::Equal)
            ) && matches!(
                value.partial_cmp(max),
                Some(Ordering::Less | Ordering::Equal)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn any_accepts_everything() {
        assert!(is_valid(&Value::Integer(-5), &ValidValues::Any));
        assert!(is_valid(&Value::String(String::new()), &ValidValues::Any));
    }

    #[test]
    fn set_membership_is_exact() {
        let valid = ValidValues::set(["a", "b"].map(|s| Value::String(s.to_string())));
        assert!(is_valid(&Value::String("a".into()), &valid));
        assert!(!is_valid(&Value::String("c".into()), &valid));
        assert_eq!(valid.describe(), "{a, b}");
    }

    #[test]
    fn set_drops_duplicate_members_but_keeps_order() {
        let valid = ValidValues::set([3, 1, 3, 2].map(Value::Integer));
        match valid {
            ValidValues::Set(set) => {
                assert_eq!(set.values(), &[Value::Integer(3), Value::Integer(1), Value::Integer(2)]);
            }
            other => panic!("expected set, got {other:?}"),
        }
    }

    #[test]
    fn date_range_uses_chronological_order() {
        let day = |d| Value::Date(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
        let valid = ValidValues::range(day(5), day(20));
        assert!(is_valid(&day(5), &valid));
        assert!(is_valid(&day(20), &valid));
        assert!(!is_valid(&day(21), &valid));
    }

    #[test]
    fn range_rejects_values_of_another_variant() {
        let valid = ValidValues::range(Value::Integer(0), Value::Integer(10));
        assert!(!is_valid(&Value::Float(5.0), &valid));
        assert!(!is_valid(&Value::Float(f64::NAN), &ValidValues::range(Value::Float(0.0), Value::Float(1.0))));
    }

    #[test]
    fn consistency_rejects_wrong_member_type_and_inverted_ranges() {
        let wrong = ValidValues::set([Value::String("x".into())]);
        assert!(matches!(
            wrong.ensure_consistent("age", &ColumnType::Int64),
            Err(SchemaError::ValidValueType { .. })
        ));

        let narrow = ValidValues::range(Value::Integer(0), Value::Integer(300));
        assert!(matches!(
            narrow.ensure_consistent("age", &ColumnType::Int8),
            Err(SchemaError::ValidValueType { .. })
        ));

        let inverted = ValidValues::range(Value::Integer(10), Value::Integer(0));
        assert!(matches!(
            inverted.ensure_consistent("age", &ColumnType::Int64),
            Err(SchemaError::InvertedRange { .. })
        ));
    }

    proptest! {
        #[test]
        fn integer_range_matches_endpoint_comparison(
            min in -1_000i64..1_000,
            span in 0i64..1_000,
            probe in -3_000i64..3_000,
        ) {
            let max = min + span;
            let valid = ValidValues::range(Value::Integer(min), Value::Integer(max));
            prop_assert_eq!(is_valid(&Value::Integer(probe), &valid), min <= probe && probe <= max);
        }

        #[test]
        fn float_range_holds_for_unenumerable_interior(
            min in -1.0e6f64..1.0e6,
            span in 0.0f64..1.0e6,
            fraction in 0.0f64..=1.0,
        ) {
            let max = min + span;
            let probe = (min + span * fraction).clamp(min, max);
            let valid = ValidValues::range(Value::Float(min), Value::Float(max));
            prop_assert!(is_valid(&Value::Float(probe), &valid));
        }
    }
}
