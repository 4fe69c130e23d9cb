//! Incremental primary-key checks.
//!
//! Single-column keys need no state here: the key column is required and
//! unique, so the column-level missing and uniqueness counters already cover
//! it. Composite keys use one of two strategies:
//!
//! - **unsorted**: remember every complete key tuple seen so far, compared
//!   with typed value equality, O(distinct keys) memory;
//! - **sorted**: remember only the previous row's key, O(1) memory. Correct
//!   only when the input really is sorted by the key; the tracker does not
//!   verify that.

use std::collections::HashSet;

use crate::data::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTracking {
    Sorted,
    Unsorted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStatus {
    /// At least one key column is absent.
    pub incomplete: bool,
    /// The complete key was already seen. Never set for incomplete keys.
    pub duplicated: bool,
}

#[derive(Debug)]
enum TrackerState {
    SingleColumn,
    Sorted {
        previous: Vec<Option<Value>>,
        has_previous: bool,
    },
    Unsorted {
        seen: HashSet<Box<[Value]>>,
        scratch: Vec<Value>,
    },
}

#[derive(Debug)]
pub struct PrimaryKeyTracker {
    indices: Vec<usize>,
    state: TrackerState,
}

impl PrimaryKeyTracker {
    /// `indices` are the key columns' positions within the rows passed to
    /// [`observe`](Self::observe).
    pub fn new(indices: &[usize], mode: KeyTracking) -> Self {
        let state = if indices.len() <= 1 {
            TrackerState::SingleColumn
        } else {
            match mode {
                KeyTracking::Sorted => TrackerState::Sorted {
                    previous: vec![None; indices.len()],
                    has_previous: false,
                },
                KeyTracking::Unsorted => TrackerState::Unsorted {
                    seen: HashSet::new(),
                    scratch: Vec::with_capacity(indices.len()),
                },
            }
        };
        Self {
            indices: indices.to_vec(),
            state,
        }
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self.state, TrackerState::SingleColumn)
    }

    /// Feeds one row and reports its key status. Single-column keys always
    /// report the default status.
    pub fn observe(&mut self, row: &[Option<Value>]) -> KeyStatus {
        let indices = &self.indices;
        let key = |pos: usize| row.get(indices[pos]).and_then(Option::as_ref);
        match &mut self.state {
            TrackerState::SingleColumn => KeyStatus::default(),
            TrackerState::Sorted {
                previous,
                has_previous,
            } => {
                let incomplete = (0..indices.len()).any(|pos| key(pos).is_none());
                let duplicated = !incomplete
                    && *has_previous
                    && previous
                        .iter()
                        .enumerate()
                        .all(|(pos, prev)| prev.as_ref() == key(pos));
                for (pos, slot) in previous.iter_mut().enumerate() {
                    *slot = key(pos).cloned();
                }
                *has_previous = true;
                KeyStatus {
                    incomplete,
                    duplicated,
                }
            }
            TrackerState::Unsorted { seen, scratch } => {
                scratch.clear();
                for pos in 0..indices.len() {
                    let Some(value) = key(pos) else {
                        return KeyStatus {
                            incomplete: true,
                            duplicated: false,
                        };
                    };
                    scratch.push(value.clone());
                }
                let duplicated = if seen.contains(scratch.as_slice()) {
                    true
                } else {
                    seen.insert(scratch.as_slice().into());
                    false
                };
                KeyStatus {
                    incomplete: false,
                    duplicated,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn row(a: Option<i64>, b: Option<i64>) -> Vec<Option<Value>> {
        vec![a.map(Value::Integer), b.map(Value::Integer)]
    }

    fn statuses(mode: KeyTracking, rows: &[Vec<Option<Value>>]) -> Vec<KeyStatus> {
        let mut tracker = PrimaryKeyTracker::new(&[0, 1], mode);
        rows.iter().map(|r| tracker.observe(r)).collect()
    }

    #[test]
    fn sorted_mode_flags_repeat_of_previous_row() {
        let rows = [row(Some(1), Some(1)), row(Some(1), Some(1)), row(Some(1), Some(2))];
        let found = statuses(KeyTracking::Sorted, &rows);
        assert!(!found[0].duplicated);
        assert!(found[1].duplicated);
        assert!(!found[2].duplicated);
    }

    #[test]
    fn unsorted_mode_remembers_every_key() {
        let rows = [row(Some(1), Some(1)), row(Some(1), Some(2)), row(Some(1), Some(1))];
        let found = statuses(KeyTracking::Unsorted, &rows);
        assert!(!found[1].duplicated);
        assert!(found[2].duplicated);
    }

    #[test]
    fn sorted_mode_misses_non_adjacent_repeats() {
        let rows = [row(Some(1), Some(1)), row(Some(1), Some(2)), row(Some(1), Some(1))];
        let found = statuses(KeyTracking::Sorted, &rows);
        assert!(found.iter().all(|s| !s.duplicated));
    }

    #[test]
    fn incomplete_keys_are_never_duplicates() {
        for mode in [KeyTracking::Sorted, KeyTracking::Unsorted] {
            let rows = [row(Some(1), None), row(Some(1), None)];
            let found = statuses(mode, &rows);
            assert_eq!(
                found,
                vec![
                    KeyStatus { incomplete: true, duplicated: false },
                    KeyStatus { incomplete: true, duplicated: false },
                ]
            );
        }
    }

    #[test]
    fn key_parts_are_not_concatenated() {
        let mut tracker = PrimaryKeyTracker::new(&[0, 1], KeyTracking::Unsorted);
        let first = vec![Some(Value::String("1".into())), Some(Value::String("12".into()))];
        let second = vec![Some(Value::String("11".into())), Some(Value::String("2".into()))];
        assert!(!tracker.observe(&first).duplicated);
        assert!(!tracker.observe(&second).duplicated);

        let mut tracker = PrimaryKeyTracker::new(&[0, 1], KeyTracking::Unsorted);
        let first = vec![Some(Value::String("a\u{1f}b".into())), Some(Value::String("c".into()))];
        let second = vec![Some(Value::String("a".into())), Some(Value::String("b\u{1f}c".into()))];
        assert!(!tracker.observe(&first).duplicated);
        assert!(!tracker.observe(&second).duplicated);
    }

    fn both_modes(rows: &[Vec<Option<Value>>]) -> (Vec<bool>, Vec<bool>) {
        let flags = |mode| {
            statuses(mode, rows)
                .into_iter()
                .map(|s| s.duplicated)
                .collect::<Vec<_>>()
        };
        (flags(KeyTracking::Sorted), flags(KeyTracking::Unsorted))
    }

    #[test]
    fn equal_values_with_different_renderings_are_duplicates() {
        let id = Some(Value::Integer(1));
        let decimals = [
            vec![id.clone(), Some(Value::Decimal(Decimal::new(10, 1)))],
            vec![id.clone(), Some(Value::Decimal(Decimal::new(100, 2)))],
        ];
        assert_eq!(both_modes(&decimals), (vec![false, true], vec![false, true]));

        let zeros = [
            vec![id.clone(), Some(Value::Float(0.0))],
            vec![id.clone(), Some(Value::Float(-0.0))],
        ];
        assert_eq!(both_modes(&zeros), (vec![false, true], vec![false, true]));
    }

    #[test]
    fn sub_second_times_are_distinct_keys() {
        let id = Some(Value::Integer(1));
        let at = |ms| Some(Value::Time(NaiveTime::from_hms_milli_opt(10, 0, 0, ms).unwrap()));
        let rows = [vec![id.clone(), at(100)], vec![id.clone(), at(200)]];
        assert_eq!(both_modes(&rows), (vec![false, false], vec![false, false]));
    }

    #[test]
    fn single_column_key_is_left_to_column_checks() {
        let mut tracker = PrimaryKeyTracker::new(&[0], KeyTracking::Unsorted);
        assert!(!tracker.is_composite());
        let r = vec![Some(Value::Integer(1))];
        assert_eq!(tracker.observe(&r), KeyStatus::default());
        assert_eq!(tracker.observe(&r), KeyStatus::default());
    }

    proptest! {
        #[test]
        fn sorted_and_unsorted_agree_on_sorted_input(
            mut keys in proptest::collection::vec(
                (0i64..4, proptest::option::of(0i64..4)),
                0..60,
            )
        ) {
            keys.sort();
            let rows: Vec<_> = keys.iter().map(|(a, b)| row(Some(*a), *b)).collect();
            prop_assert_eq!(
                statuses(KeyTracking::Sorted, &rows),
                statuses(KeyTracking::Unsorted, &rows)
            );
        }

        #[test]
        fn modes_agree_on_sorted_typed_keys(
            mut keys in proptest::collection::vec(
                (0i64..3, 0i64..4, 0u32..3, 0usize..3),
                0..60,
            )
        ) {
            // Sort by the numeric value each tuple encodes; the scale and the
            // sign of zero vary between otherwise equal keys.
            keys.sort_by_key(|(a, b, ms, _)| (*a, *b, *ms));
            let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let rows: Vec<Vec<Option<Value>>> = keys
                .iter()
                .map(|(a, b, ms, variant)| {
                    let scale = *variant as u32;
                    let mantissa = b * 10i64.pow(scale);
                    let float = if *b == 0 && *variant == 1 { -0.0 } else { *b as f64 };
                    vec![
                        Some(Value::Integer(*a)),
                        Some(Value::Decimal(Decimal::new(mantissa, scale))),
                        Some(Value::Float(float)),
                        Some(Value::DateTime(
                            day.and_hms_milli_opt(10, 0, 0, ms * 100).unwrap(),
                        )),
                    ]
                })
                .collect();
            let mut sorted = PrimaryKeyTracker::new(&[0, 1, 2, 3], KeyTracking::Sorted);
            let mut unsorted = PrimaryKeyTracker::new(&[0, 1, 2, 3], KeyTracking::Unsorted);
            for row in &rows {
                prop_assert_eq!(sorted.observe(row), unsorted.observe(row));
            }
        }
    }
}
