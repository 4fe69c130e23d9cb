//! Row comparison engine.
//!
//! A [`RowComparator`] owns all per-pass state for one comparison: issue
//! counters, primary-key trackers and uniqueness sets, one set of each for
//! the input view and (when a transformed table is being built) the output
//! view. Row sources feed it raw cells in their own column order; it parses
//! them into schema order exactly once and runs the column, key and
//! constraint checks against both views.

use std::collections::HashSet;

use log::debug;

use crate::{
    constraints::ConstraintEvaluator,
    data::{RawCell, Value},
    parse::parse_cell,
    primary_key::{KeyTracking, PrimaryKeyTracker},
    rows::RowView,
    schema::{ColumnType, TableSchema},
    validity::is_valid,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Null out invalid values in the transformed output instead of only reporting them.
    pub set_invalid_to_missing: bool,
    /// The input is sorted by primary key; enables constant-memory key tracking.
    pub sorted_by_primary_key: bool,
}

impl CompareOptions {
    pub fn key_tracking(&self) -> KeyTracking {
        if self.sorted_by_primary_key {
            KeyTracking::Sorted
        } else {
            KeyTracking::Unsorted
        }
    }
}

/// How a column is actually realized by a row source or sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// `None` for untyped text, which is never compared against the declared type.
    pub data_type: Option<ColumnType>,
    pub categorical: bool,
}

impl ColumnDescriptor {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            categorical: false,
        }
    }

    pub fn typed(name: impl Into<String>, data_type: ColumnType, categorical: bool) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type),
            categorical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnCounters {
    pub missing: usize,
    pub not_unique: usize,
    pub invalid: usize,
    /// Realized type, when it differs from the declared one.
    pub datatype_mismatch: Option<ColumnType>,
    /// Realized categorical flag, when it differs from the declared one.
    pub categorical_mismatch: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueCounters {
    pub rows: usize,
    pub duplicate_primary_keys: usize,
    pub incomplete_primary_keys: usize,
    /// Indexed like the schema's constraints.
    pub constraint_failures: Vec<usize>,
    pub extra_columns: Vec<String>,
    pub missing_columns: Vec<String>,
    /// Indexed like the schema's columns.
    pub columns: Vec<ColumnCounters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Input,
    Output,
}

#[derive(Debug)]
struct ViewState {
    counters: IssueCounters,
    keys: PrimaryKeyTracker,
    unique_values: Vec<Option<HashSet<Value>>>,
    constraints: ConstraintEvaluator,
    null_invalid: bool,
}

impl ViewState {
    fn new(schema: &TableSchema, options: &CompareOptions, null_invalid: bool) -> Self {
        Self {
            counters: IssueCounters {
                columns: vec![ColumnCounters::default(); schema.columns().len()],
                ..IssueCounters::default()
            },
            keys: PrimaryKeyTracker::new(schema.primary_key_indices(), options.key_tracking()),
            unique_values: schema
                .columns()
                .iter()
                .map(|column| column.is_unique().then(HashSet::new))
                .collect(),
            constraints: ConstraintEvaluator::new(schema.constraints().len()),
            null_invalid,
        }
    }

    /// Runs the column, key and constraint checks for one row. Columns with
    /// `checked[idx] == false` are skipped by the column checks.
    fn observe(&mut self, schema: &TableSchema, row: &mut [Option<Value>], checked: &[bool]) {
        self.counters.rows += 1;
        for (idx, column) in schema.columns().iter().enumerate() {
            if !checked[idx] {
                continue;
            }
            let counters = &mut self.counters.columns[idx];
            match row[idx].as_ref().map(|value| is_valid(value, column.valid_values())) {
                None => {
                    if column.is_required() {
                        counters.missing += 1;
                    }
                    continue;
                }
                Some(false) if self.null_invalid => {
                    row[idx] = None;
                    if column.is_required() {
                        counters.missing += 1;
                    }
                    continue;
                }
                Some(false) => counters.invalid += 1,
                Some(true) => {}
            }
            if let (Some(seen), Some(value)) = (self.unique_values[idx].as_mut(), row[idx].as_ref())
            {
                if seen.contains(value) {
                    counters.not_unique += 1;
                } else {
                    seen.insert(value.clone());
                }
            }
        }

        let status = self.keys.observe(row);
        if status.incomplete {
            self.counters.incomplete_primary_keys += 1;
        }
        if status.duplicated {
            self.counters.duplicate_primary_keys += 1;
        }

        self.constraints
            .evaluate(schema.constraints(), &RowView::new(schema, row));
    }

    fn finish(mut self) -> IssueCounters {
        self.counters.constraint_failures = self.constraints.into_failures();
        self.counters
    }
}

/// Single-pass comparator for one table against one schema.
#[derive(Debug)]
pub struct RowComparator<'s> {
    schema: &'s TableSchema,
    /// Position of each schema column within the source's cells.
    source_positions: Vec<Option<usize>>,
    observed: Vec<bool>,
    all_columns: Vec<bool>,
    input: ViewState,
    output: Option<ViewState>,
    scratch: Vec<Option<Value>>,
}

impl<'s> RowComparator<'s> {
    /// `build_output` adds the output view; the transformed rows are then
    /// returned from [`compare_row`](Self::compare_row).
    pub fn new(schema: &'s TableSchema, options: &CompareOptions, build_output: bool) -> Self {
        let width = schema.columns().len();
        Self {
            schema,
            source_positions: vec![None; width],
            observed: vec![false; width],
            all_columns: vec![true; width],
            input: ViewState::new(schema, options, false),
            output: build_output
                .then(|| ViewState::new(schema, options, options.set_invalid_to_missing)),
            scratch: Vec::with_capacity(width),
        }
    }

    pub fn schema(&self) -> &'s TableSchema {
        self.schema
    }

    /// Resolves the source's columns against the schema and records the
    /// column-set differences in both views. Must be called before the first row.
    pub fn check_columns(&mut self, observed: &[String]) {
        let extra: Vec<String> = observed
            .iter()
            .filter(|name| self.schema.column_index(name).is_none())
            .cloned()
            .collect();
        let mut missing = Vec::new();
        for (idx, column) in self.schema.columns().iter().enumerate() {
            let position = observed.iter().position(|name| name == column.name());
            self.source_positions[idx] = position;
            self.observed[idx] = position.is_some();
            if position.is_none() {
                missing.push(column.name().to_string());
            }
        }
        if !extra.is_empty() || !missing.is_empty() {
            debug!(
                "Column set differs from schema '{}': {} extra, {} missing",
                self.schema.name(),
                extra.len(),
                missing.len()
            );
        }
        for state in std::iter::once(&mut self.input).chain(self.output.as_mut()) {
            state.counters.extra_columns = extra.clone();
            state.counters.missing_columns = missing.clone();
        }
    }

    /// Processes one row given in the source's column order. Returns the
    /// transformed row in schema order when the output view is enabled.
    pub fn compare_row(&mut self, cells: &[RawCell<'_>]) -> Option<Vec<Option<Value>>> {
        self.scratch.clear();
        for (column, position) in self.schema.columns().iter().zip(&self.source_positions) {
            let cell = position
                .and_then(|pos| cells.get(pos).copied())
                .unwrap_or(RawCell::Missing);
            self.scratch.push(parse_cell(column, cell));
        }

        let transformed = self.output.as_ref().map(|_| self.scratch.clone());
        self.input
            .observe(self.schema, &mut self.scratch, &self.observed);
        match (self.output.as_mut(), transformed) {
            (Some(state), Some(mut row)) => {
                state.observe(self.schema, &mut row, &self.all_columns);
                Some(row)
            }
            _ => None,
        }
    }

    /// End-of-pass check of how each schema column was realized in `view`.
    /// Columns absent from `descriptors`, or realized as untyped text, are skipped.
    pub fn check_realized_columns(&mut self, view: View, descriptors: &[ColumnDescriptor]) {
        let state = match view {
            View::Input => &mut self.input,
            View::Output => match self.output.as_mut() {
                Some(state) => state,
                None => return,
            },
        };
        for (column, counters) in self.schema.columns().iter().zip(&mut state.counters.columns) {
            let Some(descriptor) = descriptors.iter().find(|d| d.name == column.name()) else {
                continue;
            };
            let Some(realized) = descriptor.data_type else {
                continue;
            };
            if realized != column.data_type() {
                counters.datatype_mismatch = Some(realized);
            }
            if descriptor.categorical != column.is_categorical() {
                counters.categorical_mismatch = Some(descriptor.categorical);
            }
        }
    }

    pub fn rows(&self) -> usize {
        self.input.counters.rows
    }

    /// Consumes the comparator, yielding the input counters and, if the
    /// output view was enabled, the output counters.
    pub fn finish(self) -> (IssueCounters, Option<IssueCounters>) {
        (self.input.finish(), self.output.map(ViewState::finish))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::ColumnSchema,
        validity::ValidValues,
    };

    fn age_schema() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                ColumnSchema::new("id", ColumnType::Int64).required(true).unique(true),
                ColumnSchema::new("age", ColumnType::Int64)
                    .required(true)
                    .with_valid_values(ValidValues::range(Value::Integer(0), Value::Integer(120)))
                    .unwrap(),
                ColumnSchema::new("nickname", ColumnType::String),
            ],
            ["id"],
        )
        .unwrap()
    }

    fn run(
        schema: &TableSchema,
        options: CompareOptions,
        header: &[&str],
        rows: &[&[&str]],
    ) -> (IssueCounters, IssueCounters, Vec<Vec<Option<Value>>>) {
        let mut comparator = RowComparator::new(schema, &options, true);
        let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
        comparator.check_columns(&header);
        let mut out = Vec::new();
        for row in rows {
            let cells: Vec<RawCell<'_>> = row.iter().map(|s| RawCell::Text(s)).collect();
            out.extend(comparator.compare_row(&cells));
        }
        let (input, output) = comparator.finish();
        (input, output.unwrap(), out)
    }

    #[test]
    fn absent_optional_values_are_not_missing() {
        let schema = age_schema();
        let (input, _, _) = run(
            &schema,
            CompareOptions::default(),
            &["id", "age", "nickname"],
            &[&["1", "10", ""], &["2", "", ""]],
        );
        assert_eq!(input.columns[1].missing, 1);
        assert_eq!(input.columns[2].missing, 0);
    }

    #[test]
    fn invalid_values_are_nulled_only_in_output_view() {
        let schema = age_schema();
        let options = CompareOptions {
            set_invalid_to_missing: true,
            ..CompareOptions::default()
        };
        let (input, output, rows) = run(
            &schema,
            options,
            &["id", "age"],
            &[&["1", "11"], &["2", "444"]],
        );
        assert_eq!(input.columns[1].invalid, 1);
        assert_eq!(input.columns[1].missing, 0);
        assert_eq!(output.columns[1].invalid, 0);
        assert_eq!(output.columns[1].missing, 1);
        assert_eq!(rows[1][1], None);
    }

    #[test]
    fn unparseable_values_count_as_absent() {
        let schema = age_schema();
        let (input, _, rows) = run(
            &schema,
            CompareOptions::default(),
            &["id", "age"],
            &[&["1", "eleven"], &["2", "2.5"]],
        );
        assert_eq!(input.columns[1].missing, 2);
        assert_eq!(input.columns[1].invalid, 0);
        assert!(rows.iter().all(|row| row[1].is_none()));
    }

    #[test]
    fn duplicate_values_in_unique_column_are_counted_once_per_repeat() {
        let schema = age_schema();
        let (input, _, _) = run(
            &schema,
            CompareOptions::default(),
            &["id", "age"],
            &[&["1", "5"], &["1", "6"], &["1", "7"], &["2", "8"]],
        );
        assert_eq!(input.columns[0].not_unique, 2);
        assert_eq!(input.duplicate_primary_keys, 0);
    }

    #[test]
    fn column_set_differences_are_recorded_in_both_views() {
        let schema = age_schema();
        let (input, output, rows) = run(
            &schema,
            CompareOptions::default(),
            &["age", "id", "shoe_size"],
            &[&["40", "1", "9"]],
        );
        assert_eq!(input.extra_columns, vec!["shoe_size".to_string()]);
        assert_eq!(input.missing_columns, vec!["nickname".to_string()]);
        assert_eq!(output.extra_columns, input.extra_columns);
        assert_eq!(output.missing_columns, input.missing_columns);
        assert_eq!(
            rows[0],
            vec![Some(Value::Integer(1)), Some(Value::Integer(40)), None]
        );
    }

    #[test]
    fn unobserved_required_column_is_reported_once_in_input_view() {
        let schema = age_schema();
        let (input, output, _) = run(
            &schema,
            CompareOptions::default(),
            &["id"],
            &[&["1"], &["2"]],
        );
        assert_eq!(input.missing_columns, vec!["age".to_string(), "nickname".to_string()]);
        assert_eq!(input.columns[1].missing, 0);
        assert_eq!(output.columns[1].missing, 2);
    }

    #[test]
    fn realized_types_are_compared_only_when_typed() {
        let schema = age_schema();
        let mut comparator = RowComparator::new(&schema, &CompareOptions::default(), false);
        comparator.check_realized_columns(
            View::Input,
            &[
                ColumnDescriptor::typed("id", ColumnType::Float64, false),
                ColumnDescriptor::typed("age", ColumnType::Int64, true),
                ColumnDescriptor::text("nickname"),
            ],
        );
        let (input, output) = comparator.finish();
        assert!(output.is_none());
        assert_eq!(input.columns[0].datatype_mismatch, Some(ColumnType::Float64));
        assert_eq!(input.columns[1].datatype_mismatch, None);
        assert_eq!(input.columns[1].categorical_mismatch, Some(true));
        assert_eq!(input.columns[2], ColumnCounters::default());
    }
}
