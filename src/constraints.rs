//! Per-row evaluation of a schema's intra-row constraints.

use crate::{rows::RowView, schema::IntraRowConstraint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Satisfied,
    Violated,
    /// The predicate could not decide, usually because an input was absent.
    /// Counted as satisfied; the missing value is reported by the column checks.
    Unknown,
}

impl From<Option<bool>> for ConstraintOutcome {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => ConstraintOutcome::Satisfied,
            Some(false) => ConstraintOutcome::Violated,
            None => ConstraintOutcome::Unknown,
        }
    }
}

/// Runs every constraint against a row and accumulates failure counts,
/// indexed like [`TableSchema::constraints`](crate::schema::TableSchema::constraints).
#[derive(Debug, Clone, Default)]
pub struct ConstraintEvaluator {
    failures: Vec<usize>,
}

impl ConstraintEvaluator {
    pub fn new(constraint_count: usize) -> Self {
        Self {
            failures: vec![0; constraint_count],
        }
    }

    pub fn evaluate(&mut self, constraints: &[IntraRowConstraint], row: &RowView<'_>) {
        for (constraint, failures) in constraints.iter().zip(self.failures.iter_mut()) {
            if ConstraintOutcome::from(constraint.check(row)) == ConstraintOutcome::Violated {
                *failures += 1;
            }
        }
    }

    pub fn failures(&self) -> &[usize] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<usize> {
        self.failures
    }
}
