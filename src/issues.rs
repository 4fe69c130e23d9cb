//! Issue aggregation and reporting.
//!
//! Turns the counters accumulated during a pass into an [`IssueReport`]:
//! one record per non-zero condition, sorted column issues first, then table
//! issues, then by id and message.

use std::{cmp::Reverse, fmt, fmt::Write as _, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::{
    compare::IssueCounters,
    io_utils::{DEFAULT_TSV_DELIMITER, open_csv_writer},
    schema::TableSchema,
};

pub const ISSUE_HEADERS: [&str; 3] = ["entity", "id", "issue"];

/// Scope of an issue. Reports sort by entity descending, so column issues
/// come before table issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    Table,
    Column,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Table => "table",
            Entity::Column => "column",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub entity: Entity,
    pub id: String,
    pub message: String,
}

impl Issue {
    pub fn new(entity: Entity, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity,
            id: id.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueReport {
    issues: Vec<Issue>,
}

impl IssueReport {
    pub fn from_issues(mut issues: Vec<Issue>) -> Self {
        issues.sort_by(|a, b| {
            Reverse(a.entity)
                .cmp(&Reverse(b.entity))
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.message.cmp(&b.message))
        });
        Self { issues }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues reported against `id` (a column name or the table name).
    pub fn for_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |issue| issue.id == id)
    }

    pub fn contains(&self, entity: Entity, id: &str, message: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.entity == entity && issue.id == id && issue.message == message)
    }

    /// Writes the report as a tab-separated file with an `entity/id/issue` header.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let mut writer = open_csv_writer(
            path,
            DEFAULT_TSV_DELIMITER,
            encoding_rs::UTF_8,
            csv::QuoteStyle::Necessary,
        )?;
        writer
            .write_record(ISSUE_HEADERS)
            .with_context(|| format!("Writing issue header to {path:?}"))?;
        for issue in &self.issues {
            writer
                .write_record([issue.entity.as_str(), issue.id.as_str(), issue.message.as_str()])
                .with_context(|| format!("Writing issue to {path:?}"))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing issue file {path:?}"))?;
        Ok(())
    }

    /// Aligned plain-text rendering for terminals.
    pub fn render(&self) -> String {
        let rows: Vec<[&str; 3]> = self
            .issues
            .iter()
            .map(|issue| [issue.entity.as_str(), issue.id.as_str(), issue.message.as_str()])
            .collect();
        let mut widths = ISSUE_HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut output = String::new();
        let mut push_line = |cells: [&str; 3]| {
            let line = cells
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .join("  ");
            let _ = writeln!(output, "{}", line.trim_end());
        };
        push_line(ISSUE_HEADERS);
        let separators = widths.map(|w| "-".repeat(w));
        push_line([
            separators[0].as_str(),
            separators[1].as_str(),
            separators[2].as_str(),
        ]);
        for row in rows {
            push_line(row);
        }
        output
    }
}

impl fmt::Display for IssueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Share of `total` rows that `affected` represents, formatted for messages.
/// `None` when nothing is affected. Whole percents round exact halves up
/// (2.5% of rows renders as `3`).
pub fn format_percent(affected: usize, total: usize) -> Option<String> {
    if affected == 0 || total == 0 {
        return None;
    }
    let percent = 100.0 * affected as f64 / total as f64;
    let formatted = if percent > 100.0 {
        "<100".to_string()
    } else if percent >= 1.0 {
        format!("{}", percent.round() as u64)
    } else if percent <= 0.1 {
        "<0.1".to_string()
    } else {
        format!("{percent:.1}")
    };
    Some(formatted)
}

/// Builds the report for one view from its end-of-pass counters.
pub fn aggregate(schema: &TableSchema, counters: &IssueCounters) -> IssueReport {
    let mut issues = Vec::new();
    let total = counters.rows;
    let table = schema.name();

    let mut rate = |entity: Entity, id: &str, affected: usize, what: &str| {
        if let Some(percent) = format_percent(affected, total) {
            issues.push(Issue::new(entity, id, format!("{percent}% of rows {what}")));
        }
    };

    rate(
        Entity::Table,
        table,
        counters.duplicate_primary_keys,
        "have duplicate primary keys",
    );
    rate(
        Entity::Table,
        table,
        counters.incomplete_primary_keys,
        "have incomplete primary keys",
    );
    for (constraint, failures) in schema.constraints().iter().zip(&counters.constraint_failures) {
        rate(
            Entity::Table,
            table,
            *failures,
            &format!("do not satisfy constraint: {}", constraint.description()),
        );
    }
    for (column, column_counters) in schema.columns().iter().zip(&counters.columns) {
        let id = column.name();
        rate(Entity::Column, id, column_counters.missing, "have missing data");
        rate(Entity::Column, id, column_counters.not_unique, "contain duplicate values");
        rate(Entity::Column, id, column_counters.invalid, "contain invalid values");
    }

    for (column, column_counters) in schema.columns().iter().zip(&counters.columns) {
        if let Some(realized) = column_counters.datatype_mismatch {
            issues.push(Issue::new(
                Entity::Column,
                column.name(),
                format!("Data type is {realized}; should be {}", column.data_type()),
            ));
        }
        if let Some(realized) = column_counters.categorical_mismatch {
            let message = if realized {
                "Data is categorical but shouldn't be"
            } else {
                "Data isn't categorical but should be"
            };
            issues.push(Issue::new(Entity::Column, column.name(), message));
        }
    }

    if !counters.extra_columns.is_empty() {
        issues.push(Issue::new(
            Entity::Table,
            table,
            format!(
                "The data has columns that the schema does not have: {}",
                counters.extra_columns.join(", ")
            ),
        ));
    }
    if !counters.missing_columns.is_empty() {
        issues.push(Issue::new(
            Entity::Table,
            table,
            format!(
                "The data lacks columns that are in the schema: {}",
                counters.missing_columns.join(", ")
            ),
        ));
    }

    IssueReport::from_issues(issues)
}
