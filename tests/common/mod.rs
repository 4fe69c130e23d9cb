#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv_conform::{
    ColumnSchema, ColumnType, TableSchema, data::Value, validity::ValidValues,
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.temp_dir.path().join(name).exists()
    }
}

/// `id` key plus a required `age` limited to 0..=120.
pub fn people_schema() -> TableSchema {
    TableSchema::new(
        "people",
        vec![
            ColumnSchema::new("id", ColumnType::Int64)
                .required(true)
                .unique(true),
            ColumnSchema::new("age", ColumnType::Int64)
                .required(true)
                .with_valid_values(ValidValues::range(Value::Integer(0), Value::Integer(120)))
                .expect("age range"),
        ],
        ["id"],
    )
    .expect("people schema")
}

/// Composite key over two required integer columns.
pub fn pair_schema() -> TableSchema {
    TableSchema::new(
        "pairs",
        vec![
            ColumnSchema::new("a", ColumnType::Int64).required(true),
            ColumnSchema::new("b", ColumnType::Int64).required(true),
        ],
        ["a", "b"],
    )
    .expect("pair schema")
}

pub fn ints(values: &[Option<i64>]) -> Vec<Option<Value>> {
    values.iter().map(|v| v.map(Value::Integer)).collect()
}

pub const PEOPLE_YAML: &str = r#"
name: people
description: registered drivers
primary_key: id
columns:
  - name: id
    datatype: Int64
    required: true
    unique: true
  - name: age
    datatype: Int64
    required: true
    valid_values: { min: 0, max: 120 }
  - name: licensed
    datatype: Boolean
  - name: status
    datatype: String
    categorical: true
    valid_values: [active, lapsed]
constraints:
  - description: minors hold no licence
    expression: "age >= 18 || licensed == false"
"#;
