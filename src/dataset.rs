//! In-memory student-records table loaded from CSV.
//!
//! The dataset is immutable once loaded. Every scoping or filtering operation
//! produces a new view over cloned rows; nothing mutates shared state.

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

/// A single record: column name -> typed cell value.
pub type Row = Map<String, Value>;

/// Errors raised while loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset is missing required column '{0}'")]
    MissingColumn(&'static str),
}

/// Immutable tabular dataset. Columns are not statically known; they are
/// whatever the CSV header declares, with `grade` and `class` required.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Load a dataset from a CSV file, inferring cell types (integer, then
    /// float, then string; blank cells become null).
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if grade_column(&columns).is_none() {
            return Err(DatasetError::MissingColumn("grade"));
        }
        if class_column(&columns).is_none() {
            return Err(DatasetError::MissingColumn("class"));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                let raw = record.get(idx).unwrap_or("");
                row.insert(column.clone(), parse_cell(raw));
            }
            rows.push(row);
        }

        info!(records = rows.len(), "loaded dataset");
        Ok(Self { columns, rows })
    }

    /// Build a dataset directly from rows. Used by views and tests.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// An empty dataset with no columns. Every query against it answers
    /// "service unavailable".
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new view over the same columns with the given rows.
    pub fn with_rows(&self, rows: Vec<Row>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Type a raw CSV cell: integer, then float, then string. Blank cells are
/// null so numeric extraction can skip them uniformly.
fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(trimmed.to_string())
}

/// Extract a cell as a number. Numeric strings count; anything else is None.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Resolve a column reference against the actual header, exact match first,
/// then case-insensitive.
pub fn resolve_column<'a>(columns: &'a [String], name: &str) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| c.as_str() == name)
        .or_else(|| columns.iter().find(|c| c.eq_ignore_ascii_case(name)))
        .map(|c| c.as_str())
}

pub fn grade_column(columns: &[String]) -> Option<&str> {
    named_column(columns, "grade")
}

pub fn class_column(columns: &[String]) -> Option<&str> {
    named_column(columns, "class")
}

/// The numeric score column, conventionally `quiz_score`.
pub fn score_column(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .find(|c| c.to_lowercase().contains("score"))
        .map(|c| c.as_str())
}

/// The score column if present, else the last listed column. The fallback
/// keeps superlative heuristics total even on unconventional headers.
pub fn score_column_or_last(columns: &[String]) -> Option<&str> {
    score_column(columns).or_else(|| columns.last().map(|c| c.as_str()))
}

/// The Yes/No homework-submission column.
pub fn submission_column(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            lower.contains("submitted") || lower.contains("homework")
        })
        .map(|c| c.as_str())
}

pub fn attendance_column(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .find(|c| c.to_lowercase().contains("attendance"))
        .map(|c| c.as_str())
}

fn named_column<'a>(columns: &'a [String], name: &str) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
        .or_else(|| columns.iter().find(|c| c.to_lowercase().contains(name)))
        .map(|c| c.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_columns() -> Vec<String> {
        ["student_id", "name", "grade", "class", "quiz_score", "homework_submitted"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn parse_cell_types() {
        assert_eq!(parse_cell("42"), Value::Number(42.into()));
        assert_eq!(parse_cell(" 3.5 "), serde_json::json!(3.5));
        assert_eq!(parse_cell("Yes"), Value::String("Yes".to_string()));
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("   "), Value::Null);
    }

    #[test]
    fn numeric_extraction() {
        assert_eq!(numeric(&serde_json::json!(90)), Some(90.0));
        assert_eq!(numeric(&serde_json::json!("77")), Some(77.0));
        assert_eq!(numeric(&serde_json::json!("A")), None);
        assert_eq!(numeric(&Value::Null), None);
    }

    #[test]
    fn load_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_id,name,grade,class,quiz_score,homework_submitted").unwrap();
        writeln!(file, "S1,Asha,8,A,90,No").unwrap();
        writeln!(file, "S2,Ben,8,A,70,Yes").unwrap();
        writeln!(file, "S3,Cleo,9,B,,Yes").unwrap();

        let dataset = Dataset::from_csv_path(file.path()).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.columns().len(), 6);
        assert_eq!(dataset.rows()[0]["grade"], Value::Number(8.into()));
        assert_eq!(dataset.rows()[0]["quiz_score"], Value::Number(90.into()));
        assert_eq!(dataset.rows()[2]["quiz_score"], Value::Null);
    }

    #[test]
    fn load_rejects_missing_required_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_id,name,quiz_score").unwrap();
        writeln!(file, "S1,Asha,90").unwrap();

        let err = Dataset::from_csv_path(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn("grade")));
    }

    #[test]
    fn column_heuristics() {
        let columns = sample_columns();
        assert_eq!(grade_column(&columns), Some("grade"));
        assert_eq!(class_column(&columns), Some("class"));
        assert_eq!(score_column(&columns), Some("quiz_score"));
        assert_eq!(submission_column(&columns), Some("homework_submitted"));
        assert_eq!(attendance_column(&columns), None);
    }

    #[test]
    fn score_fallback_is_last_column() {
        let columns: Vec<String> = ["name", "grade", "class", "points"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(score_column(&columns), None);
        assert_eq!(score_column_or_last(&columns), Some("points"));
    }

    #[test]
    fn resolve_column_is_case_insensitive() {
        let columns = sample_columns();
        assert_eq!(resolve_column(&columns, "quiz_score"), Some("quiz_score"));
        assert_eq!(resolve_column(&columns, "Quiz_Score"), Some("quiz_score"));
        assert_eq!(resolve_column(&columns, "missing"), None);
    }
}
