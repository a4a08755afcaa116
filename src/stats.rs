//! Read-only statistics projection over the dataset.
//!
//! Not part of the interpretation engine; this backs the `/stats` endpoint
//! and never mutates anything.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::access::{scope, Role};
use crate::dataset::{
    class_column, grade_column, numeric, score_column, submission_column, Dataset,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub total_records: usize,
    pub filtered_records: usize,
    pub columns: Vec<String>,
    pub grades: Vec<i64>,
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_quiz_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homework_submitted_count: Option<usize>,
    pub column_stats: BTreeMap<String, NumericSummary>,
}

/// Project dataset-wide statistics, plus the record count remaining under
/// the optional grade/class filters.
pub fn dataset_stats(dataset: &Dataset, grade: Option<i64>, class: Option<&str>) -> DatasetStats {
    let role = Role {
        grade,
        class: class.map(str::to_string),
    };
    let filtered_records = scope(dataset, &role).len();

    let grades = grade_column(dataset.columns())
        .map(|column| {
            let mut grades: Vec<i64> = dataset
                .rows()
                .iter()
                .filter_map(|row| row.get(column).and_then(numeric))
                .map(|value| value as i64)
                .collect();
            grades.sort_unstable();
            grades.dedup();
            grades
        })
        .unwrap_or_default();

    let classes = class_column(dataset.columns())
        .map(|column| {
            let mut classes: Vec<String> = dataset
                .rows()
                .iter()
                .filter_map(|row| row.get(column).and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect();
            classes.sort();
            classes.dedup();
            classes
        })
        .unwrap_or_default();

    let average_quiz_score = score_column(dataset.columns())
        .and_then(|column| column_summary(dataset, column))
        .map(|summary| summary.avg);

    let homework_submitted_count = submission_column(dataset.columns()).map(|column| {
        dataset
            .rows()
            .iter()
            .filter(|row| row.get(column).and_then(|v| v.as_str()) == Some("Yes"))
            .count()
    });

    let column_stats = dataset
        .columns()
        .iter()
        .filter_map(|column| {
            column_summary(dataset, column).map(|summary| (column.clone(), summary))
        })
        .collect();

    DatasetStats {
        total_records: dataset.len(),
        filtered_records,
        columns: dataset.columns().to_vec(),
        grades,
        classes,
        average_quiz_score,
        homework_submitted_count,
        column_stats,
    }
}

fn column_summary(dataset: &Dataset, column: &str) -> Option<NumericSummary> {
    let values: Vec<f64> = dataset
        .rows()
        .iter()
        .filter_map(|row| row.get(column).and_then(numeric))
        .collect();
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(NumericSummary {
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        avg: sum / values.len() as f64,
        count: values.len(),
    })
}
