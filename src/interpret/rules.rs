//! Deterministic, offline question interpretation.
//!
//! Keyword heuristics map a question to a structured condition without any
//! external help. This is the required fallback whenever the model-backed
//! path is unavailable or errors: it never fails and never blocks.

use std::sync::OnceLock;

use regex::Regex;

use crate::condition::{AggregateOp, Condition};
use crate::dataset::{
    attendance_column, grade_column, score_column_or_last, submission_column,
};

/// Keywords implying "best in the set". Also drives the executor's topper
/// overlay and its keyword re-derivation.
pub const SUPERLATIVE_HIGH: &[&str] = &[
    "highest", "topper", "best", "maximum", "top mark", "high score",
];

/// Keywords implying "worst in the set".
pub const SUPERLATIVE_LOW: &[&str] = &["lowest", "least", "minimum", "weak"];

const NEGATED_SUBMISSION: &[&str] = &[
    "not submitted",
    "didn't",
    "hasn't",
    "haven't",
    "not done",
    "no homework",
];

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn grade_mention(question: &str) -> Option<i64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\bgrade\s*(\d+)\b").expect("grade pattern is valid")
    });
    pattern
        .captures(question)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map a question to a structured condition by keyword matching,
/// case-insensitive, in fixed priority order (first match wins). Heuristics
/// that reference a column the dataset lacks are skipped.
pub fn interpret_rules(question: &str, columns: &[String]) -> Condition {
    let q = question.to_lowercase();

    if contains_any(&q, SUPERLATIVE_HIGH) {
        if let Some(column) = score_column_or_last(columns) {
            return Condition::GlobalAggregate {
                op: AggregateOp::Max,
                column: column.to_string(),
            };
        }
    }

    if contains_any(&q, SUPERLATIVE_LOW) {
        if let Some(column) = score_column_or_last(columns) {
            return Condition::GlobalAggregate {
                op: AggregateOp::Min,
                column: column.to_string(),
            };
        }
    }

    if let Some(column) = submission_column(columns) {
        if contains_any(&q, NEGATED_SUBMISSION) {
            return Condition::Filter {
                expr: format!("{column} == 'No'"),
            };
        }
        if q.contains("submitted") {
            return Condition::Filter {
                expr: format!("{column} == 'Yes'"),
            };
        }
    }

    if q.contains("absent") {
        if let Some(column) = attendance_column(columns) {
            return Condition::Filter {
                expr: format!("{column} == 'Absent'"),
            };
        }
    }

    if let Some(grade) = grade_mention(&q) {
        if let Some(column) = grade_column(columns) {
            return Condition::Filter {
                expr: format!("{column} == {grade}"),
            };
        }
    }

    Condition::unrestricted()
}
