//! Condition execution against a scoped view.
//!
//! Execution is best-effort and never fatal to a request: malformed
//! expressions degrade to the unfiltered scoped view, unknown aggregate
//! operators re-derive intent from the question, and a failed conditional
//! lookup returns the scoped view rather than an empty result. The only
//! hard short-circuit is `EmptyScope`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::condition::{AggregateOp, Condition};
use crate::dataset::{
    class_column, grade_column, numeric, resolve_column, score_column, score_column_or_last,
    Dataset,
};
use crate::expr::{self, Literal};
use crate::interpret::rules::{contains_any, SUPERLATIVE_HIGH, SUPERLATIVE_LOW};

/// Apply `condition` to the scoped view. `question` feeds the post-filter
/// topper overlay and the keyword re-derivation of unresolved aggregates.
pub fn execute(view: &Dataset, condition: &Condition, question: &str) -> Dataset {
    match condition {
        Condition::EmptyScope => view.with_rows(Vec::new()),

        Condition::Filter { expr } => {
            let filtered = apply_filter(view, expr);
            topper_overlay(filtered, question)
        }

        Condition::GlobalAggregate { op, column } => match op {
            AggregateOp::Max | AggregateOp::Min => extreme_rows(view, column, op)
                .unwrap_or_else(|| unresolved_default(view, question)),
            AggregateOp::Other(token) => {
                warn!(op = %token, "unresolved aggregate operator, re-deriving from question");
                unresolved_default(view, question)
            }
        },

        Condition::GroupAggregate {
            op,
            column,
            group_by,
        } => match op {
            AggregateOp::Max | AggregateOp::Min => group_extreme_rows(view, column, group_by, op)
                .unwrap_or_else(|| unresolved_default(view, question)),
            AggregateOp::Other(token) => {
                warn!(op = %token, "unresolved aggregate operator, re-deriving from question");
                unresolved_default(view, question)
            }
        },

        Condition::ConditionalLookup { filter, column } => {
            conditional_lookup(view, filter, column)
        }
    }
}

/// Evaluate a filter expression over every row. Empty expressions pass the
/// view through; parse or evaluation failures degrade to the unfiltered view.
fn apply_filter(view: &Dataset, raw_expr: &str) -> Dataset {
    let trimmed = raw_expr.trim();
    if trimmed.is_empty() {
        return view.clone();
    }

    let mut parsed = match expr::parse(trimmed) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(expr = trimmed, error = %err, "unparsable filter expression, returning scoped view");
            return view.clone();
        }
    };

    rewrite_class_comparisons(&mut parsed, view);

    let mut rows = Vec::with_capacity(view.len());
    for row in view.rows() {
        match parsed.eval(row) {
            Ok(true) => rows.push(row.clone()),
            Ok(false) => {}
            Err(err) => {
                warn!(expr = trimmed, error = %err, "filter evaluation failed, returning scoped view");
                return view.clone();
            }
        }
    }
    view.with_rows(rows)
}

/// Questions routinely say "class 8" when they mean the numeric grade. A
/// numeric comparison against the class column (a textual label) is
/// redirected to the grade column before evaluation.
fn rewrite_class_comparisons(parsed: &mut expr::Expr, view: &Dataset) {
    let (Some(class_col), Some(grade_col)) = (
        class_column(view.columns()),
        grade_column(view.columns()),
    ) else {
        return;
    };

    parsed.rewrite_columns(&|column, value| {
        (column.eq_ignore_ascii_case(class_col) && matches!(value, Literal::Number(_)))
            .then(|| grade_col.to_string())
    });
}

/// Post-filter stage: a question asking for the "topper"/"highest" narrows
/// an already-filtered result to the rows at the maximum score. Runs only
/// after filtering and only when the result still carries a score column.
fn topper_overlay(result: Dataset, question: &str) -> Dataset {
    if result.is_empty() {
        return result;
    }
    if !contains_any(&question.to_lowercase(), SUPERLATIVE_HIGH) {
        return result;
    }
    let Some(score) = score_column(result.columns()) else {
        return result;
    };
    let score = score.to_string();
    match extreme_rows(&result, &score, &AggregateOp::Max) {
        Some(narrowed) => {
            debug!(
                before = result.len(),
                after = narrowed.len(),
                "applied topper overlay"
            );
            narrowed
        }
        None => result,
    }
}

/// Rows whose `column` equals the view-wide extreme, ties included. None
/// when the column is missing or holds no numeric values.
fn extreme_rows(view: &Dataset, column: &str, op: &AggregateOp) -> Option<Dataset> {
    let column = resolve_column(view.columns(), column)?;

    let values: Vec<f64> = view
        .rows()
        .iter()
        .filter_map(|row| row.get(column).and_then(numeric))
        .collect();
    if values.is_empty() {
        return None;
    }

    let extreme = match op {
        AggregateOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateOp::Other(_) => return None,
    };

    let rows = view
        .rows()
        .iter()
        .filter(|row| row.get(column).and_then(numeric) == Some(extreme))
        .cloned()
        .collect();
    Some(view.with_rows(rows))
}

/// Rows whose `column` equals the extreme within their `group_by` partition.
fn group_extreme_rows(
    view: &Dataset,
    column: &str,
    group_by: &str,
    op: &AggregateOp,
) -> Option<Dataset> {
    if matches!(op, AggregateOp::Other(_)) {
        return None;
    }
    let column = resolve_column(view.columns(), column)?;
    let group_by = resolve_column(view.columns(), group_by)?;

    let mut extremes: HashMap<String, f64> = HashMap::new();
    for row in view.rows() {
        let Some(key) = row.get(group_by).filter(|v| !v.is_null()).map(group_key) else {
            continue;
        };
        let Some(value) = row.get(column).and_then(numeric) else {
            continue;
        };
        extremes
            .entry(key)
            .and_modify(|current| {
                *current = match op {
                    AggregateOp::Max => current.max(value),
                    AggregateOp::Min => current.min(value),
                    AggregateOp::Other(_) => *current,
                }
            })
            .or_insert(value);
    }
    if extremes.is_empty() {
        return None;
    }

    let rows = view
        .rows()
        .iter()
        .filter(|row| {
            let Some(key) = row.get(group_by).filter(|v| !v.is_null()).map(group_key) else {
                return false;
            };
            row.get(column).and_then(numeric) == extremes.get(&key).copied()
        })
        .cloned()
        .collect();
    Some(view.with_rows(rows))
}

fn group_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Filter first, then take the subset max of `column`. A failed lookup
/// (empty subset, missing column, nothing numeric) returns the full scoped
/// view unchanged, never an empty result.
fn conditional_lookup(view: &Dataset, filter: &str, column: &str) -> Dataset {
    let subset = apply_filter(view, filter);
    if subset.is_empty() {
        debug!("conditional lookup matched nothing, returning scoped view");
        return view.clone();
    }
    match extreme_rows(&subset, column, &AggregateOp::Max) {
        Some(rows) => rows,
        None => view.clone(),
    }
}

/// Re-derive intent from question keywords when an aggregate cannot run as
/// specified: superlative keywords pick the operator, a class/section or
/// grade mention picks the grouping, and the score column is the target.
fn unresolved_default(view: &Dataset, question: &str) -> Dataset {
    let q = question.to_lowercase();
    let high = contains_any(&q, SUPERLATIVE_HIGH);
    let low = contains_any(&q, SUPERLATIVE_LOW);
    if !high && !low {
        debug!("no superlative keywords to re-derive from, returning scoped view");
        return view.clone();
    }
    let op = if high { AggregateOp::Max } else { AggregateOp::Min };

    let Some(column) = score_column_or_last(view.columns()) else {
        return view.clone();
    };

    let group = if q.contains("class") || q.contains("section") {
        class_column(view.columns())
    } else if q.contains("grade") {
        grade_column(view.columns())
    } else {
        None
    };

    match group {
        Some(group_by) => group_extreme_rows(view, column, group_by, &op)
            .unwrap_or_else(|| view.clone()),
        None => extreme_rows(view, column, &op).unwrap_or_else(|| view.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Row;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn view() -> Dataset {
        let columns: Vec<String> =
            ["name", "grade", "class", "quiz_score", "homework_submitted"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        Dataset::from_rows(
            columns,
            vec![
                row(json!({"name": "Asha", "grade": 8, "class": "A", "quiz_score": 90, "homework_submitted": "No"})),
                row(json!({"name": "Ben", "grade": 8, "class": "A", "quiz_score": 70, "homework_submitted": "Yes"})),
                row(json!({"name": "Cleo", "grade": 8, "class": "B", "quiz_score": 85, "homework_submitted": "Yes"})),
                row(json!({"name": "Dev", "grade": 8, "class": "B", "quiz_score": 85, "homework_submitted": "No"})),
            ],
        )
    }

    fn filter(expr: &str) -> Condition {
        Condition::Filter {
            expr: expr.to_string(),
        }
    }

    #[test]
    fn empty_scope_short_circuits() {
        let result = execute(&view(), &Condition::EmptyScope, "who is the topper");
        assert!(result.is_empty());
    }

    #[test]
    fn empty_filter_passes_view_through() {
        let result = execute(&view(), &filter(""), "show everyone");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn filter_selects_matching_rows() {
        let result = execute(&view(), &filter("homework_submitted == 'No'"), "who hasn't submitted");
        assert_eq!(result.len(), 2);
        for row in result.rows() {
            assert_eq!(row["homework_submitted"], json!("No"));
        }
    }

    #[test]
    fn malformed_filter_degrades_to_unfiltered_view() {
        let result = execute(&view(), &filter("DROP TABLE students"), "anything");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn unknown_column_degrades_to_unfiltered_view() {
        let result = execute(&view(), &filter("attendance == 'Absent'"), "who was absent");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn numeric_class_comparison_is_rewritten_to_grade() {
        let result = execute(&view(), &filter("class == 8"), "class 8 students");
        assert_eq!(result.len(), 4);

        let result = execute(&view(), &filter("class == 'A'"), "class A students");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn global_max_includes_ties() {
        let narrowed = Dataset::from_rows(
            view().columns().to_vec(),
            view().rows()[2..].to_vec(),
        );
        let condition = Condition::GlobalAggregate {
            op: AggregateOp::Max,
            column: "quiz_score".to_string(),
        };
        let result = execute(&narrowed, &condition, "who is the topper");
        assert_eq!(result.len(), 2);
        for row in result.rows() {
            assert_eq!(row["quiz_score"], json!(85));
        }
    }

    #[test]
    fn global_min() {
        let condition = Condition::GlobalAggregate {
            op: AggregateOp::Min,
            column: "quiz_score".to_string(),
        };
        let result = execute(&view(), &condition, "lowest score");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0]["name"], json!("Ben"));
    }

    #[test]
    fn group_max_returns_each_partition_extreme() {
        let condition = Condition::GroupAggregate {
            op: AggregateOp::Max,
            column: "quiz_score".to_string(),
            group_by: "class".to_string(),
        };
        let result = execute(&view(), &condition, "best in each class");
        // Class A: Asha (90). Class B: Cleo and Dev tie at 85.
        assert_eq!(result.len(), 3);
        for row in result.rows() {
            match row["class"].as_str().unwrap() {
                "A" => assert_eq!(row["quiz_score"], json!(90)),
                "B" => assert_eq!(row["quiz_score"], json!(85)),
                other => panic!("unexpected class {other}"),
            }
        }
    }

    #[test]
    fn conditional_lookup_takes_subset_max() {
        let condition = Condition::ConditionalLookup {
            filter: "homework_submitted == 'Yes'".to_string(),
            column: "quiz_score".to_string(),
        };
        let result = execute(&view(), &condition, "top scorer among submitters");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0]["name"], json!("Cleo"));
    }

    #[test]
    fn conditional_lookup_falls_back_to_view_on_empty_subset() {
        let condition = Condition::ConditionalLookup {
            filter: "quiz_score > 1000".to_string(),
            column: "quiz_score".to_string(),
        };
        let result = execute(&view(), &condition, "anything");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn conditional_lookup_falls_back_on_missing_column() {
        let condition = Condition::ConditionalLookup {
            filter: "homework_submitted == 'Yes'".to_string(),
            column: "attendance".to_string(),
        };
        let result = execute(&view(), &condition, "anything");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn topper_overlay_narrows_filtered_results() {
        let result = execute(
            &view(),
            &filter("homework_submitted == 'Yes'"),
            "who is the topper among students who submitted",
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0]["name"], json!("Cleo"));
    }

    #[test]
    fn topper_overlay_only_runs_on_superlative_questions() {
        let result = execute(
            &view(),
            &filter("homework_submitted == 'Yes'"),
            "who submitted homework",
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn topper_overlay_is_noop_without_score_column() {
        let columns: Vec<String> = ["name", "grade", "class"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let no_score = Dataset::from_rows(
            columns,
            vec![
                row(json!({"name": "Asha", "grade": 8, "class": "A"})),
                row(json!({"name": "Ben", "grade": 8, "class": "A"})),
            ],
        );
        let result = execute(&no_score, &filter(""), "who is the best");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn unknown_operator_rederives_from_question() {
        let condition = Condition::GlobalAggregate {
            op: AggregateOp::Other("median".to_string()),
            column: "quiz_score".to_string(),
        };
        let result = execute(&view(), &condition, "who has the highest score");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0]["name"], json!("Asha"));
    }

    #[test]
    fn unknown_operator_groups_by_class_when_question_mentions_it() {
        let condition = Condition::GlobalAggregate {
            op: AggregateOp::Other("argmax".to_string()),
            column: "quiz_score".to_string(),
        };
        let result = execute(&view(), &condition, "best student in each class");
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn unknown_operator_without_keywords_returns_view() {
        let condition = Condition::GlobalAggregate {
            op: AggregateOp::Other("median".to_string()),
            column: "quiz_score".to_string(),
        };
        let result = execute(&view(), &condition, "show the students");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn missing_aggregate_column_rederives() {
        let condition = Condition::GlobalAggregate {
            op: AggregateOp::Max,
            column: "marks".to_string(),
        };
        let result = execute(&view(), &condition, "who is the topper");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0]["name"], json!("Asha"));
    }

    #[test]
    fn missing_group_column_rederives() {
        let condition = Condition::GroupAggregate {
            op: AggregateOp::Max,
            column: "quiz_score".to_string(),
            group_by: "homeroom".to_string(),
        };
        let result = execute(&view(), &condition, "weakest student");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0]["name"], json!("Ben"));
    }
}
