//! Role-based scoping of the dataset.
//!
//! A role restricts the rows a caller may see along the grade and class
//! dimensions. Scoping always succeeds: an over-restrictive role yields an
//! empty view, never an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{class_column, grade_column, numeric, Dataset};

/// A caller's permitted slice of the dataset. `None` on a dimension means
/// "no restriction"; an empty role is the identity filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub grade: Option<i64>,

    #[serde(default, rename = "class_name", alias = "class")]
    pub class: Option<String>,
}

impl Role {
    pub fn is_unrestricted(&self) -> bool {
        self.grade.is_none() && self.class.is_none()
    }

    /// Stable key fragment for cache lookups.
    pub(crate) fn cache_key(&self) -> String {
        format!(
            "g={};c={}",
            self.grade.map_or_else(|| "*".to_string(), |g| g.to_string()),
            self.class.as_deref().unwrap_or("*"),
        )
    }
}

/// Restrict `dataset` to the rows `role` is permitted to see. Present
/// dimensions are conjoined; a dimension whose column is absent from the
/// dataset matches nothing rather than failing the request.
pub fn scope(dataset: &Dataset, role: &Role) -> Dataset {
    if dataset.is_empty() || role.is_unrestricted() {
        return dataset.clone();
    }

    let grade_col = grade_column(dataset.columns());
    let class_col = class_column(dataset.columns());

    let rows: Vec<_> = dataset
        .rows()
        .iter()
        .filter(|row| {
            if let Some(grade) = role.grade {
                let matches = grade_col
                    .and_then(|col| row.get(col))
                    .and_then(numeric)
                    .map(|value| value == grade as f64)
                    .unwrap_or(false);
                if !matches {
                    return false;
                }
            }
            if let Some(class) = role.class.as_deref() {
                let matches = class_col
                    .and_then(|col| row.get(col))
                    .and_then(|value| value.as_str())
                    .map(|value| value == class)
                    .unwrap_or(false);
                if !matches {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    debug!(
        total = dataset.len(),
        scoped = rows.len(),
        ?role,
        "applied role scope"
    );
    dataset.with_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let columns: Vec<String> = ["name", "grade", "class", "quiz_score"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            row(json!({"name": "Asha", "grade": 8, "class": "A", "quiz_score": 90})),
            row(json!({"name": "Ben", "grade": 8, "class": "B", "quiz_score": 70})),
            row(json!({"name": "Cleo", "grade": 9, "class": "A", "quiz_score": 85})),
        ];
        Dataset::from_rows(columns, rows)
    }

    fn row(value: serde_json::Value) -> crate::dataset::Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn unrestricted_role_is_identity() {
        let ds = dataset();
        let scoped = scope(&ds, &Role::default());
        assert_eq!(scoped.len(), ds.len());
    }

    #[test]
    fn grade_dimension_restricts_rows() {
        let scoped = scope(&dataset(), &Role { grade: Some(8), class: None });
        assert_eq!(scoped.len(), 2);
        for row in scoped.rows() {
            assert_eq!(row["grade"], json!(8));
        }
    }

    #[test]
    fn dimensions_are_conjoined() {
        let role = Role {
            grade: Some(8),
            class: Some("B".to_string()),
        };
        let scoped = scope(&dataset(), &role);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped.rows()[0]["name"], json!("Ben"));
    }

    #[test]
    fn scoping_is_idempotent() {
        let role = Role { grade: Some(8), class: None };
        let once = scope(&dataset(), &role);
        let twice = scope(&once, &role);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn unsatisfiable_role_yields_empty_view() {
        let scoped = scope(&dataset(), &Role { grade: Some(12), class: None });
        assert!(scoped.is_empty());
        assert_eq!(scoped.columns().len(), 4);
    }

    #[test]
    fn role_accepts_class_alias() {
        let role: Role = serde_json::from_str(r#"{"grade": 8, "class": "A"}"#).unwrap();
        assert_eq!(role.class.as_deref(), Some("A"));
        let role: Role = serde_json::from_str(r#"{"class_name": "B"}"#).unwrap();
        assert_eq!(role.class.as_deref(), Some("B"));
    }
}
