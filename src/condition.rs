//! The structured condition: the intermediate representation between
//! question interpretation and data execution.
//!
//! A condition is a pure value. It carries no reference to the dataset it
//! will run against, and exactly one variant is active per instance. Both
//! interpreters produce this type; the executor consumes it with an
//! exhaustive match.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

/// Aggregation operator. Operators outside the known vocabulary are carried
/// through as data; the executor resolves them from question keywords instead
/// of failing the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOp {
    Max,
    Min,
    Other(String),
}

impl AggregateOp {
    /// Parse a model-supplied operator token. `global_`/`group_` prefixes and
    /// common synonyms are normalized; anything else is preserved verbatim.
    pub fn from_token(token: &str) -> Self {
        let normalized = token.trim().to_lowercase();
        let bare = normalized
            .strip_prefix("global_")
            .or_else(|| normalized.strip_prefix("group_"))
            .unwrap_or(&normalized);
        match bare {
            "max" | "maximum" | "highest" | "top" => AggregateOp::Max,
            "min" | "minimum" | "lowest" | "least" => AggregateOp::Min,
            _ => AggregateOp::Other(token.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AggregateOp::Max => "max",
            AggregateOp::Min => "min",
            AggregateOp::Other(token) => token,
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AggregateOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The closed set of data operations the engine knows how to execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Boolean comparison expression over columns; empty means "no
    /// restriction beyond role scope".
    Filter { expr: String },

    /// All rows whose `column` equals the view-wide max/min.
    GlobalAggregate { op: AggregateOp, column: String },

    /// All rows whose `column` equals the max/min within their `group_by`
    /// partition.
    GroupAggregate {
        op: AggregateOp,
        column: String,
        group_by: String,
    },

    /// Apply `filter`, then select rows at the max of `column` within the
    /// surviving subset.
    ConditionalLookup { filter: String, column: String },

    /// The scoped dataset itself was empty; execution short-circuits.
    EmptyScope,
}

impl Condition {
    /// The trivial filter: scoped view passes through unchanged.
    pub fn unrestricted() -> Self {
        Condition::Filter {
            expr: String::new(),
        }
    }

    /// Interpret a parsed model completion as a structured condition.
    ///
    /// The object's `type` tag defaults to `filter` when absent. Unknown
    /// tags degrade to the unrestricted filter rather than erroring; unknown
    /// aggregate operators travel through as `AggregateOp::Other`.
    pub fn from_model_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Condition::unrestricted();
        };

        let tag = object
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("filter")
            .trim()
            .to_lowercase();

        let text_field = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|k| object.get(*k).and_then(Value::as_str))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let op = || {
            object
                .get("op")
                .and_then(Value::as_str)
                .map(AggregateOp::from_token)
                .unwrap_or(AggregateOp::Max)
        };

        match tag.as_str() {
            "filter" => Condition::Filter {
                expr: text_field(&["expr", "condition", "expression"]),
            },
            "global_aggregate" => Condition::GlobalAggregate {
                op: op(),
                column: text_field(&["column"]),
            },
            "group_aggregate" => Condition::GroupAggregate {
                op: op(),
                column: text_field(&["column"]),
                group_by: text_field(&["group_by", "groupBy"]),
            },
            // Bare "aggregate" shows up often enough; disambiguate on group_by.
            "aggregate" => {
                let group_by = text_field(&["group_by", "groupBy"]);
                if group_by.is_empty() {
                    Condition::GlobalAggregate {
                        op: op(),
                        column: text_field(&["column"]),
                    }
                } else {
                    Condition::GroupAggregate {
                        op: op(),
                        column: text_field(&["column"]),
                        group_by,
                    }
                }
            }
            "conditional_lookup" | "lookup" => Condition::ConditionalLookup {
                filter: text_field(&["condition", "filter", "expr"]),
                column: text_field(&["column"]),
            },
            other => {
                warn!(tag = other, "unrecognized condition type from model");
                Condition::unrestricted()
            }
        }
    }
}

/// Human-readable rendering for the response envelope. `Filter` echoes its
/// expression verbatim so callers see exactly what ran; the empty scope
/// renders empty, matching the zero-result envelope.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Filter { expr } => f.write_str(expr),
            Condition::GlobalAggregate { op, column } => write!(f, "{op}({column})"),
            Condition::GroupAggregate {
                op,
                column,
                group_by,
            } => write!(f, "{op}({column}) by {group_by}"),
            Condition::ConditionalLookup { filter, column } => {
                write!(f, "max({column}) where {filter}")
            }
            Condition::EmptyScope => Ok(()),
        }
    }
}
