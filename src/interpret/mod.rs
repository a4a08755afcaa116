//! Question interpretation.
//!
//! The model-backed path prompts a completion provider for EITHER a plain
//! filter expression OR a JSON object naming an aggregate/lookup operation,
//! then parses whichever came back into the shared condition schema. Any
//! provider failure, timeout, or empty answer falls back to the rule-based
//! path; callers always receive a valid condition.

pub mod rules;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ai::CompletionService;
use crate::condition::Condition;
use crate::session::{compact_history, HistoryEntry};

/// Which path produced the condition. Exposed through the debug envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpreterKind {
    Model,
    Rules,
}

/// A resolved interpretation, with enough provenance for debugging.
#[derive(Debug, Clone)]
pub struct Interpretation {
    pub condition: Condition,
    pub source: InterpreterKind,
    pub raw_completion: Option<String>,
}

/// Interpreter facade: model-backed when a completion service is configured,
/// rule-based otherwise and on every model failure.
pub struct Interpreter {
    completion: Option<Arc<dyn CompletionService>>,
}

/// Similarity above which two history questions count as the same turn.
const HISTORY_COMPACTION_THRESHOLD: f64 = 0.85;

impl Interpreter {
    pub fn new(completion: Option<Arc<dyn CompletionService>>) -> Self {
        Self { completion }
    }

    pub fn rules_only() -> Self {
        Self { completion: None }
    }

    pub async fn interpret(
        &self,
        question: &str,
        columns: &[String],
        history: &[HistoryEntry],
    ) -> Interpretation {
        let Some(service) = &self.completion else {
            return self.fall_back(question, columns);
        };

        let prompt = build_prompt(question, columns, history);
        match service.complete(&prompt).await {
            Ok(text) => {
                let condition = resolve_completion(&text);
                debug!(%condition, "model interpretation");
                Interpretation {
                    condition,
                    source: InterpreterKind::Model,
                    raw_completion: Some(text),
                }
            }
            Err(err) => {
                warn!(error = %err, "completion failed, using rule-based interpreter");
                self.fall_back(question, columns)
            }
        }
    }

    fn fall_back(&self, question: &str, columns: &[String]) -> Interpretation {
        Interpretation {
            condition: rules::interpret_rules(question, columns),
            source: InterpreterKind::Rules,
            raw_completion: None,
        }
    }
}

/// Turn a raw completion into a condition: clean it, try JSON, else treat
/// the whole text as a filter expression.
fn resolve_completion(text: &str) -> Condition {
    let cleaned = clean_completion(text);
    if cleaned.is_empty() {
        return Condition::unrestricted();
    }

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value @ Value::Object(_)) => Condition::from_model_value(&value),
        _ => Condition::Filter { expr: cleaned },
    }
}

/// Strip code fences (with an optional language tag), surrounding quotes and
/// "no condition" sentinels the model likes to emit.
fn clean_completion(text: &str) -> String {
    let mut cleaned = text.trim();

    if let Some(rest) = cleaned.strip_prefix("```") {
        // The first line is the fence, possibly carrying a language tag.
        cleaned = rest.split_once('\n').map_or(rest, |(_, body)| body);
    }
    if let Some(rest) = cleaned.trim_end().strip_suffix("```") {
        cleaned = rest;
    }

    let cleaned = cleaned
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim();

    match cleaned.to_lowercase().as_str() {
        "no condition" | "n/a" | "none" => String::new(),
        _ => cleaned.to_string(),
    }
}

/// Build the completion prompt: column list, compacted conversation context
/// and the contract for the two allowed answer shapes.
fn build_prompt(question: &str, columns: &[String], history: &[HistoryEntry]) -> String {
    let schema = columns.join(", ");

    let context = compact_history(history, HISTORY_COMPACTION_THRESHOLD)
        .iter()
        .map(|entry| format!("User: {}\nCondition: {}", entry.question, entry.condition))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert data analyst for a student records service. Convert the user's natural language question into a data operation over the dataset below.

Dataset columns: {schema}

Respond with EXACTLY ONE of the following, and nothing else:

1. A plain filter condition string:
   - comparisons: column == value, column != value, column > value, column >= value, column < value, column <= value
   - combine with & for AND and | for OR
   - quote string values: homework_submitted == 'No'

2. A single JSON object for aggregate operations (no markdown fences):
   {{"type": "global_aggregate", "op": "max", "column": "quiz_score"}}
   {{"type": "group_aggregate", "op": "max", "column": "quiz_score", "group_by": "class"}}
   {{"type": "conditional_lookup", "condition": "homework_submitted == 'Yes'", "column": "quiz_score"}}

Rules:
1. Return ONLY the condition string or the JSON object, no explanations
2. Only reference columns from the list above
3. For Yes/No columns compare against 'Yes' or 'No'
4. If the question is ambiguous, make reasonable assumptions
5. Return an empty string if the question cannot be converted to a condition

Conversation context:
{context}

User question: {question}"#
    )
}
