//! The query engine: validate, scope, interpret, execute, envelope.
//!
//! One engine instance owns the dataset, the session store and the result
//! cache for the process lifetime. Every request is an independent unit of
//! work over the shared read-only dataset.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::access::{scope, Role};
use crate::ai::CompletionService;
use crate::cache::{CacheStats, QueryCache};
use crate::condition::Condition;
use crate::dataset::{Dataset, Row};
use crate::executor::execute;
use crate::interpret::{Interpreter, InterpreterKind};
use crate::session::SessionStore;

/// Longest question the engine will interpret.
pub const MAX_QUESTION_LEN: usize = 500;

/// A natural-language query scoped to a caller's role.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "question")]
    pub query: String,

    pub role: Role,

    #[serde(rename = "sessionId", alias = "session_id")]
    pub session_id: String,
}

/// Provenance attached to responses in development mode.
#[derive(Debug, Clone, Serialize)]
pub struct QueryDebug {
    pub interpreter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_completion: Option<String>,
    pub parsed_condition: Condition,
}

/// The response envelope: the condition that ran, the rows it selected, and
/// when it ran.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub condition: String,
    pub results: Vec<Row>,
    pub count: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<QueryDebug>,
}

/// Errors surfaced to callers. Everything else degrades internally.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("question must be between 1 and {MAX_QUESTION_LEN} characters")]
    InvalidQuestion,

    #[error("no data available")]
    DatasetUnavailable,
}

/// Engine construction knobs, split from `Settings` so the engine stays
/// independent of the process environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_session_history: usize,
    pub cache_capacity: usize,
    pub include_debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_session_history: 10,
            cache_capacity: 100,
            include_debug: false,
        }
    }
}

pub struct QueryEngine {
    dataset: Arc<Dataset>,
    sessions: SessionStore,
    interpreter: Interpreter,
    cache: QueryCache,
    include_debug: bool,
}

impl QueryEngine {
    pub fn new(
        dataset: Arc<Dataset>,
        completion: Option<Arc<dyn CompletionService>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            dataset,
            sessions: SessionStore::new(config.max_session_history),
            interpreter: Interpreter::new(completion),
            cache: QueryCache::new(config.cache_capacity),
            include_debug: config.include_debug,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }

    /// Answer one question. Interpretation and execution failures degrade to
    /// best-effort results; only malformed requests and a missing dataset
    /// surface as errors.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, EngineError> {
        let question = request.query.trim();
        if question.is_empty() || question.chars().count() > MAX_QUESTION_LEN {
            return Err(EngineError::InvalidQuestion);
        }
        if self.dataset.is_empty() {
            return Err(EngineError::DatasetUnavailable);
        }

        info!(
            session = %request.session_id,
            role = ?request.role,
            "handling query"
        );

        let scoped = scope(&self.dataset, &request.role);
        if scoped.is_empty() {
            info!(role = ?request.role, "role scope matched no rows");
            return Ok(self.envelope(
                Condition::EmptyScope,
                Vec::new(),
                "none",
                None,
            ));
        }

        let cache_key = format!(
            "{}|{}|{}",
            request.session_id,
            request.role.cache_key(),
            question
        );
        if let Some((condition, rows)) = self.cache.get(&cache_key) {
            info!("cache hit");
            let count = rows.len();
            return Ok(QueryResponse {
                condition,
                results: rows,
                count,
                timestamp: Utc::now().to_rfc3339(),
                debug: None,
            });
        }

        let history = self.sessions.history(&request.session_id).await;
        let interpretation = self
            .interpreter
            .interpret(question, scoped.columns(), &history)
            .await;
        self.sessions
            .append(&request.session_id, question, &interpretation.condition)
            .await;

        let result = execute(&scoped, &interpretation.condition, question);
        let condition_text = interpretation.condition.to_string();
        self.cache.insert(
            cache_key,
            condition_text.clone(),
            result.rows().to_vec(),
        );

        info!(
            condition = %condition_text,
            count = result.len(),
            "query resolved"
        );

        let interpreter = match interpretation.source {
            InterpreterKind::Model => "model",
            InterpreterKind::Rules => "rules",
        };
        Ok(self.envelope(
            interpretation.condition,
            result.into_rows(),
            interpreter,
            interpretation.raw_completion,
        ))
    }

    fn envelope(
        &self,
        condition: Condition,
        results: Vec<Row>,
        interpreter: &str,
        raw_completion: Option<String>,
    ) -> QueryResponse {
        let count = results.len();
        QueryResponse {
            condition: condition.to_string(),
            results,
            count,
            timestamp: Utc::now().to_rfc3339(),
            debug: self.include_debug.then(|| QueryDebug {
                interpreter: interpreter.to_string(),
                raw_completion,
                parsed_condition: condition,
            }),
        }
    }
}
