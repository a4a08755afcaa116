//! Classroom Query - role-scoped natural-language queries over student records.
//!
//! A question and a caller role come in; the role scopes the dataset, an
//! interpreter (model-backed with a deterministic rule-based fallback) turns
//! the question into a structured condition, and the executor applies it to
//! the scoped view. The caller always gets a best-effort result set: model
//! failures fall back to rules, malformed conditions degrade to the
//! unfiltered scope, and only empty questions or a missing dataset surface
//! as errors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use classroom_query::{Dataset, EngineConfig, QueryEngine, QueryRequest, Role};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let dataset = Arc::new(Dataset::from_csv_path("data/students.csv")?);
//! let engine = QueryEngine::new(dataset, None, EngineConfig::default());
//!
//! let response = engine
//!     .query(&QueryRequest {
//!         query: "who hasn't submitted homework".to_string(),
//!         role: Role { grade: Some(8), class: None },
//!         session_id: "demo".to_string(),
//!     })
//!     .await?;
//! println!("{} rows via {}", response.count, response.condition);
//! # Ok(())
//! # }
//! ```

// Role-based scoping
pub mod access;

// Text-completion collaborator (Gemini client + trait seam)
pub mod ai;

// Bounded result cache
pub mod cache;

// Structured condition schema
pub mod condition;

// Environment-driven settings
pub mod config;

// CSV-backed immutable dataset
pub mod dataset;

// Request orchestration
pub mod engine;

// Condition execution
pub mod executor;

// Filter expression language
pub mod expr;

// Question interpretation (model-backed + rule-based)
pub mod interpret;

// HTTP surface
pub mod server;

// Per-caller conversational memory
pub mod session;

// Read-only statistics projection
pub mod stats;

pub use access::{scope, Role};
pub use ai::{AiConfig, CompletionError, CompletionService, GeminiClient};
pub use cache::{CacheStats, QueryCache};
pub use condition::{AggregateOp, Condition};
pub use config::Settings;
pub use dataset::{Dataset, DatasetError, Row};
pub use engine::{
    EngineConfig, EngineError, QueryEngine, QueryRequest, QueryResponse, MAX_QUESTION_LEN,
};
pub use executor::execute;
pub use interpret::{rules::interpret_rules, Interpretation, Interpreter, InterpreterKind};
pub use session::SessionStore;
pub use stats::{dataset_stats, DatasetStats};
