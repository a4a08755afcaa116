//! Classroom Query REST API server.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server (rule-based interpretation only)
//! cargo run --bin query_server
//!
//! # With the model-backed interpreter
//! GEMINI_API_KEY=... cargo run --bin query_server
//!
//! # Ask a question
//! curl -X POST http://localhost:8000/query \
//!   -H "Content-Type: application/json" \
//!   -d '{"query": "who hasn'"'"'t submitted homework", "role": {"grade": 8}, "sessionId": "demo"}'
//!
//! curl http://localhost:8000/stats
//! curl http://localhost:8000/health
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use classroom_query::ai::{AiConfig, CompletionService, GeminiClient};
use classroom_query::{Dataset, EngineConfig, QueryEngine, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("classroom_query=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env();

    let dataset = match Dataset::from_csv_path(&settings.data_path) {
        Ok(dataset) => {
            info!(
                path = %settings.data_path.display(),
                records = dataset.len(),
                "loaded student records"
            );
            dataset
        }
        Err(err) => {
            error!(
                path = %settings.data_path.display(),
                error = %err,
                "dataset unavailable, requests will answer 503 until corrected"
            );
            Dataset::empty()
        }
    };

    let completion: Option<Arc<dyn CompletionService>> = match &settings.gemini_api_key {
        Some(api_key) => {
            let config = AiConfig {
                api_key: api_key.clone(),
                model: settings.gemini_model.clone(),
                timeout_seconds: settings.completion_timeout_seconds,
                ..AiConfig::default()
            };
            match GeminiClient::new(config) {
                Ok(client) => {
                    info!(model = %settings.gemini_model, "model-backed interpreter enabled");
                    Some(Arc::new(client))
                }
                Err(err) => {
                    warn!(error = %err, "completion client unavailable, using rules only");
                    None
                }
            }
        }
        None => {
            info!("GEMINI_API_KEY not set, using rule-based interpretation only");
            None
        }
    };

    let engine = Arc::new(QueryEngine::new(
        Arc::new(dataset),
        completion,
        EngineConfig {
            max_session_history: settings.max_session_history,
            cache_capacity: settings.cache_capacity,
            include_debug: settings.include_debug(),
        },
    ));

    classroom_query::server::serve(settings, engine).await
}
