//! HTTP surface: axum router, handlers and error mapping.
//!
//! Transport is thin plumbing over the query engine. The only error
//! responses exposed are for malformed requests and total dataset
//! unavailability; interpretation and execution failures have already been
//! degraded by the time a response is built.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::cache::CacheStats;
use crate::config::Settings;
use crate::engine::{EngineError, QueryEngine, QueryRequest, QueryResponse};
use crate::stats::{dataset_stats, DatasetStats};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub settings: Arc<Settings>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub timestamp: String,
}

type ErrorResponse = (StatusCode, Json<ErrorBody>);

fn error_response(status: StatusCode, code: &str, message: &str) -> ErrorResponse {
    (
        status,
        Json(ErrorBody {
            error: sanitize_error(message),
            code: code.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

/// Strip source locations from messages destined for clients.
fn sanitize_error(message: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?:[A-Za-z0-9_./\\-]+\.rs:?\d*)|(?:line \d+)")
            .expect("sanitize pattern is valid")
    });
    let cleaned = pattern.replace_all(message, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        "An error occurred".to_string()
    } else {
        cleaned
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(handle_stats))
        .route("/query", post(handle_query))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let any_origin = settings.allowed_origins.is_empty()
        || settings.allowed_origins.iter().any(|origin| origin == "*");
    if any_origin {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|_| warn!(origin = %origin, "invalid CORS origin, skipping"))
                .ok()
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": state.settings.api_title,
        "version": state.settings.api_version,
        "status": "operational",
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.settings.api_title,
        "version": state.settings.api_version,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub grade: Option<i64>,
    #[serde(alias = "class")]
    pub class_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub dataset: DatasetStats,
    pub cache: CacheStats,
    pub active_sessions: usize,
}

async fn handle_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, ErrorResponse> {
    let dataset = state.engine.dataset();
    if dataset.is_empty() {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "no data available",
        ));
    }
    Ok(Json(StatsResponse {
        dataset: dataset_stats(dataset, params.grade, params.class_name.as_deref()),
        cache: state.engine.cache_stats(),
        active_sessions: state.engine.session_count().await,
    }))
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ErrorResponse> {
    state
        .engine
        .query(&request)
        .await
        .map(Json)
        .map_err(|err| match err {
            EngineError::InvalidQuestion => {
                error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", &err.to_string())
            }
            EngineError::DatasetUnavailable => error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                &err.to_string(),
            ),
        })
}

/// Bind and serve until the process is stopped.
pub async fn serve(settings: Settings, engine: Arc<QueryEngine>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState {
        engine,
        settings: Arc::new(settings),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
