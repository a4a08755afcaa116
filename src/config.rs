//! Application settings with environment variable support.
//!
//! The binary calls `dotenvy::dotenv()` before `Settings::from_env`, so a
//! local `.env` file is honored in development.

use std::path::PathBuf;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_title: String,
    pub api_version: String,

    pub host: String,
    pub port: u16,

    /// `development` or `production`; development enables debug envelopes.
    pub environment: String,

    /// Allowed CORS origins; `*` (or an empty list) means any origin.
    pub allowed_origins: Vec<String>,

    /// Absent key means the model-backed interpreter is disabled and every
    /// question takes the rule-based path.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub completion_timeout_seconds: u64,

    pub data_path: PathBuf,

    pub max_session_history: usize,
    pub cache_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_title: "Classroom Query Service".to_string(),
            api_version: env!("CARGO_PKG_VERSION").to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: "development".to_string(),
            allowed_origins: vec!["*".to_string()],
            gemini_api_key: None,
            gemini_model: "gemini-flash-latest".to_string(),
            completion_timeout_seconds: 30,
            data_path: PathBuf::from("data/students.csv"),
            max_session_history: 10,
            cache_capacity: 100,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(host) = std::env::var("HOST") {
            settings.host = host;
        }
        settings.port = parse_env("PORT", settings.port);
        if let Ok(environment) = std::env::var("ENVIRONMENT") {
            settings.environment = environment;
        }
        if let Ok(raw) = std::env::var("ALLOWED_ORIGINS") {
            settings.allowed_origins = raw
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        settings.gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            settings.gemini_model = model;
        }
        settings.completion_timeout_seconds = parse_env(
            "COMPLETION_TIMEOUT_SECONDS",
            settings.completion_timeout_seconds,
        );
        if let Ok(path) = std::env::var("DATA_PATH") {
            settings.data_path = PathBuf::from(path);
        }
        settings.max_session_history =
            parse_env("MAX_SESSION_HISTORY", settings.max_session_history);
        settings.cache_capacity = parse_env("CACHE_CAPACITY", settings.cache_capacity);

        settings
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Debug envelopes (raw completion, parsed condition) ship only outside
    /// production.
    pub fn include_debug(&self) -> bool {
        !self.is_production()
    }
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "unparsable setting, using default");
            default
        }),
        Err(_) => default,
    }
}
