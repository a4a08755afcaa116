//! Text-completion collaborator interface.
//!
//! The interpretation engine treats generative AI as an opaque capability:
//! "text completion given a prompt". It may fail, time out, or return empty
//! text at any moment; callers recover by falling back to rule-based
//! interpretation and never surface these errors.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;

/// Configuration for a completion provider.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_seconds: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-flash-latest".to_string()),
            max_tokens: Some(1024),
            temperature: Some(0.1),
            timeout_seconds: 30,
        }
    }
}

pub type AiResult<T> = Result<T, CompletionError>;

/// Errors from a completion provider. All of them are recoverable from the
/// caller's point of view: interpretation falls back to rules.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider API key is missing")]
    MissingApiKey,

    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("completion response carried no text")]
    Empty,
}

/// The capability the interpreter consumes: one prompt in, one completion
/// text out. Bounded by the provider's own timeout configuration.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> AiResult<String>;
}
