//! Language-model capability used to answer questions.

pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("language model request failed: {0}")]
    RequestFailed(String),

    #[error("language model returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid language model response: {0}")]
    InvalidResponse(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),
}

/// Turns a rendered prompt into raw answer text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Build the model selected by `config.provider`.
pub fn create_language_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiChat::from_config(config)?)),
        other => anyhow::bail!("unknown llm provider: {other}"),
    }
}
