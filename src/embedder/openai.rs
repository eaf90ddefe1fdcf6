//! Embedder backed by an OpenAI-compatible `POST {base_url}/embeddings`.
//!
//! Failures are returned as-is; nothing here retries.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, EmbedderError};
use crate::config::EmbeddingConfig;

/// Inputs per request.
const MAX_BATCH: usize = 256;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Reads the API key from the environment variable named in the config.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedderError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EmbedderError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            &config.base_url,
            api_key,
            config.model.clone(),
            config.dimensions,
        )
    }

    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        dimensions: usize,
    ) -> Result<Self, EmbedderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbedderError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            dimensions,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        debug!("Requesting {} embeddings from {}", texts.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbedderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;
        order_embeddings(parsed, texts.len(), self.dimensions)
    }
}

/// Put response vectors back in input order and check their shape.
fn order_embeddings(
    response: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    if response.data.len() != expected {
        return Err(EmbedderError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        if item.embedding.len() != dimensions {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {dimensions} dimensions, got {}",
                item.embedding.len()
            )));
        }
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            EmbedderError::InvalidResponse(format!("index {} out of range", item.index))
        })?;
        *slot = Some(item.embedding);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| EmbedderError::InvalidResponse(format!("missing embedding {i}")))
        })
        .collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
