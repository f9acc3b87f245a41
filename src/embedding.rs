//! Embedding backends and the retry layer.
//!
//! Concrete [`EmbeddingProvider`] implementations:
//! - **hashing**: [`HashingEmbedder`] from the core crate; offline and deterministic.
//! - **openai**: [`OpenAiEmbedder`], `POST /v1/embeddings` on an OpenAI-compatible API.
//! - **ollama**: [`OllamaEmbedder`], `POST /api/embed` on a local Ollama instance.
//! - **local**: `LocalEmbedder`, fastembed inference (feature `local-embeddings-fastembed`).
//!
//! Providers only classify failures; [`RetryingEmbedder`] owns batching,
//! input preprocessing, dimensionality checks, and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Malformed responses and wrong dimensionality → fail immediately
//! - Backoff before attempt `n + 1`: `min(base_delay * 2^(n-1), max_delay)`

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use resume_index_core::embedding::{preprocess, EmbeddingProvider, HashingEmbedder, ProviderError};
use resume_index_core::Error;

use crate::config::EmbeddingConfig;

fn classify_status(status: reqwest::StatusCode, body: String, backend: &str) -> ProviderError {
    let message = format!("{backend} API error {status}: {body}");
    if status.as_u16() == 429 || status.is_server_error() {
        ProviderError::Transient(message)
    } else {
        ProviderError::Permanent(message)
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn post_json(
    request: reqwest::RequestBuilder,
    backend: &str,
) -> Result<serde_json::Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transient(format!("{backend} request failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, body, backend));
    }
    response
        .json()
        .await
        .map_err(|e| ProviderError::Permanent(format!("{backend} returned invalid JSON: {e}")))
}

fn parse_vector(value: &serde_json::Value, backend: &str) -> Result<Vec<f32>, ProviderError> {
    value
        .as_array()
        .ok_or_else(|| {
            ProviderError::Permanent(format!("{backend} response: embedding is not an array"))
        })?
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                ProviderError::Permanent(format!("{backend} response: non-numeric component"))
            })
        })
        .collect()
}

// ============ OpenAI ============

/// Embedding provider for the OpenAI embeddings API (or any compatible
/// server). Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key,
            model,
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = post_json(request, "OpenAI").await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            ProviderError::Permanent("OpenAI response: missing data array".to_string())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item.get("embedding").ok_or_else(|| {
            ProviderError::Permanent("OpenAI response: missing embedding".to_string())
        })?;
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding provider using a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            model,
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json(self.client.post(&self.endpoint).json(&body), "Ollama").await?;
        json.get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                ProviderError::Permanent("Ollama response: missing embeddings array".to_string())
            })?
            .iter()
            .map(|v| parse_vector(v, "Ollama"))
            .collect()
    }
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

/// Local inference through fastembed. The model is loaded once at startup
/// (downloading it on first use) and shared behind a mutex.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for local provider"))?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(config_to_fastembed_model(&model_name)?)
                .with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
        Ok(Self {
            model: Arc::new(std::sync::Mutex::new(model)),
            model_name,
            dims: config.dims,
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| ProviderError::Permanent("local model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| ProviderError::Permanent(format!("local embedding failed: {e}")))
        })
        .await
        .map_err(|e| ProviderError::Permanent(format!("local embedding task failed: {e}")))?
    }
}

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `--features local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Retry layer ============

/// Wraps a provider with batching, preprocessing, output checks, and
/// bounded exponential backoff.
#[derive(Clone)]
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    max_input_chars: usize,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            inner,
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_input_chars: config.max_input_chars,
        }
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    pub fn dims(&self) -> usize {
        self.inner.dims()
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Embed `texts` in order. Fails with [`Error::Embedding`] on a
    /// permanent provider error, a malformed response, or once a batch has
    /// used up its attempts.
    pub async fn embed_texts(&self, texts: &[String]) -> resume_index_core::Result<Vec<Vec<f32>>> {
        let prepared: Vec<String> = texts
            .iter()
            .map(|t| preprocess(t, self.max_input_chars))
            .collect();
        let mut out = Vec::with_capacity(prepared.len());
        for batch in prepared.chunks(self.batch_size) {
            out.extend(self.embed_batch_with_retry(batch).await?);
        }
        Ok(out)
    }

    pub async fn embed_query(&self, text: &str) -> resume_index_core::Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch_with_retry(
        &self,
        batch: &[String],
    ) -> resume_index_core::Result<Vec<Vec<f32>>> {
        let mut attempt = 1;
        loop {
            match self.inner.embed_batch(batch).await {
                Ok(vectors) => {
                    self.check_output(batch.len(), &vectors)?;
                    return Ok(vectors);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        model = self.inner.model_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding batch failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Error::Embedding(format!(
                        "{} after {} attempt(s): {}",
                        self.inner.model_name(),
                        attempt,
                        e
                    )));
                }
            }
        }
    }

    fn check_output(&self, expected: usize, vectors: &[Vec<f32>]) -> resume_index_core::Result<()> {
        if vectors.len() != expected {
            return Err(Error::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }
        let dims = self.inner.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::Embedding(format!(
                "provider returned a {}-dimensional vector, expected {}",
                bad.len(),
                dims
            )));
        }
        Ok(())
    }
}
