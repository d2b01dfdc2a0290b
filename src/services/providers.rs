// Embedding Provider Service
// Semantic embeddings for chunks, served by an external inference server

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config_store::{ConfigError, ConfigStore, EmbeddingConfig};
use crate::models::SemanticVector;

pub const EMBEDDING_URL_ENV: &str = "HYBRID_DETECT_EMBEDDING_URL";
pub const EMBEDDING_API_KEY_ENV: &str = "HYBRID_DETECT_EMBEDDING_API_KEY";
/// Key under `apiKeys` in the config file.
pub const EMBEDDING_KEY_NAME: &str = "embedding";

const RETRY_BACKOFF_MS: u64 = 400;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing embedding in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Malformed embedding: {0}")]
    Malformed(String),
    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ApiError { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// Maps a chunk of text to a fixed-size dense vector.
///
/// Implementations truncate input to `max_tokens` tokens and mean-pool token
/// representations. They hold no per-request state and are shared across requests.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, max_tokens: usize) -> Result<SemanticVector, ProviderError>;

    /// Output dimension D.
    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    /// Server returns one pooled vector per input.
    #[default]
    Server,
    /// Server returns token vectors; they are mean-pooled here.
    Mean,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: [&'a str; 1],
    truncate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    normalize: Option<bool>,
}

/// Client for a text-embeddings inference server (`/embed`, `/embed_all`).
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    pooling: PoolingMode,
    max_retries: usize,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        if config.dimensions == 0 {
            return Err(ProviderError::Config("embedding dimensions must be > 0".to_string()));
        }
        let base_url = env::var(EMBEDDING_URL_ENV).unwrap_or_else(|_| config.base_url.clone());
        if base_url.trim().is_empty() {
            return Err(ProviderError::Config("embedding base URL is empty".to_string()));
        }

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        builder = match config.proxy.as_deref() {
            Some(proxy_url) if !proxy_url.trim().is_empty() => builder.proxy(reqwest::Proxy::all(proxy_url)?),
            _ => builder.no_proxy(),
        };
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            pooling: config.pooling,
            max_retries: config.max_retries.max(1),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        match self.pooling {
            PoolingMode::Server => format!("{}/embed", self.base_url),
            PoolingMode::Mean => format!("{}/embed_all", self.base_url),
        }
    }

    async fn send_once(&self, url: &str, request: &EmbedRequest<'_>) -> Result<String, ProviderError> {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.text().await?)
    }

    fn parse_embedding(&self, body: &str, max_tokens: usize) -> Result<SemanticVector, ProviderError> {
        let vector = match self.pooling {
            PoolingMode::Server => {
                let data: Vec<Vec<f32>> =
                    serde_json::from_str(body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
                data.into_iter().next().ok_or(ProviderError::MissingContent)?
            }
            PoolingMode::Mean => {
                let data: Vec<Vec<Vec<f32>>> =
                    serde_json::from_str(body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
                let tokens = data.into_iter().next().ok_or(ProviderError::MissingContent)?;
                let keep = tokens.len().min(max_tokens);
                mean_pool(&tokens[..keep])?
            }
        };
        validate_embedding(vector, self.dimensions)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str, max_tokens: usize) -> Result<SemanticVector, ProviderError> {
        let url = self.endpoint();
        let request = EmbedRequest {
            inputs: [text],
            truncate: true,
            normalize: match self.pooling {
                PoolingMode::Server => Some(false),
                PoolingMode::Mean => None,
            },
        };

        let started = Instant::now();
        let mut attempt = 1usize;
        loop {
            match self.send_once(&url, &request).await {
                Ok(body) => {
                    let vector = self.parse_embedding(&body, max_tokens)?;
                    debug!(
                        "[EMBEDDER] ok model={} attempt={} dims={} latency_ms={}",
                        self.model,
                        attempt,
                        vector.len(),
                        started.elapsed().as_millis()
                    );
                    return Ok(vector);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        "[EMBEDDER] error model={} attempt={} : {} (retrying)",
                        self.model, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Mean over token vectors. Accumulates in f64.
pub fn mean_pool(tokens: &[Vec<f32>]) -> Result<SemanticVector, ProviderError> {
    let first = tokens
        .first()
        .ok_or_else(|| ProviderError::Malformed("no token vectors to pool".to_string()))?;
    let dim = first.len();
    let mut sums = vec![0.0f64; dim];
    for (i, token) in tokens.iter().enumerate() {
        if token.len() != dim {
            return Err(ProviderError::Malformed(format!(
                "token {} has {} dims, expected {}",
                i,
                token.len(),
                dim
            )));
        }
        for (acc, v) in sums.iter_mut().zip(token) {
            *acc += f64::from(*v);
        }
    }
    let n = tokens.len() as f64;
    Ok(sums.into_iter().map(|s| (s / n) as f32).collect())
}

/// Reject empty, non-finite, or wrongly sized vectors.
pub fn validate_embedding(vector: SemanticVector, expected_dim: usize) -> Result<SemanticVector, ProviderError> {
    if vector.is_empty() {
        return Err(ProviderError::Malformed("empty embedding vector".to_string()));
    }
    if vector.len() != expected_dim {
        return Err(ProviderError::Malformed(format!(
            "expected {} dims, got {}",
            expected_dim,
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(ProviderError::Malformed("non-finite value in embedding".to_string()));
    }
    Ok(vector)
}

/// Get the embedding API key from environment or config file
pub fn get_api_key(store: Option<&ConfigStore>) -> Option<String> {
    if let Ok(val) = env::var(EMBEDDING_API_KEY_ENV) {
        let v = val.trim();
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }

    let default_store;
    let store = match store {
        Some(s) => s,
        None => {
            default_store = ConfigStore::new(ConfigStore::default_config_dir()?);
            &default_store
        }
    };
    store.get_api_key(EMBEDDING_KEY_NAME).ok().flatten()
}

/// Persist the embedding API key in the config file.
pub fn store_embedding_key(store: &ConfigStore, key: &str) -> Result<(), ConfigError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::Invalid("API key is empty".to_string()));
    }
    store.set_api_key(EMBEDDING_KEY_NAME, key)?;
    info!("[EMBEDDER] API key stored in {}", store.config_dir().display());
    Ok(())
}

/// Remove the embedding API key from the config file.
pub fn delete_embedding_key(store: &ConfigStore) -> Result<(), ConfigError> {
    store.delete_api_key(EMBEDDING_KEY_NAME)?;
    info!("[EMBEDDER] API key removed from {}", store.config_dir().display());
    Ok(())
}
