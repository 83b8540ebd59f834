//! OpenAI-compatible embeddings client.

use std::time::Duration;

use async_trait::async_trait;
use conceptlink_shared::{AppConfig, ConceptLinkError, Result, RetryPolicy, embedding_api_key};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::{Embedder, Embedding};

/// User-Agent string for embedding requests.
const USER_AGENT: &str = concat!("ConceptLink/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Settings for [`HttpEmbedder`].
#[derive(Clone)]
pub struct EmbeddingOptions {
    pub endpoint: String,
    pub model: String,
    /// Bearer token; requests go out unauthenticated when `None`.
    pub api_key: Option<String>,
    /// Upper bound on in-flight requests.
    pub max_concurrency: usize,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl EmbeddingOptions {
    /// Build options from config, reading the API key from its env var.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.embedding.endpoint.clone(),
            model: config.embedding.model.clone(),
            api_key: embedding_api_key(config),
            max_concurrency: config.embedding.max_concurrency,
            timeout_secs: config.embedding.timeout_secs,
            retry: RetryPolicy::from(config),
        }
    }
}

impl std::fmt::Debug for EmbeddingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingOptions")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Remote embedder with bounded concurrency and fixed-delay retries.
pub struct HttpEmbedder {
    client: Client,
    options: EmbeddingOptions,
    permits: Semaphore,
}

impl HttpEmbedder {
    pub fn new(options: EmbeddingOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| ConceptLinkError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits: Semaphore::new(options.max_concurrency.max(1)),
            options,
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut request = self
            .client
            .post(&self.options.endpoint)
            .json(&serde_json::json!({
                "model": self.options.model,
                "input": texts,
            }));
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConceptLinkError::Network(format!("{}: {e}", self.options.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConceptLinkError::Network(format!(
                "{}: HTTP {status}",
                self.options.endpoint
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ConceptLinkError::parse(format!("embedding response: {e}")))?;

        let mut data = body.data;
        if data.len() != texts.len() {
            return Err(ConceptLinkError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        // Entries may arrive out of order
        data.sort_by_key(|d| d.index);

        let embeddings: Vec<Embedding> = data.into_iter().map(|d| d.embedding).collect();
        check_dimensions(&embeddings)?;
        Ok(embeddings)
    }
}

/// All vectors must be non-empty and share one length.
fn check_dimensions(embeddings: &[Embedding]) -> Result<()> {
    let Some(first) = embeddings.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(ConceptLinkError::Embedding("empty embedding vector".into()));
    }
    if let Some(odd) = embeddings.iter().find(|e| e.len() != first.len()) {
        return Err(ConceptLinkError::Embedding(format!(
            "inconsistent embedding dimensions: {} vs {}",
            first.len(),
            odd.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| ConceptLinkError::Embedding("no embedding in response".into()))
    }

    #[instrument(skip_all, fields(model = %self.options.model, texts = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ConceptLinkError::Embedding(format!("embedder closed: {e}")))?;

        let embeddings = self
            .options
            .retry
            .run("embedding", |_| self.request(texts))
            .await?;
        debug!(dimension = embeddings[0].len(), "embedded");
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.options.model
    }
}
