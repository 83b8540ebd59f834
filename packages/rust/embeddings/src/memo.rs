use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conceptlink_shared::{ConceptLinkError, Result};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Embedder, Embedding};

/// Memoizing wrapper around another embedder.
///
/// Holds at most `capacity` vectors. Once full, new texts are still embedded
/// but no longer remembered.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    memo: RwLock<HashMap<String, Embedding>>,
    capacity: usize,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            memo: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub async fn len(&self) -> usize {
        self.memo.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memo.read().await.is_empty()
    }

    async fn remember(&self, text: &str, embedding: &Embedding) {
        let mut memo = self.memo.write().await;
        if memo.len() < self.capacity {
            memo.insert(text.to_string(), embedding.clone());
        }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(hit) = self.memo.read().await.get(text) {
            return Ok(hit.clone());
        }

        let embedding = self.inner.embed(text).await?;
        self.remember(text, &embedding).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut results: Vec<Option<Embedding>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();

        {
            let memo = self.memo.read().await;
            for (i, text) in texts.iter().enumerate() {
                match memo.get(*text) {
                    Some(hit) => results[i] = Some(hit.clone()),
                    None => missing.push(i),
                }
            }
        }

        if !missing.is_empty() {
            debug!(
                hits = texts.len() - missing.len(),
                misses = missing.len(),
                "embedding memo"
            );
            let to_embed: Vec<&str> = missing.iter().map(|&i| texts[i]).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;
            if fresh.len() != to_embed.len() {
                return Err(ConceptLinkError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    to_embed.len(),
                    fresh.len()
                )));
            }
            for (&i, embedding) in missing.iter().zip(fresh) {
                self.remember(texts[i], &embedding).await;
                results[i] = Some(embedding);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
