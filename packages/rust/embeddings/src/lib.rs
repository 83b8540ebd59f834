//! Text embedding capability used for semantic disambiguation.
//!
//! Anything that maps text to a fixed-length vector can implement
//! [`Embedder`]. [`HttpEmbedder`] talks to an OpenAI-compatible
//! `/v1/embeddings` endpoint; [`CachedEmbedder`] memoizes another embedder
//! (course names repeat for every concept of a course).

mod http;
mod memo;

use async_trait::async_trait;
use conceptlink_shared::Result;

pub use http::{EmbeddingOptions, HttpEmbedder};
pub use memo::CachedEmbedder;

/// Embedding vector.
pub type Embedding = Vec<f32>;

/// Text → fixed-length vector.
///
/// Implementations must tolerate concurrent calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts; output order matches input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Cosine similarity of two vectors. Mismatched lengths or a zero vector give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
