//! Embedding-based choice among filtered candidates.

use std::sync::Arc;

use conceptlink_embeddings::{Embedder, cosine_similarity};
use conceptlink_shared::{ConceptLinkError, Entity, Result};
use tracing::{debug, instrument};

/// A candidate with its similarity to the query and to the context.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub entity: Entity,
    pub query_similarity: f32,
    pub context_similarity: f32,
}

/// Text embedded for a candidate: `"label: description"`, or the bare label.
pub fn comparison_text(entity: &Entity) -> String {
    if entity.description.is_empty() {
        entity.label.clone()
    } else {
        format!("{}: {}", entity.label, entity.description)
    }
}

/// Scores candidates against a query and its context.
///
/// A candidate is eligible when either similarity reaches the threshold
/// (inclusive). Eligible candidates rank by query similarity, descending;
/// ties keep their input order.
#[derive(Clone)]
pub struct Disambiguator {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl Disambiguator {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    /// All eligible candidates, best first.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len(), model = self.embedder.model_name()))]
    pub async fn rank(
        &self,
        query: &str,
        context: &str,
        candidates: Vec<Entity>,
    ) -> Result<Vec<ScoredCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;
        let context_vec = self.embedder.embed(context).await?;

        let texts: Vec<String> = candidates.iter().map(comparison_text).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let candidate_vecs = self.embedder.embed_batch(&text_refs).await?;
        if candidate_vecs.len() != candidates.len() {
            return Err(ConceptLinkError::Embedding(format!(
                "expected {} candidate embeddings, got {}",
                candidates.len(),
                candidate_vecs.len()
            )));
        }

        let mut eligible: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(candidate_vecs.iter())
            .map(|(entity, vec)| ScoredCandidate {
                query_similarity: cosine_similarity(&query_vec, vec),
                context_similarity: cosine_similarity(&context_vec, vec),
                entity,
            })
            .filter(|scored| {
                let keep = scored.query_similarity >= self.threshold
                    || scored.context_similarity >= self.threshold;
                debug!(
                    id = %scored.entity.id,
                    query_similarity = scored.query_similarity,
                    context_similarity = scored.context_similarity,
                    eligible = keep,
                    "scored candidate"
                );
                keep
            })
            .collect();

        // Stable: equal scores keep first-seen order
        eligible.sort_by(|a, b| b.query_similarity.total_cmp(&a.query_similarity));
        Ok(eligible)
    }

    /// The best eligible candidate, if any.
    pub async fn pick_best(
        &self,
        query: &str,
        context: &str,
        candidates: Vec<Entity>,
    ) -> Result<Option<ScoredCandidate>> {
        Ok(self
            .rank(query, context, candidates)
            .await?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use conceptlink_embeddings::Embedding;

    use super::*;

    /// Looks vectors up by exact text; unknown text is an error.
    #[derive(Default)]
    struct TableEmbedder {
        table: HashMap<String, Embedding>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn with(mut self, text: &str, vec: &[f32]) -> Self {
            self.table.insert(text.to_string(), vec.to_vec());
            self
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table
                .get(text)
                .cloned()
                .ok_or_else(|| ConceptLinkError::Embedding(format!("no vector for {text:?}")))
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    #[test]
    fn comparison_text_joins_label_and_description() {
        let e = Entity::new("Q1", "recursion", "process of repeating items");
        assert_eq!(comparison_text(&e), "recursion: process of repeating items");
        let bare = Entity::new("Q2", "recursion", "");
        assert_eq!(comparison_text(&bare), "recursion");
    }

    #[tokio::test]
    async fn empty_candidates_skip_embedding() {
        let embedder = Arc::new(TableEmbedder::default());
        let d = Disambiguator::new(embedder.clone(), 0.5);
        assert!(d.pick_best("q", "c", Vec::new()).await.unwrap().is_none());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ties_keep_first_seen() {
        let embedder = TableEmbedder::default()
            .with("q", &[1.0, 0.0])
            .with("c", &[0.0, 1.0])
            .with("a: first", &[1.0, 0.0])
            .with("b: second", &[2.0, 0.0]);
        let d = Disambiguator::new(Arc::new(embedder), 0.5);

        let best = d
            .pick_best(
                "q",
                "c",
                vec![
                    Entity::new("Q1", "a", "first"),
                    Entity::new("Q2", "b", "second"),
                ],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.entity.id.as_str(), "Q1");
    }

    #[tokio::test]
    async fn context_rescues_weak_query_match() {
        // query_sim 0.2 but context_sim 0.9
        let embedder = TableEmbedder::default()
            .with("q", &[0.2, 0.9797959])
            .with("c", &[0.9, 0.43588989])
            .with("x: rescued", &[1.0, 0.0]);
        let d = Disambiguator::new(Arc::new(embedder), 0.5);

        let best = d
            .pick_best("q", "c", vec![Entity::new("Q7", "x", "rescued")])
            .await
            .unwrap()
            .unwrap();
        assert!((best.query_similarity - 0.2).abs() < 1e-4);
        assert!(best.context_similarity >= 0.5);
    }

    #[tokio::test]
    async fn below_threshold_on_both_is_dropped() {
        let embedder = TableEmbedder::default()
            .with("q", &[1.0, 0.0])
            .with("c", &[1.0, 0.0])
            .with("far: away", &[0.0, 1.0]);
        let d = Disambiguator::new(Arc::new(embedder), 0.5);
        let ranked = d
            .rank("q", "c", vec![Entity::new("Q9", "far", "away")])
            .await
            .unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let candidate = [0.81_f32, 0.586_429_87, 0.0];
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &candidate);

        let build = |threshold: f32| {
            let embedder = TableEmbedder::default()
                .with("q", &[1.0, 0.0, 0.0])
                .with("c", &[0.0, 0.0, 1.0])
                .with("a: b", &candidate);
            Disambiguator::new(Arc::new(embedder), threshold)
        };

        let at = build(sim)
            .pick_best("q", "c", vec![Entity::new("Q1", "a", "b")])
            .await
            .unwrap();
        assert!(at.is_some());

        let above = build(sim + 1e-6)
            .pick_best("q", "c", vec![Entity::new("Q1", "a", "b")])
            .await
            .unwrap();
        assert!(above.is_none());
    }

    #[tokio::test]
    async fn ranking_is_by_query_similarity() {
        let embedder = TableEmbedder::default()
            .with("q", &[1.0, 0.0])
            .with("c", &[0.0, 1.0])
            .with("low: l", &[0.6, 0.8])
            .with("high: h", &[0.8, 0.6]);
        let d = Disambiguator::new(Arc::new(embedder), 0.5);
        let ranked = d
            .rank(
                "q",
                "c",
                vec![Entity::new("Q1", "low", "l"), Entity::new("Q2", "high", "h")],
            )
            .await
            .unwrap();
        let ids: Vec<_> = ranked.iter().map(|s| s.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["Q2", "Q1"]);
    }

    /// Returns one vector too few from `embed_batch`.
    struct ShortBatchEmbedder;

    #[async_trait]
    impl Embedder for ShortBatchEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }

        fn model_name(&self) -> &str {
            "short"
        }
    }

    #[tokio::test]
    async fn short_embedding_batch_is_an_error() {
        let d = Disambiguator::new(Arc::new(ShortBatchEmbedder), 0.5);
        let err = d
            .rank(
                "q",
                "c",
                vec![Entity::new("Q1", "a", "b"), Entity::new("Q2", "c", "d")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConceptLinkError::Embedding(_)));
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let d = Disambiguator::new(Arc::new(TableEmbedder::default()), 0.5);
        let err = d
            .pick_best("q", "c", vec![Entity::new("Q1", "a", "b")])
            .await
            .unwrap_err();
        assert!(err.is_degraded());
    }
}
