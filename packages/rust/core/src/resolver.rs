//! Concept → entity resolution with a persistent cache in front.
//!
//! ```text
//! cache hit ──────────────────────────────────────────────▶ done
//! cache miss → search → details → filter → disambiguate ──▶ cache write
//! ```
//!
//! Every empty stage short-circuits to [`Resolution::Unresolved`]. Remote
//! failures (retries exhausted, embedding errors) degrade to
//! [`UnresolvedReason::RemoteUnavailable`] and are never written to the cache,
//! so the query is looked up again next time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use conceptlink_embeddings::{CachedEmbedder, EmbeddingOptions, HttpEmbedder};
use conceptlink_shared::{AppConfig, ConceptLinkError, Entity, Result};
use conceptlink_storage::{CacheEntry, CacheLookup, CacheOptions, CacheStore};
use conceptlink_wikidata::{
    DetailClient, EntityDetails, EntitySearch, SearchClient, WikidataOptions,
};

use crate::disambiguate::Disambiguator;
use crate::filter::filter_candidates;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Where an outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Remote,
}

/// Why no entity was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// A previous lookup found nothing and that is still on record.
    CachedNoMatch,
    NoSearchResults,
    /// Search hits were all excluded or unknown to the detail endpoint.
    NoDetails,
    AllFiltered,
    BelowThreshold,
    /// The lookup itself failed. Not a "no match".
    RemoteUnavailable(String),
}

impl UnresolvedReason {
    /// Whether this outcome says something about the query, as opposed to
    /// the remote service.
    pub fn is_conclusive(&self) -> bool {
        !matches!(self, Self::RemoteUnavailable(_))
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CachedNoMatch => f.write_str("cached no match"),
            Self::NoSearchResults => f.write_str("no search results"),
            Self::NoDetails => f.write_str("no entity details"),
            Self::AllFiltered => f.write_str("all candidates filtered"),
            Self::BelowThreshold => f.write_str("no candidate above threshold"),
            Self::RemoteUnavailable(detail) => write!(f, "lookup failed: {detail}"),
        }
    }
}

/// Outcome of [`Resolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        entity: Entity,
        source: Source,
    },
    Unresolved {
        reason: UnresolvedReason,
        source: Source,
    },
}

impl Resolution {
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Resolved { entity, .. } => Some(entity),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Resolved { entity, .. } => Some(entity),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn source(&self) -> Source {
        match self {
            Self::Resolved { source, .. } | Self::Unresolved { source, .. } => *source,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::Unresolved {
                reason: UnresolvedReason::RemoteUnavailable(_),
                ..
            }
        )
    }
}

/// Counters since the resolver was built. See [`ResolverStats::since`] for
/// per-run figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub resolved: usize,
    pub unresolved: usize,
    /// Subset of `unresolved` caused by remote failures.
    pub degraded: usize,
}

impl ResolverStats {
    /// Counts accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &ResolverStats) -> ResolverStats {
        ResolverStats {
            cache_hits: self.cache_hits.saturating_sub(earlier.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(earlier.cache_misses),
            resolved: self.resolved.saturating_sub(earlier.resolved),
            unresolved: self.unresolved.saturating_sub(earlier.unresolved),
            degraded: self.degraded.saturating_sub(earlier.degraded),
        }
    }
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    resolved: AtomicUsize,
    unresolved: AtomicUsize,
    degraded: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, resolution: &Resolution) {
        match resolution {
            Resolution::Resolved { .. } => Self::bump(&self.resolved),
            Resolution::Unresolved { reason, .. } => {
                Self::bump(&self.unresolved);
                if !reason.is_conclusive() {
                    Self::bump(&self.degraded);
                }
            }
        }
    }

    fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves free-text concepts to knowledge-base entities.
pub struct Resolver {
    cache: CacheStore,
    search: Arc<dyn EntitySearch>,
    details: Arc<dyn EntityDetails>,
    disambiguator: Disambiguator,
    cache_negative: bool,
    counters: Counters,
}

impl Resolver {
    pub fn new(
        cache: CacheStore,
        search: Arc<dyn EntitySearch>,
        details: Arc<dyn EntityDetails>,
        disambiguator: Disambiguator,
    ) -> Self {
        Self {
            cache,
            search,
            details,
            disambiguator,
            cache_negative: true,
            counters: Counters::default(),
        }
    }

    /// Whether conclusive "no match" outcomes are written to the cache.
    pub fn with_negative_caching(mut self, enabled: bool) -> Self {
        self.cache_negative = enabled;
        self
    }

    /// Build the Wikidata clients, the HTTP embedder and open the cache file.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let wikidata = WikidataOptions::from(config);
        let search = Arc::new(SearchClient::new(&wikidata)?);
        let details = Arc::new(DetailClient::new(&wikidata)?);

        let http = HttpEmbedder::new(EmbeddingOptions::from_config(config))?;
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(http),
            config.embedding.memo_capacity,
        ));
        let disambiguator = Disambiguator::new(embedder, config.matcher.similarity_threshold);

        let cache = CacheStore::open(&config.cache_path()?, CacheOptions::from(config)).await?;

        Ok(Self::new(cache, search, details, disambiguator)
            .with_negative_caching(config.cache.cache_negative))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn stats(&self) -> ResolverStats {
        self.counters.snapshot()
    }

    /// Persist the cache. Call before shutdown.
    pub async fn flush(&self) -> Result<()> {
        self.cache.flush().await
    }

    /// Resolve `query` in the light of `context` (typically the course name).
    ///
    /// Only a failure to persist the cache is returned as `Err`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, query: &str, context: &str) -> Result<Resolution> {
        let resolution = self.resolve_inner(query, context).await?;
        self.counters.record(&resolution);

        match &resolution {
            Resolution::Resolved { entity, source } => {
                info!(id = %entity.id, label = %entity.label, ?source, "resolved");
            }
            Resolution::Unresolved { reason, source } => {
                info!(%reason, ?source, "unresolved");
            }
        }
        Ok(resolution)
    }

    async fn resolve_inner(&self, query: &str, context: &str) -> Result<Resolution> {
        match self.cache.get(query).await {
            CacheLookup::Matched(entity) => {
                Counters::bump(&self.counters.cache_hits);
                return Ok(Resolution::Resolved {
                    entity,
                    source: Source::Cache,
                });
            }
            // Stored negatives are only honoured while negative caching is on
            CacheLookup::NoMatch if self.cache_negative => {
                Counters::bump(&self.counters.cache_hits);
                return Ok(Resolution::Unresolved {
                    reason: UnresolvedReason::CachedNoMatch,
                    source: Source::Cache,
                });
            }
            CacheLookup::NoMatch | CacheLookup::Miss => {
                Counters::bump(&self.counters.cache_misses)
            }
        }

        let ids = match self.search.search(query).await {
            Ok(ids) => ids,
            Err(e) => return Ok(degraded("search", e)),
        };
        if ids.is_empty() {
            return self.no_match(query, UnresolvedReason::NoSearchResults).await;
        }
        debug!(hits = ids.len(), "search hits");

        let candidates = match self.details.fetch_details(&ids).await {
            Ok(candidates) => candidates,
            Err(e) => return Ok(degraded("details", e)),
        };
        if candidates.is_empty() {
            return self.no_match(query, UnresolvedReason::NoDetails).await;
        }

        let candidates = filter_candidates(candidates);
        if candidates.is_empty() {
            return self.no_match(query, UnresolvedReason::AllFiltered).await;
        }

        let best = match self
            .disambiguator
            .pick_best(query, context, candidates)
            .await
        {
            Ok(best) => best,
            Err(e) => return Ok(degraded("disambiguation", e)),
        };

        match best {
            Some(best) => {
                self.cache
                    .put(query, CacheEntry::Matched(best.entity.clone()))
                    .await?;
                Ok(Resolution::Resolved {
                    entity: best.entity,
                    source: Source::Remote,
                })
            }
            None => self.no_match(query, UnresolvedReason::BelowThreshold).await,
        }
    }

    async fn no_match(&self, query: &str, reason: UnresolvedReason) -> Result<Resolution> {
        if self.cache_negative {
            self.cache.put(query, CacheEntry::no_match_now()).await?;
        }
        Ok(Resolution::Unresolved {
            reason,
            source: Source::Remote,
        })
    }
}

fn degraded(stage: &str, error: ConceptLinkError) -> Resolution {
    warn!(stage, error = %error, "remote lookup failed, not caching");
    Resolution::Unresolved {
        reason: UnresolvedReason::RemoteUnavailable(error.to_string()),
        source: Source::Remote,
    }
}
