//! Wikidata lookup clients: full-text search and batched detail retrieval.
//!
//! Resolution asks the knowledge base twice. [`SearchClient`] turns a phrase
//! into a short ranked list of item ids, then [`DetailClient`] fetches labels
//! and descriptions for all of them in a single SPARQL query, excluding
//! non-concept record types server-side. Both retry through a
//! [`RetryPolicy`] and surface [`ConceptLinkError::RetriesExhausted`] when the
//! service stays unavailable.
//!
//! [`ConceptLinkError::RetriesExhausted`]: conceptlink_shared::ConceptLinkError::RetriesExhausted

mod details;
mod search;

use async_trait::async_trait;
use conceptlink_shared::{AppConfig, ConceptLinkError, Entity, EntityId, Result, RetryPolicy};
use reqwest::Client;

pub use details::DetailClient;
pub use search::SearchClient;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for knowledge-base requests.
const USER_AGENT: &str = concat!("ConceptLink/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Lookup traits
// ---------------------------------------------------------------------------

/// Lexical search stage: phrase → candidate ids, best first.
#[async_trait]
pub trait EntitySearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<EntityId>>;
}

/// Detail stage: ids → entities, in the caller's order, missing ids omitted.
#[async_trait]
pub trait EntityDetails: Send + Sync {
    async fn fetch_details(&self, ids: &[EntityId]) -> Result<Vec<Entity>>;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Endpoint and query settings for both clients.
#[derive(Debug, Clone)]
pub struct WikidataOptions {
    pub search_url: String,
    pub sparql_url: String,
    /// Upper bound on search hits kept per query.
    pub search_limit: usize,
    pub namespace: String,
    pub language: String,
    pub fallback_language: String,
    /// `instance of` types filtered out of detail results.
    pub excluded_types: Vec<String>,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for WikidataOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WikidataOptions {
    fn from(config: &AppConfig) -> Self {
        let wikidata = &config.wikidata;
        Self {
            search_url: wikidata.search_url.clone(),
            sparql_url: wikidata.sparql_url.clone(),
            search_limit: wikidata.search_limit,
            namespace: wikidata.namespace.clone(),
            language: wikidata.language.clone(),
            fallback_language: wikidata.fallback_language.clone(),
            excluded_types: wikidata.excluded_types.clone(),
            timeout_secs: wikidata.timeout_secs,
            retry: RetryPolicy::from(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &WikidataOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| ConceptLinkError::Network(format!("failed to build HTTP client: {e}")))
}
