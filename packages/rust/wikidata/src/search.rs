//! Full-text search against the MediaWiki action API.

use async_trait::async_trait;
use conceptlink_shared::{ConceptLinkError, EntityId, Result, RetryPolicy};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{EntitySearch, WikidataOptions, build_client};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

/// Lexical search client returning the top-N item ids for a phrase.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    endpoint: String,
    limit: usize,
    namespace: String,
    retry: RetryPolicy,
}

impl SearchClient {
    pub fn new(opts: &WikidataOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(opts)?,
            endpoint: opts.search_url.clone(),
            limit: opts.search_limit,
            namespace: opts.namespace.clone(),
            retry: opts.retry,
        })
    }

    /// Search `query`, retrying transport failures and non-success statuses.
    ///
    /// An answer with no hits is a success and is returned immediately.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<EntityId>> {
        let ids = self
            .retry
            .run("wikidata search", move |_| self.search_once(query))
            .await?;
        debug!(hits = ids.len(), "search finished");
        Ok(ids)
    }

    async fn search_once(&self, query: &str) -> Result<Vec<EntityId>> {
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("format", "json"),
                ("srlimit", limit.as_str()),
                ("srnamespace", self.namespace.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ConceptLinkError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConceptLinkError::Network(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ConceptLinkError::parse(format!("search response: {e}")))?;

        Ok(body
            .query
            .map(|q| q.search)
            .unwrap_or_default()
            .into_iter()
            .take(self.limit)
            .map(|hit| EntityId::new(hit.title))
            .collect())
    }
}

#[async_trait]
impl EntitySearch for SearchClient {
    async fn search(&self, query: &str) -> Result<Vec<EntityId>> {
        SearchClient::search(self, query).await
    }
}
