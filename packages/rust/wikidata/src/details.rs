//! Batched label/description retrieval through the SPARQL endpoint.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use conceptlink_shared::{ConceptLinkError, Entity, EntityId, Result, RetryPolicy};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{EntityDetails, WikidataOptions, build_client};

/// Media type requested from the SPARQL endpoint.
const SPARQL_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<Binding>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    item: Option<Term>,
    #[serde(rename = "itemLabel")]
    item_label: Option<Term>,
    #[serde(rename = "itemDescription")]
    item_description: Option<Term>,
}

#[derive(Debug, Deserialize)]
struct Term {
    value: String,
}

/// Fetches label and description for a batch of ids in one query.
#[derive(Debug, Clone)]
pub struct DetailClient {
    client: Client,
    endpoint: String,
    excluded_types: Vec<EntityId>,
    languages: String,
    retry: RetryPolicy,
}

impl DetailClient {
    pub fn new(opts: &WikidataOptions) -> Result<Self> {
        let mut excluded_types = Vec::with_capacity(opts.excluded_types.len());
        for raw in &opts.excluded_types {
            let id = EntityId::new(raw.trim());
            if !id.is_item_id() {
                return Err(ConceptLinkError::config(format!(
                    "excluded type {raw:?} is not an item id"
                )));
            }
            excluded_types.push(id);
        }

        for lang in [&opts.language, &opts.fallback_language] {
            if lang.chars().any(|c| matches!(c, '"' | '\\' | '\n' | '\r' | ',')) {
                return Err(ConceptLinkError::config(format!(
                    "invalid label language {lang:?}"
                )));
            }
        }
        if opts.language.is_empty() {
            return Err(ConceptLinkError::config("label language must not be empty"));
        }
        let languages = if opts.fallback_language.is_empty() {
            opts.language.clone()
        } else {
            format!("{},{}", opts.language, opts.fallback_language)
        };

        Ok(Self {
            client: build_client(opts)?,
            endpoint: opts.sparql_url.clone(),
            excluded_types,
            languages,
            retry: opts.retry,
        })
    }

    /// Resolve `ids` to entities, preserving the input order.
    ///
    /// Ids the endpoint does not return (unknown, or of an excluded type) are
    /// omitted. Ids that are not plain item ids never reach the query.
    #[instrument(skip_all, fields(ids = ids.len()))]
    pub async fn fetch_details(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        let mut seen = HashSet::new();
        let requested: Vec<&EntityId> = ids
            .iter()
            .filter(|id| {
                if id.is_item_id() {
                    true
                } else {
                    warn!(id = %id, "skipping non-item id");
                    false
                }
            })
            .filter(|id| seen.insert(id.as_str()))
            .collect();

        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let query = build_query(&requested, &self.excluded_types, &self.languages);
        let mut by_id = self
            .retry
            .run("wikidata details", |_| self.fetch_once(&query))
            .await?;

        let entities: Vec<Entity> = requested
            .into_iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        debug!(returned = entities.len(), "details fetched");
        Ok(entities)
    }

    async fn fetch_once(&self, query: &str) -> Result<HashMap<EntityId, Entity>> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, SPARQL_JSON)
            .query(&[("format", "json"), ("query", query)])
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

        let body: SparqlResponse = response
            .json()
            .await
            .map_err(|e| ConceptLinkError::parse(format!("sparql response: {e}")))?;

        let mut by_id = HashMap::new();
        for binding in body.results.bindings {
            let Some(item) = binding.item else { continue };
            let id = EntityId::new(entity_id_from_uri(&item.value));
            by_id.entry(id.clone()).or_insert_with(|| Entity {
                id,
                label: binding.item_label.map(|t| t.value).unwrap_or_default(),
                description: binding.item_description.map(|t| t.value).unwrap_or_default(),
            });
        }
        Ok(by_id)
    }
}

#[async_trait]
impl EntityDetails for DetailClient {
    async fn fetch_details(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        DetailClient::fetch_details(self, ids).await
    }
}

/// Build the detail query. All interpolated ids are validated item ids.
fn build_query(ids: &[&EntityId], excluded_types: &[EntityId], languages: &str) -> String {
    let values = ids
        .iter()
        .map(|id| format!("wd:{id}"))
        .collect::<Vec<_>>()
        .join(" ");

    let exclusion = if excluded_types.is_empty() {
        String::new()
    } else {
        let types = excluded_types
            .iter()
            .map(|id| format!("wd:{id}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "  FILTER NOT EXISTS {{\n    ?item wdt:P31 ?type .\n    FILTER (?type IN ({types}))\n  }}\n"
        )
    };

    format!(
        "SELECT DISTINCT ?item ?itemLabel ?itemDescription\nWHERE {{\n  VALUES ?item {{ {values} }}\n{exclusion}  SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"{languages}\". }}\n}}\n"
    )
}

/// `http://www.wikidata.org/entity/Q42` → `Q42`.
fn entity_id_from_uri(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}
