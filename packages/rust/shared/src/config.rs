//! Application configuration for ConceptLink.
//!
//! User config lives at `~/.conceptlink/conceptlink.toml`.
//! Every section is optional; missing values fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConceptLinkError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "conceptlink.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".conceptlink";

// ---------------------------------------------------------------------------
// Config structs (matching conceptlink.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lookup cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Remote knowledge-base endpoints.
    #[serde(default)]
    pub wikidata: WikidataConfig,

    /// Retry policy shared by all remote calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Embedding service settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Disambiguation settings.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the JSON cache file (`~` is expanded).
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// Whether confirmed "no match" outcomes are cached.
    #[serde(default = "default_true")]
    pub cache_negative: bool,

    /// Hours a cached "no match" stays valid.
    #[serde(default = "default_negative_ttl_hours")]
    pub negative_ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            cache_negative: true,
            negative_ttl_hours: default_negative_ttl_hours(),
        }
    }
}

fn default_cache_path() -> String {
    "~/.conceptlink/wikidata_cache.json".into()
}
fn default_true() -> bool {
    true
}
fn default_negative_ttl_hours() -> u64 {
    24 * 7
}

/// `[wikidata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikidataConfig {
    /// Full-text search endpoint (MediaWiki action API).
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// SPARQL endpoint used for batched detail lookups.
    #[serde(default = "default_sparql_url")]
    pub sparql_url: String,

    /// Maximum number of search hits considered per query.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Search namespace filter (`0` = items).
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Preferred label language.
    #[serde(default = "default_language")]
    pub language: String,

    /// Fallback label language.
    #[serde(default = "default_fallback_language")]
    pub fallback_language: String,

    /// `instance of` types excluded server-side from detail lookups.
    #[serde(default = "default_excluded_types")]
    pub excluded_types: Vec<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            sparql_url: default_sparql_url(),
            search_limit: default_search_limit(),
            namespace: default_namespace(),
            language: default_language(),
            fallback_language: default_fallback_language(),
            excluded_types: default_excluded_types(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_url() -> String {
    "https://www.wikidata.org/w/api.php".into()
}
fn default_sparql_url() -> String {
    "https://query.wikidata.org/sparql".into()
}
fn default_search_limit() -> usize {
    5
}
fn default_namespace() -> String {
    "0".into()
}
fn default_language() -> String {
    "[AUTO_LANGUAGE]".into()
}
fn default_fallback_language() -> String {
    "en".into()
}
fn default_excluded_types() -> Vec<String> {
    ["Q7725634", "Q18918145", "Q13442814", "Q1368848"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per remote call, including the first one.
    #[serde(default = "default_max_trials")]
    pub max_trials: u32,

    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_trials: default_max_trials(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_max_trials() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    5_000
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint.
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Embedding model name sent with each request.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    /// When the variable is unset, requests are sent without authorization.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum concurrent embedding requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Number of embeddings memoized in memory.
    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            max_concurrency: default_max_concurrency(),
            memo_capacity: default_memo_capacity(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_memo_capacity() -> usize {
    4096
}

/// `[matcher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum cosine similarity (to query or context) for a candidate to be eligible.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Similarity a candidate must reach against the query or the context.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "conceptlink=info".into()
}

impl AppConfig {
    /// Reject values the resolver cannot work with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("wikidata.search_url", &self.wikidata.search_url),
            ("wikidata.sparql_url", &self.wikidata.sparql_url),
            ("embedding.endpoint", &self.embedding.endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| ConceptLinkError::config(format!("{name} is not a valid URL: {e}")))?;
        }

        if self.wikidata.search_limit == 0 || self.wikidata.search_limit > 50 {
            return Err(ConceptLinkError::config(format!(
                "wikidata.search_limit must be between 1 and 50, got {}",
                self.wikidata.search_limit
            )));
        }
        if self.retry.max_trials == 0 {
            return Err(ConceptLinkError::config("retry.max_trials must be at least 1"));
        }
        if self.embedding.max_concurrency == 0 {
            return Err(ConceptLinkError::config(
                "embedding.max_concurrency must be at least 1",
            ));
        }
        let threshold = self.matcher.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConceptLinkError::config(format!(
                "matcher.similarity_threshold must be within [-1, 1], got {threshold}"
            )));
        }
        Ok(())
    }

    /// Cache file path with `~` expanded.
    pub fn cache_path(&self) -> Result<PathBuf> {
        expand_home(&self.cache.path)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.conceptlink/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConceptLinkError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.conceptlink/conceptlink.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ConceptLinkError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Load `~/.conceptlink/conceptlink.toml`, or defaults if it does not exist.
pub fn load_config() -> Result<AppConfig> {
    load_config_or_default(&config_file_path()?)
}

/// Load and validate `path`, falling back to defaults if the file is absent.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConceptLinkError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ConceptLinkError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Write a default config file to `~/.conceptlink/conceptlink.toml`.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    write_default_config(&path)?;
    Ok(path)
}

/// Write the default config as TOML to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConceptLinkError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| ConceptLinkError::config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| ConceptLinkError::io(path, e))?;
    tracing::info!(?path, "wrote default config file");
    Ok(())
}

/// Read the embedding API key from the configured env var, if set and non-empty.
pub fn embedding_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.embedding.api_key_env)
        .ok()
        .filter(|key| !key.is_empty())
}
