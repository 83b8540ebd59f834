//! Shared types, error model, and configuration for ConceptLink.
//!
//! This crate is the foundation depended on by all other ConceptLink crates.
//! It provides:
//! - [`ConceptLinkError`], the unified error type
//! - Domain types ([`Entity`], [`EntityId`])
//! - Configuration ([`AppConfig`], config loading) and tracing setup
//! - [`RetryPolicy`], fixed-delay retry shared by every remote client

pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, EmbeddingConfig, LogFormat, LoggingConfig, MatcherConfig,
    RetryConfig, WikidataConfig, config_dir, config_file_path, embedding_api_key, expand_home,
    init_config, load_config, load_config_from, load_config_or_default, write_default_config,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use error::{ConceptLinkError, Result};
pub use retry::RetryPolicy;
pub use telemetry::init_tracing;
pub use types::{ENTITY_URL_BASE, Entity, EntityId};
