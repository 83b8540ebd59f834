//! Core domain types for concept resolution.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Base of the human-facing page URL for an entity.
pub const ENTITY_URL_BASE: &str = "https://www.wikidata.org/wiki/";

static ITEM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Q[1-9][0-9]*$").expect("valid item id regex"));

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Opaque knowledge-base identifier (e.g. `Q42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the item form `Q<digits>` and is safe to embed in a query.
    pub fn is_item_id(&self) -> bool {
        ITEM_ID.is_match(&self.0)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A canonical knowledge-base record a concept can resolve to.
///
/// Serialized as `{ "qid", "label", "description" }`; the page URL is always
/// derived from the id and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "qid")]
    pub id: EntityId,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            label: label.into(),
            description: description.into(),
        }
    }

    /// Page URL for this entity.
    pub fn url(&self) -> String {
        format!("{ENTITY_URL_BASE}{}", self.id)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_derived_from_id() {
        let entity = Entity::new("Q178354", "recursion", "process of repeating items");
        assert_eq!(entity.url(), "https://www.wikidata.org/wiki/Q178354");
    }

    #[test]
    fn item_id_shape() {
        assert!(EntityId::from("Q42").is_item_id());
        assert!(EntityId::from("Q178354").is_item_id());
        assert!(!EntityId::from("Q042").is_item_id());
        assert!(!EntityId::from("P31").is_item_id());
        assert!(!EntityId::from("Q1 } wd:Q2").is_item_id());
        assert!(!EntityId::from("").is_item_id());
    }

    #[test]
    fn entity_serializes_with_qid_field() {
        let entity = Entity::new("Q42", "Douglas Adams", "English writer");
        let json = serde_json::to_value(&entity).expect("serialize");
        assert_eq!(json["qid"], "Q42");
        assert_eq!(json["label"], "Douglas Adams");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn missing_description_defaults_empty() {
        let entity: Entity =
            serde_json::from_str(r#"{"qid":"Q1","label":"universe"}"#).expect("deserialize");
        assert_eq!(entity.description, "");
    }
}
