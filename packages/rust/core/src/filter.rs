//! Category filter: drops candidates that are not plausible concepts.
//!
//! Knowledge-base search happily returns category pages, journal articles and
//! long titled works. None of those are useful as a course concept.

use std::fmt;

use conceptlink_shared::Entity;
use tracing::debug;

/// Labels with more words than this are treated as titles, not concepts.
pub const MAX_LABEL_TOKENS: usize = 4;

const CATEGORY_MARKER: &str = "category:";
const ARTICLE_MARKERS: [&str; 2] = ["scientific article", "scholarly article"];

/// Which rule rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyLabel,
    EmptyDescription,
    CategoryPage,
    LongLabel,
    Article,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EmptyLabel => "empty label",
            Self::EmptyDescription => "empty description",
            Self::CategoryPage => "category page",
            Self::LongLabel => "label too long",
            Self::Article => "article",
        };
        f.write_str(text)
    }
}

/// The first rule `entity` violates, or `None` if it is acceptable.
pub fn rejection_reason(entity: &Entity) -> Option<Rejection> {
    if entity.label.is_empty() {
        return Some(Rejection::EmptyLabel);
    }
    if entity.description.is_empty() {
        return Some(Rejection::EmptyDescription);
    }

    let label = entity.label.to_lowercase();
    if label.contains(CATEGORY_MARKER) {
        return Some(Rejection::CategoryPage);
    }
    if entity.label.split_whitespace().count() > MAX_LABEL_TOKENS {
        return Some(Rejection::LongLabel);
    }

    let description = entity.description.to_lowercase();
    if ARTICLE_MARKERS.iter().any(|m| description.contains(m)) {
        return Some(Rejection::Article);
    }

    None
}

/// Keep acceptable candidates, preserving their order.
pub fn filter_candidates(candidates: Vec<Entity>) -> Vec<Entity> {
    candidates
        .into_iter()
        .filter(|entity| match rejection_reason(entity) {
            Some(reason) => {
                debug!(id = %entity.id, label = %entity.label, %reason, "candidate rejected");
                false
            }
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(label: &str, description: &str) -> Entity {
        Entity::new("Q1", label, description)
    }

    #[test]
    fn category_pages_are_rejected() {
        assert_eq!(
            rejection_reason(&entity("Category:Mathematics", "Wikimedia category")),
            Some(Rejection::CategoryPage)
        );
        assert_eq!(
            rejection_reason(&entity("CATEGORY:Recursion", "x")),
            Some(Rejection::CategoryPage)
        );
    }

    #[test]
    fn articles_are_rejected() {
        assert_eq!(
            rejection_reason(&entity("Recursion theory", "1998 scholarly article")),
            Some(Rejection::Article)
        );
        assert_eq!(
            rejection_reason(&entity("Graphs", "Scientific Article published in 2004")),
            Some(Rejection::Article)
        );
    }

    #[test]
    fn five_word_labels_are_rejected() {
        assert_eq!(
            rejection_reason(&entity("the art of computer programming", "book")),
            Some(Rejection::LongLabel)
        );
        assert_eq!(
            rejection_reason(&entity("art of computer programming", "book")),
            None
        );
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert_eq!(
            rejection_reason(&entity("recursion", "")),
            Some(Rejection::EmptyDescription)
        );
        assert_eq!(
            rejection_reason(&entity("", "something")),
            Some(Rejection::EmptyLabel)
        );
    }

    #[test]
    fn filter_preserves_order() {
        let candidates = vec![
            Entity::new("Q1", "recursion", "process of repeating items"),
            Entity::new("Q2", "Category:Recursion", "Wikimedia category"),
            Entity::new("Q3", "recursion", "in computer science"),
            Entity::new("Q4", "On recursion", "1998 scholarly article"),
        ];
        let kept = filter_candidates(candidates);
        let ids: Vec<_> = kept.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q3"]);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(filter_candidates(Vec::new()).is_empty());
    }
}
