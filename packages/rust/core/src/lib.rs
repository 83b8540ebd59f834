//! Concept resolution for ConceptLink.
//!
//! This crate ties the cache, the Wikidata clients and the embedder together:
//! [`filter`] drops implausible candidates, [`disambiguate`] picks among the
//! rest by embedding similarity, [`resolver`] runs the whole lookup behind the
//! cache, and [`matching`] drives it over a file of [`records`].

pub mod disambiguate;
pub mod filter;
pub mod matching;
pub mod records;
pub mod resolver;

pub use disambiguate::{Disambiguator, ScoredCandidate};
pub use filter::{Rejection, filter_candidates, rejection_reason};
pub use matching::{
    MatchProgress, MatchReport, MatchedConcept, SilentProgress, match_file, match_records,
    read_matches, write_matches,
};
pub use records::{ConceptRecord, parse_records, read_records};
pub use resolver::{Resolution, Resolver, ResolverStats, Source, UnresolvedReason};
