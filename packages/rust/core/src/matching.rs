//! Batch matching: resolve every concept of every record and write the
//! results as JSON Lines for the graph loader.
//!
//! A failing concept never aborts the batch; it is reported and its row is
//! written with empty entity fields.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use conceptlink_shared::{ConceptLinkError, Result};

use crate::records::{ConceptRecord, read_records};
use crate::resolver::{Resolution, Resolver, ResolverStats};

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

/// One `(course, concept)` pair with its entity, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedConcept {
    pub course_name: String,
    pub concept: String,
    pub wikidata_qid: Option<String>,
    pub wikidata_label: Option<String>,
    pub wikidata_description: Option<String>,
    pub wikidata_url: Option<String>,
}

impl MatchedConcept {
    pub fn new(course_name: &str, concept: &str, resolution: Option<&Resolution>) -> Self {
        let entity = resolution.and_then(Resolution::entity);
        Self {
            course_name: course_name.to_string(),
            concept: concept.to_string(),
            wikidata_qid: entity.map(|e| e.id.to_string()),
            wikidata_label: entity.map(|e| e.label.clone()),
            wikidata_description: entity.map(|e| e.description.clone()),
            wikidata_url: entity.map(|e| e.url()),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.wikidata_qid.is_some()
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub records: usize,
    pub concepts: usize,
    pub matched: usize,
    /// Concepts whose resolution returned an error (cache write failure).
    pub failed: usize,
    /// Resolver counters for this run only.
    pub stats: ResolverStats,
    pub rows: Vec<MatchedConcept>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for batch matching.
pub trait MatchProgress: Send + Sync {
    /// Called before the concepts of a record are resolved.
    fn record_started(&self, course_name: &str, current: usize, total: usize);
    /// Called after each concept.
    fn concept_done(&self, concept: &str, row: &MatchedConcept);
    /// Called once at the end.
    fn done(&self, report: &MatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl MatchProgress for SilentProgress {
    fn record_started(&self, _course_name: &str, _current: usize, _total: usize) {}
    fn concept_done(&self, _concept: &str, _row: &MatchedConcept) {}
    fn done(&self, _report: &MatchReport) {}
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Resolve every concept in `records`, using the course name as context.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn match_records(
    resolver: &Resolver,
    records: &[ConceptRecord],
    progress: &dyn MatchProgress,
) -> MatchReport {
    let start = Instant::now();
    let stats_before = resolver.stats();
    let mut report = MatchReport {
        records: records.len(),
        ..MatchReport::default()
    };

    for (i, record) in records.iter().enumerate() {
        progress.record_started(&record.course_name, i + 1, records.len());

        for concept in &record.concepts {
            report.concepts += 1;
            let resolution = match resolver.resolve(concept, &record.course_name).await {
                Ok(resolution) => Some(resolution),
                Err(e) => {
                    warn!(concept = %concept, course = %record.course_name, error = %e, "resolution failed, continuing");
                    report.failed += 1;
                    None
                }
            };

            let row = MatchedConcept::new(&record.course_name, concept, resolution.as_ref());
            if row.is_matched() {
                report.matched += 1;
            }
            progress.concept_done(concept, &row);
            report.rows.push(row);
        }
    }

    report.stats = resolver.stats().since(&stats_before);
    report.elapsed = start.elapsed();
    info!(
        concepts = report.concepts,
        matched = report.matched,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "matching finished"
    );
    progress.done(&report);
    report
}

/// Read records from `input`, match them, write rows to `output` and flush
/// the cache.
pub async fn match_file(
    resolver: &Resolver,
    input: &Path,
    output: &Path,
    progress: &dyn MatchProgress,
) -> Result<MatchReport> {
    let records = read_records(input).await?;
    let report = match_records(resolver, &records, progress).await;
    write_matches(output, &report.rows).await?;
    resolver.flush().await?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// JSON Lines I/O
// ---------------------------------------------------------------------------

/// Write rows as JSON Lines, replacing `path`.
pub async fn write_matches(path: &Path, rows: &[MatchedConcept]) -> Result<()> {
    let mut out = String::new();
    for row in rows {
        let line = serde_json::to_string(row)
            .map_err(|e| ConceptLinkError::validation(format!("failed to serialize row: {e}")))?;
        out.push_str(&line);
        out.push('\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConceptLinkError::io(parent, e))?;
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ConceptLinkError::io(path, e))?;
    file.write_all(out.as_bytes())
        .await
        .map_err(|e| ConceptLinkError::io(path, e))?;
    file.flush().await.map_err(|e| ConceptLinkError::io(path, e))?;
    Ok(())
}

/// Read rows written by [`write_matches`].
pub async fn read_matches(path: &Path) -> Result<Vec<MatchedConcept>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConceptLinkError::io(path, e))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                ConceptLinkError::parse(format!("{} line {}: {e}", path.display(), i + 1))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use conceptlink_embeddings::{Embedder, Embedding};
    use conceptlink_shared::{Entity, EntityId};
    use conceptlink_storage::{CacheOptions, CacheStore};
    use conceptlink_wikidata::{EntityDetails, EntitySearch};

    use super::*;
    use crate::disambiguate::Disambiguator;

    /// Every query hits one entity labelled after the query.
    struct EchoSearch;

    #[async_trait]
    impl EntitySearch for EchoSearch {
        async fn search(&self, query: &str) -> Result<Vec<EntityId>> {
            if query == "nothing" {
                return Ok(Vec::new());
            }
            Ok(vec![EntityId::new(format!("Q{}", query.len()))])
        }
    }

    struct EchoDetails;

    #[async_trait]
    impl EntityDetails for EchoDetails {
        async fn fetch_details(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
            Ok(ids
                .iter()
                .map(|id| Entity::new(id.as_str(), format!("label {id}"), "a concept"))
                .collect())
        }
    }

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Ok(vec![1.0, 0.0])
        }

        fn model_name(&self) -> &str {
            "const"
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl MatchProgress for RecordingProgress {
        fn record_started(&self, course_name: &str, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("record {current}/{total} {course_name}"));
        }

        fn concept_done(&self, concept: &str, row: &MatchedConcept) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{concept} {}", row.is_matched()));
        }

        fn done(&self, report: &MatchReport) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {}", report.concepts));
        }
    }

    fn temp_path(suffix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("conceptlink-match-{}{suffix}", uuid::Uuid::now_v7()))
    }

    async fn resolver(cache_path: &Path) -> Resolver {
        let cache = CacheStore::open(cache_path, CacheOptions::default())
            .await
            .unwrap();
        Resolver::new(
            cache,
            Arc::new(EchoSearch),
            Arc::new(EchoDetails),
            Disambiguator::new(Arc::new(ConstEmbedder), 0.5),
        )
    }

    fn records() -> Vec<ConceptRecord> {
        vec![
            ConceptRecord {
                course_name: "Data Structures".into(),
                concepts: vec!["recursion".into(), "nothing".into()],
            },
            ConceptRecord {
                course_name: "Algorithms".into(),
                concepts: vec!["graph".into()],
            },
        ]
    }

    #[tokio::test]
    async fn every_concept_gets_a_row() {
        let cache_path = temp_path(".json");
        let r = resolver(&cache_path).await;
        let progress = RecordingProgress::default();

        let report = match_records(&r, &records(), &progress).await;
        assert_eq!(report.records, 2);
        assert_eq!(report.concepts, 3);
        assert_eq!(report.matched, 2);
        assert_eq!(report.failed, 0);

        let recursion = &report.rows[0];
        assert_eq!(recursion.wikidata_qid.as_deref(), Some("Q9"));
        assert_eq!(
            recursion.wikidata_url.as_deref(),
            Some("https://www.wikidata.org/wiki/Q9")
        );
        assert!(!report.rows[1].is_matched());
        assert_eq!(report.rows[2].course_name, "Algorithms");

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("record 1/2 Data Structures"));
        assert_eq!(events.last().map(String::as_str), Some("done 3"));
        let _ = std::fs::remove_file(&cache_path);
    }

    #[tokio::test]
    async fn stats_cover_a_single_run() {
        let cache_path = temp_path(".json");
        let r = resolver(&cache_path).await;

        let first = match_records(&r, &records(), &SilentProgress).await;
        assert_eq!(first.stats.cache_misses, 3);
        assert_eq!(first.stats.cache_hits, 0);

        // Second pass is served from the cache
        let second = match_records(&r, &records(), &SilentProgress).await;
        assert_eq!(second.stats.cache_hits, 3);
        assert_eq!(second.stats.cache_misses, 0);
        assert_eq!(second.stats.resolved, 2);
        assert_eq!(second.stats.unresolved, 1);
        let _ = std::fs::remove_file(&cache_path);
    }

    #[tokio::test]
    async fn file_round_trip_and_flush() {
        let cache_path = temp_path(".json");
        let input = temp_path(".jsonl");
        let output = temp_path("-out.jsonl");
        std::fs::write(
            &input,
            r#"{"course_name": "Data Structures", "concepts": ["recursion"]}"#,
        )
        .unwrap();

        let r = resolver(&cache_path).await;
        let report = match_file(&r, &input, &output, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.matched, 1);

        let rows = read_matches(&output).await.unwrap();
        assert_eq!(rows, report.rows);
        assert!(cache_path.exists());

        // Null fields are written explicitly
        let unresolved = MatchedConcept::new("C", "x", None);
        let json = serde_json::to_value(&unresolved).unwrap();
        assert!(json["wikidata_qid"].is_null());

        for p in [&cache_path, &input, &output] {
            let _ = std::fs::remove_file(p);
        }
    }

    #[tokio::test]
    async fn malformed_input_aborts_before_matching() {
        let cache_path = temp_path(".json");
        let input = temp_path(".jsonl");
        let output = temp_path("-out.jsonl");
        std::fs::write(&input, r#"{"course_name": "X", "concepts": "['a']"}"#).unwrap();

        let r = resolver(&cache_path).await;
        let err = match_file(&r, &input, &output, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ConceptLinkError::MalformedRecord { line: 1, .. }));
        assert!(!output.exists());
        let _ = std::fs::remove_file(&input);
    }
}
