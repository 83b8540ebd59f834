//! Concept records: one course and the concepts extracted from it.
//!
//! Records are JSON Lines, one object per line:
//!
//! ```json
//! {"course_name": "Data Structures", "concepts": ["recursion", "hash table"]}
//! ```
//!
//! Parsing is strict. Unknown fields, an empty course name or a blank concept
//! fail with [`ConceptLinkError::MalformedRecord`] naming the 1-based line.
//! Blank lines are skipped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use conceptlink_shared::{ConceptLinkError, Result};

/// A course with its extracted concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptRecord {
    pub course_name: String,
    pub concepts: Vec<String>,
}

impl ConceptRecord {
    fn validate(&self, line: usize) -> Result<()> {
        if self.course_name.trim().is_empty() {
            return Err(ConceptLinkError::malformed_record(line, "empty course_name"));
        }
        if let Some(i) = self.concepts.iter().position(|c| c.trim().is_empty()) {
            return Err(ConceptLinkError::malformed_record(
                line,
                format!("concept #{} is blank", i + 1),
            ));
        }
        Ok(())
    }
}

/// Parse JSON Lines text into records.
pub fn parse_records(input: &str) -> Result<Vec<ConceptRecord>> {
    let mut records = Vec::new();

    for (i, raw) in input.lines().enumerate() {
        let line = i + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let record: ConceptRecord = serde_json::from_str(raw)
            .map_err(|e| ConceptLinkError::malformed_record(line, e.to_string()))?;
        record.validate(line)?;
        records.push(record);
    }

    Ok(records)
}

/// Read and parse a JSON Lines record file.
pub async fn read_records(path: &Path) -> Result<Vec<ConceptRecord>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConceptLinkError::io(path, e))?;
    parse_records(&content)
}
