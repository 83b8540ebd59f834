//! Write-through JSON cache of concept lookups.
//!
//! The [`CacheStore`] maps a query string (exact, case-sensitive) to either a
//! resolved [`Entity`] or a "no match" marker. The whole cache is loaded at
//! startup and the whole file is rewritten after every mutation.
//!
//! **Persistence rules:**
//! - A missing cache file means an empty cache.
//! - An unreadable cache file is [`ConceptLinkError::CacheCorrupt`]; callers must
//!   stop instead of starting over with an empty cache.
//! - Writes go to a sibling `.tmp` file that is synced and renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use conceptlink_shared::{AppConfig, ConceptLinkError, Entity, Result};

/// Version tag written into the cache file.
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A persisted lookup outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheEntry {
    /// The query resolved to this entity.
    Matched(Entity),
    /// The query was looked up and nothing acceptable was found.
    NoMatch { checked_at: DateTime<Utc> },
}

impl CacheEntry {
    /// A "no match" marker stamped with the current time.
    pub fn no_match_now() -> Self {
        Self::NoMatch {
            checked_at: Utc::now(),
        }
    }
}

/// Result of [`CacheStore::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Matched(Entity),
    NoMatch,
    Miss,
}

/// On-disk layout.
#[derive(Debug, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, CacheEntry>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Cache behaviour knobs.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long a "no match" entry is served. `None` keeps it forever.
    pub negative_ttl: Option<TimeDelta>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            negative_ttl: Some(TimeDelta::hours(24 * 7)),
        }
    }
}

impl From<&AppConfig> for CacheOptions {
    fn from(config: &AppConfig) -> Self {
        let hours = i64::try_from(config.cache.negative_ttl_hours).unwrap_or(i64::MAX);
        Self {
            negative_ttl: TimeDelta::try_hours(hours),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Durable query → outcome map, guarded by an async mutex.
pub struct CacheStore {
    path: PathBuf,
    options: CacheOptions,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Load the cache at `path` into memory.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path, options: CacheOptions) -> Result<Self> {
        let entries = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let content = String::from_utf8(bytes)
                    .map_err(|e| ConceptLinkError::cache_corrupt(path, e.to_string()))?;
                decode(path, &content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("cache file not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(ConceptLinkError::io(path, e)),
        };

        info!(entries = entries.len(), "cache loaded");

        Ok(Self {
            path: path.to_path_buf(),
            options,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up `key` without side effects.
    pub async fn get(&self, key: &str) -> CacheLookup {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(CacheEntry::Matched(entity)) => CacheLookup::Matched(entity.clone()),
            Some(CacheEntry::NoMatch { checked_at }) => {
                if self.is_expired(*checked_at) {
                    CacheLookup::Miss
                } else {
                    CacheLookup::NoMatch
                }
            }
            None => CacheLookup::Miss,
        }
    }

    /// Insert or overwrite `key`, then rewrite the cache file.
    ///
    /// If the file cannot be written the in-memory map is restored, so memory
    /// never holds an entry that is not on disk.
    pub async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), entry);

        if let Err(e) = self.persist(&entries).await {
            match previous {
                Some(prev) => entries.insert(key.to_string(), prev),
                None => entries.remove(key),
            };
            return Err(e);
        }

        debug!(key, total = entries.len(), "cache entry written");
        Ok(())
    }

    /// Rewrite and sync the cache file. Call before shutdown.
    pub async fn flush(&self) -> Result<()> {
        let entries = self.entries.lock().await;
        self.persist(&entries).await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn is_expired(&self, checked_at: DateTime<Utc>) -> bool {
        match self.options.negative_ttl {
            Some(ttl) => Utc::now().signed_duration_since(checked_at) >= ttl,
            None => false,
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(&CacheFileRef {
            version: CACHE_FORMAT_VERSION,
            entries,
        })
        .map_err(|e| ConceptLinkError::validation(format!("failed to serialize cache: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConceptLinkError::io(parent, e))?;
        }

        let tmp = tmp_path(&self.path);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| ConceptLinkError::io(&tmp, e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| ConceptLinkError::io(&tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| ConceptLinkError::io(&tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ConceptLinkError::io(&self.path, e))
    }
}

/// Parse either the versioned format or the flat legacy map of entities.
fn decode(path: &Path, content: &str) -> Result<BTreeMap<String, CacheEntry>> {
    match serde_json::from_str::<CacheFile>(content) {
        Ok(file) if file.version == CACHE_FORMAT_VERSION => Ok(file.entries),
        Ok(file) => Err(ConceptLinkError::cache_corrupt(
            path,
            format!("unsupported cache version {}", file.version),
        )),
        Err(versioned_err) => {
            let legacy: BTreeMap<String, Entity> = serde_json::from_str(content)
                .map_err(|_| ConceptLinkError::cache_corrupt(path, versioned_err.to_string()))?;
            info!(entries = legacy.len(), "read legacy cache layout");
            Ok(legacy
                .into_iter()
                .map(|(key, entity)| (key, CacheEntry::Matched(entity)))
                .collect())
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
