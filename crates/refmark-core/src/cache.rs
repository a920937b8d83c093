//! Persistent per-source cache for resolver responses.
//!
//! One UTF-8 JSON file per normalized key (a title or a raw citation
//! string), holding the last-seen raw response of every source that was
//! queried for that key. Repeated runs and repeated references skip network
//! calls entirely.
//!
//! A recorded no-match sentinel IS cached — "queried, found nothing" must be
//! distinguishable from "never queried" — but empty/null values are never
//! written, so transient failures are always re-queried. Corrupt or missing
//! files read as misses.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::matching::normalize;

/// Longest normalized key stored under its own name; longer keys (raw
/// citation strings) get hashed filenames.
const MAX_KEY_FILENAME: usize = 120;

/// The bibliographic sources whose responses are cached per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    LocalLibrary,
    ExternalSearch,
    ExternalSearchByCitation,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::LocalLibrary => "local_library",
            Source::ExternalSearch => "external_search",
            Source::ExternalSearchByCitation => "external_search_by_citation",
        }
    }
}

/// The cached "queried, found nothing" sentinel.
pub fn no_match() -> Value {
    json!({ "no_match": true })
}

pub fn is_no_match(value: &Value) -> bool {
    value.get("no_match").and_then(Value::as_bool).unwrap_or(false)
}

/// File-backed cache of per-source resolver responses.
///
/// Process-wide persistent state shared across runs. Read-then-write per
/// key with no cross-process locking; concurrent runs against the same
/// directory are not guaranteed race-free and should be avoided.
pub struct ResolutionCache {
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Look up the cached response of `source` for `key`.
    ///
    /// The key is normalized before lookup. Missing files, unreadable files,
    /// and invalid JSON all count as misses.
    pub fn get(&self, key: &str, source: Source) -> Option<Value> {
        let path = self.path_for(key);
        let entry = match read_entry(&path) {
            Some(e) => e,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match entry.get(source.name()) {
            Some(v) if !v.is_null() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache hit for {} at {}", source.name(), path.display());
                Some(v.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record the raw response of `source` for `key`.
    ///
    /// No-op for null/empty values. Other sources' fields in the same entry
    /// are preserved. Write failures are logged, never fatal.
    pub fn put(&self, key: &str, source: Source, value: &Value) {
        if is_empty_value(value) {
            return;
        }
        let path = self.path_for(key);
        let mut entry = read_entry(&path).unwrap_or_default();
        entry.insert(source.name().to_string(), value.clone());
        match serde_json::to_string_pretty(&Value::Object(entry)) {
            Ok(body) => {
                if let Err(e) = fs::write(&path, body) {
                    log::warn!("failed to write cache file {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("failed to serialize cache entry: {e}"),
        }
    }

    /// Number of cache hits since open.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses since open.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let normalized = normalize(key);
        let filename = if normalized.is_empty() || normalized.len() > MAX_KEY_FILENAME {
            let mut hasher = Sha256::new();
            hasher.update(normalized.as_bytes());
            format!("{:x}", hasher.finalize())
        } else {
            normalized
        };
        self.dir.join(filename)
    }
}

fn read_entry(path: &Path) -> Option<Map<String, Value>> {
    let body = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) | Err(_) => {
            log::warn!("corrupt cache file {}, treating as miss", path.display());
            None
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("dir", &self.dir)
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        assert!(cache.get("Some Title", Source::LocalLibrary).is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn hit_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let value = json!({ "title": "A Study of Things" });
        cache.put("A Study of Things", Source::ExternalSearch, &value);
        let cached = cache.get("A Study of Things", Source::ExternalSearch);
        assert_eq!(cached, Some(value));
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn sources_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        cache.put("A Title", Source::ExternalSearch, &json!({ "x": 1 }));
        assert!(cache.get("A Title", Source::LocalLibrary).is_none());
        assert!(cache.get("A Title", Source::ExternalSearch).is_some());
    }

    #[test]
    fn put_preserves_other_sources() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        cache.put("A Title", Source::LocalLibrary, &json!({ "key": "ABC" }));
        cache.put("A Title", Source::ExternalSearch, &json!({ "title": "t" }));
        assert_eq!(
            cache.get("A Title", Source::LocalLibrary),
            Some(json!({ "key": "ABC" }))
        );
    }

    #[test]
    fn normalized_keys_collide_on_purpose() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        cache.put("A Study: of Things!", Source::ExternalSearch, &json!({ "x": 1 }));
        assert!(cache.get("a study of things", Source::ExternalSearch).is_some());
    }

    #[test]
    fn empty_values_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        cache.put("A Title", Source::ExternalSearch, &Value::Null);
        cache.put("A Title", Source::ExternalSearch, &json!({}));
        cache.put("A Title", Source::ExternalSearch, &json!(""));
        assert!(cache.get("A Title", Source::ExternalSearch).is_none());
    }

    #[test]
    fn no_match_sentinel_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        cache.put("A Title", Source::ExternalSearch, &no_match());
        let cached = cache.get("A Title", Source::ExternalSearch).unwrap();
        assert!(is_no_match(&cached));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = ResolutionCache::open(dir.path()).unwrap();
            cache.put("A Title", Source::LocalLibrary, &json!({ "key": "ABC" }));
        }
        let cache = ResolutionCache::open(dir.path()).unwrap();
        assert_eq!(
            cache.get("A Title", Source::LocalLibrary),
            Some(json!({ "key": "ABC" }))
        );
    }

    #[test]
    fn corrupt_file_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        cache.put("A Title", Source::LocalLibrary, &json!({ "key": "ABC" }));
        // Clobber the entry on disk.
        let path = cache.path_for("A Title");
        fs::write(&path, "{not json").unwrap();
        assert!(cache.get("A Title", Source::LocalLibrary).is_none());
    }

    #[test]
    fn long_keys_get_hashed_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let long_key = "word ".repeat(60);
        cache.put(&long_key, Source::ExternalSearchByCitation, &json!({ "x": 1 }));
        assert!(cache.get(&long_key, Source::ExternalSearchByCitation).is_some());
        let name = cache.path_for(&long_key);
        assert_eq!(name.file_name().unwrap().to_str().unwrap().len(), 64);
    }
}
