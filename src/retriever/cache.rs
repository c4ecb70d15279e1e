//! Persistent content cache.
//!
//! Maps the exact stripped source line to the derived text that gets
//! embedded, so lines are not re-derived on every build. Stored as a
//! pretty-printed JSON object, fully rewritten on every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("io error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("cache file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Key→value table of resolved lines, loaded once per build pass.
///
/// Entries are only ever added, never removed. A BTreeMap keeps the
/// persisted file stably ordered across saves.
pub struct ContentCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ContentCache {
    /// Load the cache from `path`. An absent file yields an empty cache,
    /// never an error; a present-but-malformed file is an error.
    pub fn load(path: PathBuf) -> Result<Self, CacheError> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(ContentCache { path, entries })
    }

    /// Create an empty cache that will persist to `path`.
    pub fn empty(path: PathBuf) -> Self {
        ContentCache {
            path,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Return the cached value for `key`, resolving it first on a miss.
    ///
    /// With `force` set the resolver runs even on a hit and a non-empty
    /// result overwrites the entry. An empty resolution stores nothing;
    /// the returned value is then whatever was already cached, or `None`
    /// (the line is unresolved for this build).
    pub fn get_or_resolve<F>(&mut self, key: &str, force: bool, resolve: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        if force || !self.entries.contains_key(key) {
            if let Some(text) = resolve(key).filter(|t| !t.trim().is_empty()) {
                self.entries.insert(key.to_string(), text);
            }
        }

        self.entries.get(key).cloned()
    }

    /// Persist the full table, overwriting any previous file.
    /// Writes to a temp file and renames into place.
    pub fn save(&self) -> Result<(), CacheError> {
        let content = serde_json::to_string_pretty(&self.entries)?;

        let temp_path = self.path.with_extension("tmp");
        if let Err(err) = std::fs::write(&temp_path, content) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path() -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "urlindex-cache-test-{}-{}.json",
            std::process::id(),
            counter
        ))
    }

    #[test]
    fn test_load_absent_file_is_empty() {
        let cache = ContentCache::load(temp_path()).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_or_resolve_miss_stores() {
        let mut cache = ContentCache::empty(temp_path());

        let value = cache.get_or_resolve("key", false, |_| Some("text".to_string()));
        assert_eq!(value, Some("text".to_string()));
        assert_eq!(cache.get("key"), Some("text"));
    }

    #[test]
    fn test_get_or_resolve_hit_skips_resolver() {
        let mut cache = ContentCache::empty(temp_path());
        cache.get_or_resolve("key", false, |_| Some("first".to_string()));

        let mut calls = 0;
        let value = cache.get_or_resolve("key", false, |_| {
            calls += 1;
            Some("second".to_string())
        });

        assert_eq!(value, Some("first".to_string()));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_get_or_resolve_force_overwrites() {
        let mut cache = ContentCache::empty(temp_path());
        cache.get_or_resolve("key", false, |_| Some("first".to_string()));

        let value = cache.get_or_resolve("key", true, |_| Some("second".to_string()));
        assert_eq!(value, Some("second".to_string()));
    }

    #[test]
    fn test_empty_resolution_stores_nothing() {
        let mut cache = ContentCache::empty(temp_path());

        let value = cache.get_or_resolve("key", false, |_| None);
        assert_eq!(value, None);
        assert!(!cache.contains("key"));

        let value = cache.get_or_resolve("key", false, |_| Some("   ".to_string()));
        assert_eq!(value, None);
        assert!(!cache.contains("key"));
    }

    #[test]
    fn test_force_with_empty_resolution_keeps_old_entry() {
        let mut cache = ContentCache::empty(temp_path());
        cache.get_or_resolve("key", false, |_| Some("first".to_string()));

        // Forced re-resolution fails; the stale entry still answers.
        let value = cache.get_or_resolve("key", true, |_| None);
        assert_eq!(value, Some("first".to_string()));
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path();

        let mut cache = ContentCache::empty(path.clone());
        cache.get_or_resolve("https://a.example Learn math", false, |_| {
            Some("Learn math: https://a.example".to_string())
        });
        cache.save().unwrap();

        let reloaded = ContentCache::load(path.clone()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get("https://a.example Learn math"),
            Some("Learn math: https://a.example")
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_save_is_full_overwrite() {
        let path = temp_path();

        let mut cache = ContentCache::empty(path.clone());
        cache.get_or_resolve("a", false, |_| Some("1".to_string()));
        cache.get_or_resolve("b", false, |_| Some("2".to_string()));
        cache.save().unwrap();

        let smaller = ContentCache::empty(path.clone());
        smaller.save().unwrap();

        let reloaded = ContentCache::load(path.clone()).unwrap();
        assert!(reloaded.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_saved_file_is_pretty_json() {
        let path = temp_path();

        let mut cache = ContentCache::empty(path.clone());
        cache.get_or_resolve("a", false, |_| Some("1".to_string()));
        cache.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        let parsed: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.get("a"), Some(&"1".to_string()));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let path = temp_path();
        std::fs::write(&path, "not json").unwrap();

        let result = ContentCache::load(path.clone());
        assert!(matches!(result, Err(CacheError::Malformed(_))));

        let _ = std::fs::remove_file(&path);
    }
}
