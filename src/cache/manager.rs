//! Cache manager for persisting raw API responses to disk
//!
//! Provides a `CacheManager` that stores response bodies as JSON files named
//! `<prefix>-<fingerprint>.json`. Entries never expire; the only way to
//! invalidate them is to delete files by prefix.

use chrono::Local;
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension used for cached pages
const CACHE_EXTENSION: &str = "json";

/// Errors raised by cache directory operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a cache file failed
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A prefix that would match every file in the cache directory
    #[error("cache prefix '{0}' has no letters or digits")]
    EmptyPrefix(String),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Manages reading and writing cached response bodies
///
/// The cache manager stores data in an XDG-compliant cache directory
/// (`~/.cache/ocfetch/` on Linux) unless a directory is given explicitly.
/// Every file name starts with the manager's prefix, which groups the pages of
/// one acquisition run and defaults to today's date.
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// Leading part of every cache file name
    prefix: String,
}

impl CacheManager {
    /// Creates a new CacheManager using XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "ocfetch")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self::with_dir(cache_dir))
    }

    /// Creates a new CacheManager with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            prefix: default_prefix(),
        }
    }

    /// Replaces the file name prefix with a slugified form of `text`
    ///
    /// Fails when nothing of `text` survives slugification, since an empty
    /// prefix would make every file in the directory part of this cache.
    pub fn with_prefix(mut self, text: &str) -> Result<Self, CacheError> {
        let prefix = slugify(text);
        if prefix.is_empty() {
            return Err(CacheError::EmptyPrefix(text.to_string()));
        }
        self.prefix = prefix;
        Ok(self)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Derives the cache key for a fully resolved request URL
    ///
    /// Anything after `#` is dropped since fragments never reach the server.
    pub fn key_for_url(&self, url: &str) -> String {
        let url = url.split('#').next().unwrap_or(url);
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        format!("{}-{:x}", self.prefix, hasher.finalize())
    }

    /// Returns the path to a cache file for the given key
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", key, CACHE_EXTENSION))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))
    }

    /// Writes a raw response body under `key`
    pub fn write(&self, key: &str, body: &str) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let path = self.cache_path(key);
        fs::write(&path, body).map_err(|e| CacheError::io(&path, e))
    }

    /// Reads the raw body stored under `key`
    ///
    /// Returns `Ok(None)` when no entry exists. A UTF-8 byte order mark at the
    /// start of the file is skipped.
    pub fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.cache_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let content = match content.strip_prefix('\u{feff}') {
                    Some(rest) => rest.to_string(),
                    None => content,
                };
                Ok(Some(content))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Deletes every cache file whose name starts with `prefix`
    ///
    /// Returns the number of files removed. A missing cache directory is
    /// treated as an empty cache. An empty `prefix` is rejected.
    pub fn clear(&self, prefix: &str) -> Result<usize, CacheError> {
        if prefix.is_empty() {
            return Err(CacheError::EmptyPrefix(prefix.to_string()));
        }
        self.remove_where(|name| name.starts_with(prefix))
    }

    /// Deletes every cache file that does NOT start with `prefix`
    pub fn clear_except(&self, prefix: &str) -> Result<usize, CacheError> {
        self.remove_where(|name| !name.starts_with(prefix))
    }

    fn remove_where<F: Fn(&str) -> bool>(&self, pred: F) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&self.cache_dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.cache_dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            if !pred(&name.to_string_lossy()) {
                continue;
            }
            fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Today's date, used when no explicit prefix is configured
fn default_prefix() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Lowercases `text` and collapses every run of non-alphanumerics into one `-`
///
/// Slugs are ASCII only. Accented Latin letters are folded to their base
/// letter (`"Cività"` becomes `"civita"`); any other non-ASCII character acts
/// as a separator.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        let mut buf = [0u8; 4];
        let part: &str = match ascii_fold(ch) {
            Some(folded) => folded,
            None if ch.is_ascii_alphanumeric() => ch.encode_utf8(&mut buf),
            None => {
                pending_dash = true;
                continue;
            }
        };
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push_str(part);
    }
    slug
}

/// ASCII spelling of a lowercase accented Latin letter
fn ascii_fold(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ß' => "ss",
        'ś' | 'ş' | 'š' => "s",
        'ţ' | 'ť' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (CacheManager, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf())
            .with_prefix("test run")
            .expect("Prefix should slugify");
        (cache, temp_dir)
    }

    #[test]
    fn test_write_creates_file_in_cache_directory() {
        let (cache, temp_dir) = create_test_cache();

        cache
            .write("test-run-abc", r#"{"totalResults": 3}"#)
            .expect("Write should succeed");

        let expected_path = temp_dir.path().join("test-run-abc.json");
        assert!(expected_path.exists(), "Cache file should exist");
        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("totalResults"));
    }

    #[test]
    fn test_read_returns_none_for_missing_key() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.read("nonexistent_key").unwrap().is_none());
    }

    #[test]
    fn test_read_returns_written_body() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write("k", "[1, 2, 3]").unwrap();
        assert_eq!(cache.read("k").unwrap().as_deref(), Some("[1, 2, 3]"));
    }

    #[test]
    fn test_read_strips_byte_order_mark() {
        let (cache, temp_dir) = create_test_cache();
        fs::write(temp_dir.path().join("bom.json"), "\u{feff}{\"a\": 1}").unwrap();
        assert_eq!(cache.read("bom").unwrap().as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let cache = CacheManager::with_dir(nested_path.clone());

        cache.write("nested_key", "{}").expect("Write should succeed");

        assert!(nested_path.exists(), "Nested directory should be created");
        assert!(nested_path.join("nested_key.json").exists(), "Cache file should exist");
    }

    #[test]
    fn test_key_for_url_is_deterministic_and_prefixed() {
        let (cache, _temp_dir) = create_test_cache();
        let a = cache.key_for_url("https://opencontext.org/query/?rows=200&start=0");
        let b = cache.key_for_url("https://opencontext.org/query/?rows=200&start=0");
        let c = cache.key_for_url("https://opencontext.org/query/?rows=200&start=200");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("test-run-"));
        // prefix, dash, 64 hex chars
        assert_eq!(a.len(), "test-run-".len() + 64);
    }

    #[test]
    fn test_key_for_url_ignores_fragment() {
        let (cache, _temp_dir) = create_test_cache();
        assert_eq!(
            cache.key_for_url("https://opencontext.org/query/?rows=5#tab-2"),
            cache.key_for_url("https://opencontext.org/query/?rows=5")
        );
    }

    #[test]
    fn test_clear_removes_only_matching_prefix() {
        let (cache, temp_dir) = create_test_cache();
        cache.write("keep-1", "{}").unwrap();
        cache.write("drop-1", "{}").unwrap();
        cache.write("drop-2", "{}").unwrap();
        fs::create_dir(temp_dir.path().join("drop-dir")).unwrap();

        let removed = cache.clear("drop").unwrap();

        assert_eq!(removed, 2);
        assert!(temp_dir.path().join("keep-1.json").exists());
        assert!(!temp_dir.path().join("drop-1.json").exists());
        assert!(temp_dir.path().join("drop-dir").exists(), "Directories are skipped");
    }

    #[test]
    fn test_clear_except_keeps_prefix() {
        let (cache, temp_dir) = create_test_cache();
        cache.write("2020-01-01-aaa", "{}").unwrap();
        cache.write("2024-05-06-bbb", "{}").unwrap();

        let removed = cache.clear_except("2024-05-06").unwrap();

        assert_eq!(removed, 1);
        assert!(temp_dir.path().join("2024-05-06-bbb.json").exists());
    }

    #[test]
    fn test_clear_on_missing_directory_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CacheManager::with_dir(temp_dir.path().join("absent"));
        assert_eq!(cache.clear("x").unwrap(), 0);
    }

    #[test]
    fn test_default_prefix_is_a_date() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf());
        assert_eq!(cache.prefix().len(), 10);
        assert_eq!(cache.prefix().matches('-').count(), 2);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Murlo Bone Survey"), "murlo-bone-survey");
        assert_eq!(slugify("  Poggio Civitate!! 2020 "), "poggio-civitate-2020");
        assert_eq!(slugify("already-slug"), "already-slug");
        assert_eq!(slugify("Cività Castellana"), "civita-castellana");
        assert_eq!(slugify("CITTÀ"), "citta");
        assert_eq!(slugify("Çatalhöyük"), "catalhoyuk");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_with_prefix_rejects_empty_slug() {
        let temp_dir = TempDir::new().unwrap();
        for text in ["!!!", "", "  ", "…"] {
            let result = CacheManager::with_dir(temp_dir.path().to_path_buf()).with_prefix(text);
            assert!(
                matches!(result, Err(CacheError::EmptyPrefix(_))),
                "prefix {:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_clear_refuses_empty_prefix() {
        let (cache, temp_dir) = create_test_cache();
        cache.write("2024-05-06-aaa", "{}").unwrap();
        cache.write("murlo-bbb", "{}").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "keep me").unwrap();

        let err = cache.clear("").unwrap_err();

        assert!(matches!(err, CacheError::EmptyPrefix(_)));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(cache) = CacheManager::new() {
            let path_str = cache.cache_dir.to_string_lossy();
            assert!(path_str.contains("ocfetch"), "Cache path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
