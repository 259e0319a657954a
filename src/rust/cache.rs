//! Content-addressed memoization of normalized text.
//!
//! Keys are SHA-256 digests of the raw bytes. A digest collision would return
//! another document's normalized form; with a non-adversarial corpus this is
//! accepted and goes undetected.
//!
//! The cache is unbounded unless configured with [`CachePolicy::Capped`], and
//! it never evicts. Persistence is explicit: nothing reaches disk until
//! [`MemoCache::flush`] is called.
//!
//! A normalized form is only valid for the normalizer settings that produced
//! it. A cache is therefore bound to a normalizer fingerprint (see
//! [`crate::Normalizer::fingerprint`]), which travels with the snapshot;
//! binding to different settings discards the stored entries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::digest::Output;
use sha2::{Digest, Sha256};

use crate::error::{DetectorError, Result};
use crate::normalizer::NormalizedDocument;

const HASH_LEN: usize = 32;

/// Fixed-width digest of a raw document's bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(Output<Sha256>);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(hasher.finalize())
    }

    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != HASH_LEN * 2 || !hex.is_ascii() {
            return None;
        }
        let mut digest = Output::<Sha256>::default();
        for (i, byte) in digest.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(digest))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// Growth policy of a cache. Neither variant evicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachePolicy {
    #[default]
    Unbounded,
    /// Stop admitting new keys once this many entries are held
    Capped(usize),
}

/// On-disk form of a cache: the normalizer fingerprint plus hex key → text
#[derive(Serialize, Deserialize)]
struct Snapshot<S> {
    fingerprint: Option<String>,
    entries: BTreeMap<String, S>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub approx_size_bytes: usize,
}

/// In-memory map from content hash to normalized text, optionally mirrored
/// to a JSON snapshot file.
///
/// Not shared across processes: parallel workers each get their own
/// instance and are merged back with [`MemoCache::merge`].
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: HashMap<ContentHash, NormalizedDocument>,
    policy: CachePolicy,
    snapshot_path: Option<PathBuf>,
    fingerprint: Option<String>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CachePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Creates a cache mirrored to `path`, loading the snapshot if one exists.
    ///
    /// An unreadable snapshot is logged and ignored; the cache starts empty.
    /// A readable one also restores the fingerprint it was written under.
    pub fn open<P: AsRef<Path>>(path: P, policy: CachePolicy) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut cache = Self::with_policy(policy);
        if path.exists() {
            match Self::read_snapshot(&path) {
                Ok((fingerprint, entries)) => {
                    for (hash, doc) in entries {
                        cache.insert(hash, doc);
                    }
                    cache.fingerprint = fingerprint;
                    info!("Cache loaded from {:?}: {} entries", path, cache.len());
                }
                Err(e) => warn!("Failed to load cache snapshot {:?}: {}", path, e),
            }
        }
        cache.snapshot_path = Some(path);
        cache
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Fingerprint of the normalizer settings the entries were produced under
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Binds the cache to a normalizer fingerprint.
    ///
    /// Entries produced under other settings, or under unknown settings, are
    /// dropped from memory. The snapshot file is rewritten on the next flush.
    pub fn bind(&mut self, fingerprint: &str) {
        if self.fingerprint.as_deref() == Some(fingerprint) {
            return;
        }
        if !self.entries.is_empty() {
            warn!(
                "Discarding {} cache entries normalized under other settings ({})",
                self.entries.len(),
                self.fingerprint.as_deref().unwrap_or("unknown")
            );
            self.entries.clear();
        }
        self.fingerprint = Some(fingerprint.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, raw_text: &str) -> Option<NormalizedDocument> {
        let hit = self.entries.get(&ContentHash::of(raw_text)).cloned();
        debug!("Cache {}", if hit.is_some() { "hit" } else { "miss" });
        hit
    }

    pub fn put(&mut self, raw_text: &str, normalized: NormalizedDocument) {
        self.insert(ContentHash::of(raw_text), normalized);
    }

    /// Empties the cache and deletes its snapshot file, if any.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        if let Some(path) = &self.snapshot_path {
            if path.exists() {
                fs::remove_file(path).map_err(|e| {
                    DetectorError::Persistence(format!("Failed to remove cache snapshot {:?}: {}", path, e))
                })?;
            }
        }
        info!("Cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let approx_size_bytes = self
            .entries
            .values()
            .map(|doc| HASH_LEN + doc.as_str().len())
            .sum();
        CacheStats {
            entry_count: self.entries.len(),
            approx_size_bytes,
        }
    }

    /// Absorbs the entries of another cache, typically a worker's private one.
    pub fn merge(&mut self, other: MemoCache) {
        let before = self.len();
        for (hash, doc) in other.entries {
            self.insert(hash, doc);
        }
        debug!("Merged {} new cache entries", self.len() - before);
    }

    /// Writes the snapshot to the path given at [`MemoCache::open`].
    pub fn flush(&self) -> Result<()> {
        let path = self.snapshot_path.as_ref().ok_or_else(|| {
            DetectorError::Persistence("Cache has no snapshot path configured".into())
        })?;
        self.flush_to(path)
    }

    pub fn flush_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            fingerprint: self.fingerprint.clone(),
            entries: self
                .entries
                .iter()
                .map(|(hash, doc)| (hash.to_hex(), doc.as_str()))
                .collect::<BTreeMap<String, &str>>(),
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| DetectorError::Persistence(format!("Failed to encode cache snapshot: {}", e)))?;
        write_atomically(path, json.as_bytes())?;
        info!("Cache saved to {:?}: {} entries", path, self.len());
        Ok(())
    }

    fn insert(&mut self, hash: ContentHash, doc: NormalizedDocument) {
        if let CachePolicy::Capped(limit) = self.policy {
            if self.entries.len() >= limit && !self.entries.contains_key(&hash) {
                debug!("Cache full ({} entries), not admitting {}", limit, hash);
                return;
            }
        }
        self.entries.insert(hash, doc);
    }

    fn read_snapshot(path: &Path) -> Result<(Option<String>, Vec<(ContentHash, NormalizedDocument)>)> {
        let json = fs::read_to_string(path)?;
        let snapshot: Snapshot<String> = serde_json::from_str(&json)
            .map_err(|e| DetectorError::Persistence(format!("Corrupt cache snapshot: {}", e)))?;
        let entries = snapshot
            .entries
            .into_iter()
            .map(|(hex, text)| {
                ContentHash::from_hex(&hex)
                    .map(|hash| (hash, NormalizedDocument::from(text)))
                    .ok_or_else(|| DetectorError::Persistence(format!("Invalid cache key '{}'", hex)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((snapshot.fingerprint, entries))
    }
}

/// Writes `bytes` next to `path` and renames over it, so readers never see
/// a partial file.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)
        .map_err(|e| DetectorError::Persistence(format!("Failed to write {:?}: {}", tmp, e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| DetectorError::Persistence(format!("Failed to move {:?} into place: {}", path, e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(text: &str) -> NormalizedDocument {
        NormalizedDocument::from(text.to_string())
    }

    #[test]
    fn test_put_then_get() {
        let mut cache = MemoCache::new();
        assert!(cache.get("Hello World!").is_none());
        cache.put("Hello World!", doc("hello world"));
        assert_eq!(cache.get("Hello World!"), Some(doc("hello world")));
        // Keys are byte-exact
        assert!(cache.get("hello world!").is_none());
    }

    #[test]
    fn test_clear() {
        let mut cache = MemoCache::new();
        cache.put("a b c", doc("b c"));
        cache.clear().unwrap();
        assert!(cache.get("a b c").is_none());
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn test_stats() {
        let mut cache = MemoCache::new();
        cache.put("one", doc("1234"));
        cache.put("two", doc("12"));
        cache.put("one", doc("1234"));
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.approx_size_bytes, 2 * 32 + 6);
    }

    #[test]
    fn test_capped_policy_never_evicts() {
        let mut cache = MemoCache::with_policy(CachePolicy::Capped(2));
        cache.put("a", doc("a"));
        cache.put("b", doc("b"));
        cache.put("c", doc("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_none());
        // Existing keys may still be overwritten
        cache.put("a", doc("aa"));
        assert_eq!(cache.get("a"), Some(doc("aa")));
    }

    #[test]
    fn test_merge() {
        let mut main = MemoCache::new();
        main.put("x", doc("x"));
        let mut worker = MemoCache::new();
        worker.put("y", doc("y"));
        main.merge(worker);
        assert_eq!(main.len(), 2);
        assert_eq!(main.get("y"), Some(doc("y")));
    }

    #[test]
    fn test_snapshot_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cache").join("snapshot.json");

        let mut cache = MemoCache::open(&path, CachePolicy::Unbounded);
        assert!(cache.is_empty());
        cache.put("URGENT! Verify now", doc("urgent verify now"));
        cache.flush()?;
        assert!(path.exists());

        let reopened = MemoCache::open(&path, CachePolicy::Unbounded);
        assert_eq!(reopened.get("URGENT! Verify now"), Some(doc("urgent verify now")));

        let mut reopened = reopened;
        reopened.clear()?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "not json at all")?;
        let cache = MemoCache::open(&path, CachePolicy::Unbounded);
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_bind_discards_entries_of_other_settings() {
        let mut cache = MemoCache::new();
        cache.bind("english");
        cache.put("The meeting", doc("meeting"));

        cache.bind("english");
        assert_eq!(cache.get("The meeting"), Some(doc("meeting")));

        cache.bind("portuguese");
        assert!(cache.is_empty());
        assert_eq!(cache.fingerprint(), Some("portuguese"));
    }

    #[test]
    fn test_unbound_entries_are_discarded_on_bind() {
        let mut cache = MemoCache::new();
        cache.put("a", doc("a"));
        cache.bind("english");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_fingerprint() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("snapshot.json");

        let mut cache = MemoCache::open(&path, CachePolicy::Unbounded);
        cache.bind("english");
        cache.put("The meeting", doc("meeting"));
        cache.flush()?;

        let mut reopened = MemoCache::open(&path, CachePolicy::Unbounded);
        assert_eq!(reopened.fingerprint(), Some("english"));
        reopened.bind("english");
        assert_eq!(reopened.len(), 1);
        reopened.bind("portuguese");
        assert!(reopened.is_empty());
        Ok(())
    }

    #[test]
    fn test_flush_without_path_fails() {
        let cache = MemoCache::new();
        assert!(matches!(cache.flush(), Err(DetectorError::Persistence(_))));
    }

    #[test]
    fn test_hash_hex_round_trip() {
        let hash = ContentHash::of("some text");
        assert_eq!(hash.to_hex().len(), 64);
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(
            ContentHash::of("").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(ContentHash::from_hex("zz"), None);
    }
}
