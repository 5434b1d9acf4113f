use crate::context::FileFeatures;
use crate::language::Language;
use crate::syntax::SyntaxTree;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// SHA-256 of language + content
pub type ContentKey = [u8; 32];

pub fn content_key(language: Language, content: &str) -> ContentKey {
    let mut hasher = Sha256::new();
    hasher.update(language.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.finalize().into()
}

/// Outcome of purging one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub entries: usize,
    pub bytes: u64,
}

/// Auxiliary cache that can be emptied under memory pressure
pub trait Purgeable: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate memory held by the cached entries
    fn estimated_bytes(&self) -> u64;

    fn purge(&self) -> PurgeStats;
}

struct Entry<V> {
    value: V,
    weight: u64,
}

/// Thread-safe LRU keyed by content hash
pub struct ContentCache<V> {
    name: &'static str,
    inner: Mutex<LruCache<ContentKey, Entry<V>>>,
}

impl<V: Clone> ContentCache<V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<V> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).map(|entry| entry.value.clone())
    }

    /// `weight` is the approximate size in bytes charged for the entry
    pub fn insert(&self, key: ContentKey, value: V, weight: u64) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(key, Entry { value, weight });
    }

    /// Return the cached value or compute, cache and return it
    pub fn get_or_insert_with(&self, key: ContentKey, weight: u64, make: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let value = make();
        self.insert(key, value.clone(), weight);
        value
    }
}

impl<V: Send> Purgeable for ContentCache<V> {
    fn name(&self) -> &str {
        self.name
    }

    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn estimated_bytes(&self) -> u64 {
        let cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.iter().map(|(_, entry)| entry.weight).sum()
    }

    fn purge(&self) -> PurgeStats {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = PurgeStats {
            entries: cache.len(),
            bytes: cache.iter().map(|(_, entry)| entry.weight).sum(),
        };
        cache.clear();
        stats
    }
}

/// Parsed syntax trees
pub type TreeCache = ContentCache<SyntaxTree>;

/// Derived file features
pub type FeatureCache = ContentCache<FileFeatures>;

const TREE_CACHE_CAPACITY: usize = 128;
const FEATURE_CACHE_CAPACITY: usize = 1024;

/// The caches owned by one coordinator and purged by the guard
#[derive(Clone)]
pub struct AuxiliaryCaches {
    pub trees: Arc<TreeCache>,
    pub features: Arc<FeatureCache>,
}

impl Default for AuxiliaryCaches {
    fn default() -> Self {
        Self {
            trees: Arc::new(TreeCache::new("syntax-trees", TREE_CACHE_CAPACITY)),
            features: Arc::new(FeatureCache::new("file-features", FEATURE_CACHE_CAPACITY)),
        }
    }
}

impl std::fmt::Debug for AuxiliaryCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxiliaryCaches")
            .field("trees", &self.trees.len())
            .field("features", &self.features.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_language_and_content() {
        let a = content_key(Language::Rust, "fn a() {}");
        assert_eq!(a, content_key(Language::Rust, "fn a() {}"));
        assert_ne!(a, content_key(Language::Python, "fn a() {}"));
        assert_ne!(a, content_key(Language::Rust, "fn b() {}"));
    }

    #[test]
    fn get_or_insert_computes_once() {
        let cache: ContentCache<u32> = ContentCache::new("numbers", 4);
        let key = content_key(Language::Text, "x");
        let mut calls = 0;
        let first = cache.get_or_insert_with(key, 8, || {
            calls += 1;
            7
        });
        let second = cache.get_or_insert_with(key, 8, || {
            calls += 1;
            9
        });
        assert_eq!((first, second, calls), (7, 7, 1));
    }

    #[test]
    fn purge_reports_what_it_freed() {
        let cache: ContentCache<String> = ContentCache::new("strings", 4);
        cache.insert(content_key(Language::Text, "a"), "a".into(), 100);
        cache.insert(content_key(Language::Text, "b"), "b".into(), 50);
        assert_eq!(cache.estimated_bytes(), 150);

        let stats = cache.purge();
        assert_eq!(stats, PurgeStats { entries: 2, bytes: 150 });
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_evicts_oldest() {
        let cache: ContentCache<u8> = ContentCache::new("tiny", 1);
        let a = content_key(Language::Text, "a");
        let b = content_key(Language::Text, "b");
        cache.insert(a, 1, 1);
        cache.insert(b, 2, 1);
        assert!(cache.get(&a).is_none());
        assert_eq!(cache.get(&b), Some(2));
    }
}
