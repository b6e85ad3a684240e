//! Compiled-expression cache keyed by exact source text.

use crate::domain::compiler::{compile, CompiledExpression};
use crate::domain::error::CompileError;
use crate::domain::lru::{CacheStats, LruCache};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub const DEFAULT_EXPRESSION_CACHE_CAPACITY: usize = 128;

struct Inner {
    entries: LruCache<String, Arc<CompiledExpression>>,
    hits: u64,
    misses: u64,
}

pub struct ExpressionCache {
    inner: Mutex<Inner>,
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_EXPRESSION_CACHE_CAPACITY)
    }
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached compile. The lock is not held while parsing; if two threads
    /// miss on the same source concurrently the first insert wins.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<CompiledExpression>, CompileError> {
        {
            let mut inner = self.lock();
            let key = source.to_string();
            if let Some(found) = inner.entries.get(&key).cloned() {
                inner.hits += 1;
                return Ok(found);
            }
            inner.misses += 1;
        }

        debug!(source, "expression cache miss");
        let compiled = Arc::new(compile(source)?);

        let mut inner = self.lock();
        let key = source.to_string();
        if let Some(existing) = inner.entries.peek(&key).cloned() {
            return Ok(existing);
        }
        if let Some((evicted, _)) = inner.entries.insert(key, Arc::clone(&compiled)) {
            debug!(evicted = %evicted, "expression cache eviction");
        }
        Ok(compiled)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.lock().entries.contains(&source.to_string())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            maxsize: inner.entries.capacity(),
        }
    }

    /// Drop all entries and reset counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = ExpressionCache::new(4);
        let a = cache.get_or_compile("x > 1").unwrap();
        let b = cache.get_or_compile("x > 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn eviction_beyond_capacity() {
        let cache = ExpressionCache::new(2);
        cache.get_or_compile("a").unwrap();
        cache.get_or_compile("b").unwrap();
        cache.get_or_compile("c").unwrap();
        let stats = cache.stats();
        assert_eq!(stats.size, stats.maxsize);
        assert!(!cache.contains("a"));

        cache.get_or_compile("a").unwrap();
        assert_eq!(cache.stats().misses, 4);
    }

    #[test]
    fn compile_errors_are_not_cached() {
        let cache = ExpressionCache::new(2);
        assert!(cache.get_or_compile("a >").is_err());
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn clear_resets() {
        let cache = ExpressionCache::default();
        cache.get_or_compile("1 + 1").unwrap();
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 0, misses: 0, size: 0, maxsize: 128 });
    }
}
