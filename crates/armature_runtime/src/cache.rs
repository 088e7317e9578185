//! Process-wide cache of pooled handles.
//!
//! Handles to external resources (database engines, connection pools) are
//! cached per connection configuration and reused across calls. Before a
//! cached handle is reused it gets a cheap liveness check; a dead handle is
//! disposed and rebuilt instead of failing every later call.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A cacheable handle to an external resource
pub trait PooledHandle: Send + Sync {
    /// Cheap liveness check
    fn is_alive(&self) -> bool;

    /// Release the underlying resource
    fn dispose(&self) {}
}

/// Cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Reused a live handle
    pub hits: u64,
    /// Built a handle for a new key
    pub misses: u64,
    /// Replaced a dead handle
    pub rebuilds: u64,
}

/// Map from connection configuration to a shared handle
pub struct HandleCache<K, H> {
    handles: Mutex<HashMap<K, Arc<H>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    rebuilds: AtomicU64,
}

impl<K, H> HandleCache<K, H>
where
    K: Eq + Hash + Clone,
    H: PooledHandle,
{
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Return the live handle for `key`, building one if absent or dead
    ///
    /// # Errors
    ///
    /// Propagates the error from `build`
    pub fn get_or_create<E, F>(&self, key: &K, build: F) -> Result<Arc<H>, E>
    where
        F: FnOnce(&K) -> Result<H, E>,
    {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = handles.get(key) {
            if handle.is_alive() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(handle));
            }
            if let Some(dead) = handles.remove(key) {
                dead.dispose();
            }
            self.rebuilds.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Discarded dead cached handle");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        let handle = Arc::new(build(key)?);
        handles.insert(key.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of cached handles
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every handle and clear the cache; returns how many were held
    pub fn dispose_all(&self) -> usize {
        let drained: Vec<Arc<H>> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &drained {
            handle.dispose();
        }
        drained.len()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
        }
    }
}

impl<K, H> Default for HandleCache<K, H>
where
    K: Eq + Hash + Clone,
    H: PooledHandle,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Engine {
        alive: AtomicBool,
        disposed: AtomicBool,
    }

    impl Engine {
        fn new() -> Self {
            Self {
                alive: AtomicBool::new(true),
                disposed: AtomicBool::new(false),
            }
        }
    }

    impl PooledHandle for Engine {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn dispose(&self) {
            self.disposed.store(true, Ordering::SeqCst);
        }
    }

    fn build(_: &String) -> Result<Engine, String> {
        Ok(Engine::new())
    }

    #[test]
    fn test_reuses_live_handle() {
        let cache: HandleCache<String, Engine> = HandleCache::new();
        let key = "sqlite://a".to_string();
        let first = cache.get_or_create(&key, build).unwrap();
        let second = cache.get_or_create(&key, build).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, rebuilds: 0 });
    }

    #[test]
    fn test_rebuilds_dead_handle() {
        let cache: HandleCache<String, Engine> = HandleCache::new();
        let key = "sqlite://a".to_string();
        let first = cache.get_or_create(&key, build).unwrap();
        first.alive.store(false, Ordering::SeqCst);

        let second = cache.get_or_create(&key, build).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.disposed.load(Ordering::SeqCst));
        assert_eq!(cache.stats().rebuilds, 1);
    }

    #[test]
    fn test_build_error_not_cached() {
        let cache: HandleCache<String, Engine> = HandleCache::new();
        let result = cache.get_or_create(&"bad".to_string(), |_| Err::<Engine, _>("refused"));
        assert_eq!(result.err(), Some("refused"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dispose_all() {
        let cache: HandleCache<String, Engine> = HandleCache::new();
        let a = cache.get_or_create(&"a".to_string(), build).unwrap();
        cache.get_or_create(&"b".to_string(), build).unwrap();
        assert_eq!(cache.dispose_all(), 2);
        assert!(cache.is_empty());
        assert!(a.disposed.load(Ordering::SeqCst));
    }
}
