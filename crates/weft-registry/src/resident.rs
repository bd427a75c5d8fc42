use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;

/// Bounded set of modules allowed to keep compiled bytes in memory
///
/// Touching a module marks it most recently used; once the bound is exceeded
/// the least recently used specifier is handed back for eviction. A bound of
/// zero disables eviction.
#[derive(Debug)]
pub(crate) struct ResidentSet {
    lru: Option<Mutex<LruCache<String, ()>>>,
}

impl ResidentSet {
    pub(crate) fn new(max_resident: usize) -> Self {
        Self {
            lru: NonZeroUsize::new(max_resident).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Record use of `specifier`; returns the specifier to evict, if any
    pub(crate) async fn touch(&self, specifier: &str) -> Option<String> {
        let lru = self.lru.as_ref()?;
        let mut lru = lru.lock().await;
        match lru.push(specifier.to_string(), ()) {
            Some((evicted, ())) if evicted != specifier => Some(evicted),
            _ => None,
        }
    }

    pub(crate) async fn forget(&self, specifier: &str) {
        if let Some(lru) = &self.lru {
            lru.lock().await.pop(specifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_never_evicts() {
        let set = ResidentSet::new(0);
        for i in 0..100 {
            assert_eq!(set.touch(&format!("/m{i}.ts")).await, None);
        }
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let set = ResidentSet::new(2);
        assert_eq!(set.touch("/a.ts").await, None);
        assert_eq!(set.touch("/b.ts").await, None);
        assert_eq!(set.touch("/a.ts").await, None);
        assert_eq!(set.touch("/c.ts").await.as_deref(), Some("/b.ts"));

        set.forget("/a.ts").await;
        assert_eq!(set.touch("/d.ts").await, None);
    }
}
