//! Time-windowed cache for remote query results.
//!
//! An entry is served while fresh, kept (but not served) until its retention
//! window ends, and evicted after that.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// How long a fetched result is served.
pub const DEFAULT_FRESH_FOR: Duration = Duration::from_secs(10 * 60);

/// How long a fetched result is kept before eviction.
pub const DEFAULT_RETAIN_FOR: Duration = Duration::from_secs(30 * 60);

/// Freshness and retention windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub fresh_for: Duration,
    pub retain_for: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_for: DEFAULT_FRESH_FOR,
            retain_for: DEFAULT_RETAIN_FOR,
        }
    }
}

/// Where a key stands relative to the cache windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

pub struct QueryCache<K, V> {
    policy: CachePolicy,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The cached value if it is still fresh. Entries past retention are evicted on the way.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        let mut entries = self.entries();
        let age = entries.get(key)?.fetched_at.elapsed();

        if age < self.policy.fresh_for {
            entries.get(key).map(|e| e.value.clone())
        } else {
            if age >= self.policy.retain_for {
                entries.remove(key);
            }
            None
        }
    }

    pub fn freshness(&self, key: &K) -> Freshness {
        match self.entries().get(key) {
            None => Freshness::Missing,
            Some(entry) => {
                let age = entry.fetched_at.elapsed();
                if age < self.policy.fresh_for {
                    Freshness::Fresh
                } else if age < self.policy.retain_for {
                    Freshness::Stale
                } else {
                    Freshness::Missing
                }
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries().insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every entry whose key matches.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|k, _| !predicate(k));
        before - entries.len()
    }

    /// Evict entries past their retention window. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let retain_for = self.policy.retain_for;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.fetched_at.elapsed() < retain_for);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_then_stale_then_evicted() {
        let cache: QueryCache<&str, u32> = QueryCache::new(CachePolicy::default());
        cache.insert("issues", 7);

        assert_eq!(cache.get_fresh(&"issues"), Some(7));
        assert_eq!(cache.freshness(&"issues"), Freshness::Fresh);

        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert_eq!(cache.freshness(&"issues"), Freshness::Stale);
        assert_eq!(cache.get_fresh(&"issues"), None);
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        assert_eq!(cache.freshness(&"issues"), Freshness::Missing);
        assert_eq!(cache.prune(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_fresh_evicts_expired_entry() {
        let cache: QueryCache<&str, u32> = QueryCache::new(CachePolicy::default());
        cache.insert("projects", 1);

        tokio::time::advance(DEFAULT_RETAIN_FOR).await;
        assert_eq!(cache.get_fresh(&"projects"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_where() {
        let cache: QueryCache<(u8, &str), u32> = QueryCache::new(CachePolicy::default());
        cache.insert((1, "a"), 1);
        cache.insert((1, "b"), 2);
        cache.insert((2, "a"), 3);

        assert_eq!(cache.invalidate_where(|(kind, _)| *kind == 1), 2);
        assert_eq!(cache.len(), 1);
    }
}
