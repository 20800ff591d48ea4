//! Scoped local query cache.
//!
//! Entries are keyed by the (logical key, tenant, auth token) triple, so a
//! cached read is only ever served back to the identity and tenant it was
//! fetched for. Invalidation marks an entry stale in place; the value stays
//! available to callers that explicitly tolerate staleness, and the next
//! `get_or_fetch` replaces it.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;
use serde_json::Value;
use tracing::warn;

/// The tenant and auth token a session's cached reads are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryScope {
    pub tenant: String,
    pub token: String,
}

impl QueryScope {
    pub fn new(tenant: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            token: token.into(),
        }
    }
}

/// Full cache key of one locally cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedQueryKey {
    pub logical: String,
    pub tenant: String,
    pub token: String,
}

impl ScopedQueryKey {
    pub fn new(logical: impl Into<String>, scope: &QueryScope) -> Self {
        Self {
            logical: logical.into(),
            tenant: scope.tenant.clone(),
            token: scope.token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Fresh(Value),
    Stale(Value),
}

/// Bounded cache of query results with staleness marking.
pub struct QueryCache {
    entries: Mutex<LruCache<ScopedQueryKey, Slot>>,
}

impl QueryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<ScopedQueryKey, Slot>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned query cache lock"
                );
                poisoned.into_inner()
            }
        }
    }

    /// Store a freshly fetched value.
    pub fn put(&self, key: ScopedQueryKey, value: Value) {
        self.lock().put(key, Slot::Fresh(value));
    }

    /// Return the cached value only when it is fresh.
    pub fn get_fresh(&self, key: &ScopedQueryKey) -> Option<Value> {
        match self.lock().get(key) {
            Some(Slot::Fresh(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// True when the next read must go to the source: the entry is stale or
    /// absent.
    pub fn needs_refetch(&self, key: &ScopedQueryKey) -> bool {
        !matches!(self.lock().peek(key), Some(Slot::Fresh(_)))
    }

    /// Mark the entry for `logical` under `scope` stale.
    ///
    /// Returns whether an entry existed; invalidating an uncached key is a
    /// no-op because the next read fetches anyway.
    pub fn mark_stale(&self, logical: &str, scope: &QueryScope) -> bool {
        let key = ScopedQueryKey::new(logical, scope);
        let mut entries = self.lock();
        match entries.peek(&key) {
            Some(slot) => {
                let value = match slot {
                    Slot::Fresh(value) | Slot::Stale(value) => value.clone(),
                };
                entries.put(key, Slot::Stale(value));
                true
            }
            None => false,
        }
    }

    /// Read through the cache: serve a fresh entry, otherwise fetch,
    /// store, and return.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: ScopedQueryKey,
        fetch: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.get_fresh(&key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cache() -> QueryCache {
        QueryCache::new(NonZeroUsize::new(32).expect("capacity"))
    }

    fn scope() -> QueryScope {
        QueryScope::new("p1", "tok-1")
    }

    #[test]
    fn fresh_entries_are_served() {
        let cache = cache();
        let key = ScopedQueryKey::new("notifications", &scope());

        cache.put(key.clone(), json!(["n1"]));
        assert_eq!(cache.get_fresh(&key), Some(json!(["n1"])));
        assert!(!cache.needs_refetch(&key));
    }

    #[test]
    fn stale_entries_force_refetch() {
        let cache = cache();
        let key = ScopedQueryKey::new("notifications", &scope());

        cache.put(key.clone(), json!(["n1"]));
        assert!(cache.mark_stale("notifications", &scope()));

        assert_eq!(cache.get_fresh(&key), None);
        assert!(cache.needs_refetch(&key));
    }

    #[test]
    fn invalidation_is_scoped_per_tenant_and_token() {
        let cache = cache();
        let p1 = QueryScope::new("p1", "tok-1");
        let p2 = QueryScope::new("p2", "tok-1");
        let other_token = QueryScope::new("p1", "tok-2");

        cache.put(ScopedQueryKey::new("notifications", &p1), json!(1));
        cache.put(ScopedQueryKey::new("notifications", &p2), json!(2));
        cache.put(ScopedQueryKey::new("notifications", &other_token), json!(3));

        cache.mark_stale("notifications", &p1);

        assert!(cache.needs_refetch(&ScopedQueryKey::new("notifications", &p1)));
        assert!(!cache.needs_refetch(&ScopedQueryKey::new("notifications", &p2)));
        assert!(!cache.needs_refetch(&ScopedQueryKey::new("notifications", &other_token)));
    }

    #[test]
    fn marking_an_uncached_key_is_a_noop() {
        let cache = cache();
        assert!(!cache.mark_stale("billing", &scope()));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn get_or_fetch_fetches_once_until_invalidated() {
        let cache = cache();
        let key = ScopedQueryKey::new("notifications", &scope());

        let first: Result<_, std::convert::Infallible> = cache
            .get_or_fetch(key.clone(), || async { Ok(json!(["v1"])) })
            .await;
        assert_eq!(first.expect("fetch"), json!(["v1"]));

        // served from cache: the fetcher is not consulted
        let second: Result<_, std::convert::Infallible> = cache
            .get_or_fetch(key.clone(), || async {
                panic!("fresh entry must not refetch")
            })
            .await;
        assert_eq!(second.expect("cached"), json!(["v1"]));

        cache.mark_stale("notifications", &scope());
        let third: Result<_, std::convert::Infallible> = cache
            .get_or_fetch(key.clone(), || async { Ok(json!(["v2"])) })
            .await;
        assert_eq!(third.expect("refetch"), json!(["v2"]));
    }
}
