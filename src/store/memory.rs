//! In-process key-value backend.
//!
//! Stands in for the externally managed shared cache service. Entries carry
//! a per-key write version for conditional puts and an optional expiry that
//! is enforced lazily on access.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::backend::{PutCondition, PutOptions, StoreBackend, StoreError, StoredEntry, Version};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    version: Version,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Shared in-process backend keyed by composed store keys.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expires_at(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(StoredEntry {
                    value: entry.value.clone(),
                    version: entry.version,
                }));
            }
        } else {
            return Ok(None);
        }

        // expired: drop it so versions restart with the next write
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, opts: PutOptions) -> Result<Version, StoreError> {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        let expires_at = Self::expires_at(opts.ttl);

        match self.entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                if let PutCondition::IfVersion(expected) = opts.effective_condition() {
                    return Err(StoreError::Conflict {
                        key: key.to_string(),
                        expected: Some(expected),
                        found: None,
                    });
                }
                vacant.insert(MemoryEntry {
                    value,
                    version: 1,
                    expires_at,
                });
                Ok(1)
            }
            Entry::Occupied(mut occupied) => {
                let live = !occupied.get().is_expired(now);
                let found = live.then(|| occupied.get().version);

                match opts.effective_condition() {
                    PutCondition::Any => {}
                    PutCondition::IfAbsent => {
                        if live {
                            return Err(StoreError::Conflict {
                                key: key.to_string(),
                                expected: None,
                                found,
                            });
                        }
                    }
                    PutCondition::IfVersion(expected) => {
                        if found != Some(expected) {
                            return Err(StoreError::Conflict {
                                key: key.to_string(),
                                expected: Some(expected),
                                found,
                            });
                        }
                    }
                }

                let version = if live { occupied.get().version + 1 } else { 1 };
                occupied.insert(MemoryEntry {
                    value,
                    version,
                    expires_at,
                });
                Ok(version)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
