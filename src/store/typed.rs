//! Schema-validated typed wrapper over a raw backend.

use std::marker::PhantomData;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{Schema, StoreKey};

use super::backend::{
    PutCondition, PutOptions, StoreBackend, StoreError, StoredEntry, Version,
};

const METRIC_STORE_CONFLICT_TOTAL: &str = "cachewire_store_conflict_total";

/// Attempts a read-modify-write makes before giving up on a contended key.
pub const UPDATE_RETRY_LIMIT: usize = 4;

/// A typed view of the shared key-value backend.
///
/// When a schema is attached, values are validated before every persist and
/// after every fetch; a value that fails read-time validation is a hard
/// error, never silently served.
pub struct TypedStore<T> {
    backend: Arc<dyn StoreBackend>,
    schema: Option<Arc<dyn Schema<T>>>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            schema: self.schema.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> TypedStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a schema-agnostic store.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            schema: None,
            _value: PhantomData,
        }
    }

    /// Create a store that validates every read and write against `schema`.
    pub fn with_schema(backend: Arc<dyn StoreBackend>, schema: Arc<dyn Schema<T>>) -> Self {
        Self {
            backend,
            schema: Some(schema),
            _value: PhantomData,
        }
    }

    fn validate(&self, value: &T) -> Result<(), StoreError> {
        if let Some(schema) = &self.schema {
            schema.validate(value)?;
        }
        Ok(())
    }

    fn decode(&self, key: &StoreKey, entry: StoredEntry) -> Result<(T, Version), StoreError> {
        let value: T = serde_json::from_value(entry.value).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        })?;
        self.validate(&value)?;
        Ok((value, entry.version))
    }

    fn encode(&self, key: &StoreKey, value: &T) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })
    }

    /// Fetch and validate the value at `key`.
    pub async fn get(&self, key: &StoreKey) -> Result<Option<T>, StoreError> {
        match self.backend.get(key.as_str()).await? {
            Some(entry) => self.decode(key, entry).map(|(value, _)| Some(value)),
            None => Ok(None),
        }
    }

    /// Fetch the value together with its write version.
    pub async fn get_versioned(&self, key: &StoreKey) -> Result<Option<(T, Version)>, StoreError> {
        match self.backend.get(key.as_str()).await? {
            Some(entry) => self.decode(key, entry).map(Some),
            None => Ok(None),
        }
    }

    /// Validate then persist `value`, replacing any prior value in one
    /// round trip.
    pub async fn set(&self, key: &StoreKey, value: &T, opts: PutOptions) -> Result<(), StoreError> {
        self.validate(value)?;
        let encoded = self.encode(key, value)?;
        self.backend.put(key.as_str(), encoded, opts).await?;
        Ok(())
    }

    /// Read-modify-write with optimistic concurrency.
    ///
    /// The write carries the version observed at read; when another writer
    /// got in between, the conflicting attempt is retried with a fresh read,
    /// up to [`UPDATE_RETRY_LIMIT`] times. The condition in `opts` is
    /// managed by the loop; only its TTL is honored.
    pub async fn update<F>(
        &self,
        key: &StoreKey,
        opts: PutOptions,
        mut apply: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut(Option<T>) -> T,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let observed = self.get_versioned(key).await?;
            let condition = match &observed {
                Some((_, version)) => PutCondition::IfVersion(*version),
                None => PutCondition::IfAbsent,
            };

            let next = apply(observed.map(|(value, _)| value));
            self.validate(&next)?;
            let encoded = self.encode(key, &next)?;

            let put = PutOptions::condition(condition).with_ttl(opts.ttl);
            match self.backend.put(key.as_str(), encoded, put).await {
                Ok(_) => return Ok(next),
                Err(err @ StoreError::Conflict { .. }) => {
                    counter!(METRIC_STORE_CONFLICT_TOTAL).increment(1);
                    if attempt >= UPDATE_RETRY_LIMIT {
                        return Err(err);
                    }
                    debug!(
                        key = %key,
                        attempt,
                        "concurrent write detected, retrying update"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Remove the value at `key`.
    pub async fn delete(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.backend.delete(key.as_str()).await
    }
}
