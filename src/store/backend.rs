//! Raw key-value backend contract.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::DomainError;

/// Monotonically increasing per-key write version.
pub type Version = u64;

/// A stored value together with the version of the write that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub value: Value,
    pub version: Version,
}

/// Condition attached to a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Unconditional replace (last write wins).
    Any,
    /// Only write when no live value exists at the key.
    IfAbsent,
    /// Only write when the current version matches the one observed at read.
    IfVersion(Version),
}

/// Options for a put: retention and write condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    pub ttl: Option<Duration>,
    pub condition: Option<PutCondition>,
}

impl PutOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn condition(condition: PutCondition) -> Self {
        Self {
            condition: Some(condition),
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub(crate) fn effective_condition(&self) -> PutCondition {
        self.condition.unwrap_or(PutCondition::Any)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A schema rejected the value, on read or on write.
    #[error(transparent)]
    Validation(#[from] DomainError),
    /// A conditional put observed a different version than expected.
    #[error("conflicting write on `{key}`: expected version {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<Version>,
        found: Option<Version>,
    },
    /// The stored bytes could not be decoded into the expected type.
    #[error("stored value at `{key}` is not decodable: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The value could not be encoded for storage.
    #[error("value for `{key}` is not encodable: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// Transient backend failure; the caller's retry is the recovery path.
    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// True for failures worth handing back to the job engine for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

/// A shared key-value service: get/put/delete by string key, JSON values,
/// optional TTL. Implementations treat every call as a single independent
/// round trip.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, StoreError>;

    /// Persist `value` at `key`, returning the version of the new write.
    ///
    /// Fails with [`StoreError::Conflict`] when the put condition does not
    /// hold.
    async fn put(&self, key: &str, value: Value, opts: PutOptions) -> Result<Version, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
