//! Client side of the Cachewire pipeline.
//!
//! One long-lived subscription per session receives invalidation broadcasts
//! from the relay and marks the affected entries of a local query cache
//! stale, so the data-fetching layer refetches on next read. Cache entries
//! are scoped per (logical key, tenant, auth token) triple; invalidation
//! can never bleed across tenants or identities.

mod cache;
mod error;
mod subscriber;

pub use cache::{QueryCache, QueryScope, ScopedQueryKey};
pub use error::SubscribeError;
pub use subscriber::{apply_envelope, subscribe, ConnectionState, Subscription};
