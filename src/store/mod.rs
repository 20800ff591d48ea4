//! Typed keyed store over a shared key-value backend.
//!
//! - `backend`: the raw key-value contract: string keys, JSON values,
//!   optional TTL, conditional puts. Every operation is one independent
//!   round trip; there are no transactions.
//! - `memory`: in-process backend used as the shared cache service.
//! - `typed`: the schema-validated, version-checked wrapper mutations go
//!   through.

mod backend;
mod memory;
mod typed;

pub use backend::{PutCondition, PutOptions, StoreBackend, StoreError, StoredEntry, Version};
pub use memory::MemoryBackend;
pub use typed::{TypedStore, UPDATE_RETRY_LIMIT};
