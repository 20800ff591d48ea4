//! Explicit request scope.
//!
//! Every store, executor, and emitter operation takes the authenticated
//! identity and tenant it acts for as an explicit parameter; nothing reads
//! ambient global state.

use crate::infra::signer::SERVER_IDENTITY;

/// The identity and tenant a call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub identity: String,
    pub tenant: String,
}

impl RequestScope {
    pub fn new(identity: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            tenant: tenant.into(),
        }
    }

    /// Scope for work the system performs on its own behalf.
    pub fn server(tenant: impl Into<String>) -> Self {
        Self::new(SERVER_IDENTITY, tenant)
    }
}
