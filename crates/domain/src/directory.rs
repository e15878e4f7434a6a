//! Account directory: the identity seam.
//!
//! Checkout and the catalog routes trust the identity this trait resolves;
//! credential checking itself lives outside the core.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CustomerId, StaffId};

/// A resolved caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// A registered customer, with discount eligibility already resolved
    /// (any one of the customer's eligibility flags grants it).
    Customer {
        id: CustomerId,
        discount_eligible: bool,
    },
    /// A staff member.
    Staff { id: StaffId },
}

impl Identity {
    /// Returns the customer id, if this is a customer identity.
    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            Identity::Customer { id, .. } => Some(*id),
            Identity::Staff { .. } => None,
        }
    }

    /// Returns true for staff identities.
    pub fn is_staff(&self) -> bool {
        matches!(self, Identity::Staff { .. })
    }
}

/// Trait for resolving opaque bearer tokens to identities.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolves a token, or None if it is unknown.
    async fn resolve(&self, token: &str) -> Option<Identity>;
}

/// In-memory account directory for tests and default wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    tokens: Arc<RwLock<HashMap<String, Identity>>>,
}

impl InMemoryDirectory {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for an identity.
    pub fn register(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().unwrap().insert(token.into(), identity);
    }

    /// Removes a token.
    pub fn revoke(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn resolve(&self, token: &str) -> Option<Identity> {
        self.tokens.read().unwrap().get(token).copied()
    }
}
