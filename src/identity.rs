//! Session to merchant identity resolution.
//!
//! Authentication itself lives outside this crate. The orchestrator consumes
//! an [`IdentityResolver`] and fails closed on anything it cannot resolve.

use crate::config::MerchantEntry;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// A store the merchant may manage, with the names a bank account holder
/// may legitimately carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreProfile {
    /// Store id.
    pub store_id: String,
    /// Registered legal name.
    pub legal_name: Option<String>,
    /// Name shown to customers.
    pub display_name: Option<String>,
    /// Parent brand name.
    pub brand_name: Option<String>,
}

/// An authenticated merchant and their stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantIdentity {
    /// Merchant account id.
    pub merchant_id: String,
    /// Owner's legal name.
    pub owner_name: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Stores the merchant may manage.
    pub stores: Vec<StoreProfile>,
}

impl MerchantIdentity {
    /// The store with the given id, if the merchant may manage it.
    #[must_use]
    pub fn store(&self, store_id: &str) -> Option<&StoreProfile> {
        self.stores.iter().find(|s| s.store_id == store_id)
    }

    /// Names an account holder may match for the given store.
    #[must_use]
    pub fn allowed_names<'a>(&'a self, store: &'a StoreProfile) -> Vec<&'a str> {
        [
            store.legal_name.as_deref(),
            store.display_name.as_deref(),
            self.owner_name.as_deref(),
            store.brand_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Maps a session token to a merchant.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for unknown or expired sessions.
    async fn resolve(&self, session_token: &str) -> Result<MerchantIdentity>;
}

/// Resolver over a fixed token table.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityResolver {
    sessions: HashMap<String, MerchantIdentity>,
}

impl StaticIdentityResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>, identity: MerchantIdentity) -> Self {
        self.sessions.insert(token.into(), identity);
        self
    }

    /// Build from the `[[merchants]]` configuration table.
    #[must_use]
    pub fn from_entries(entries: &[MerchantEntry]) -> Self {
        let sessions = entries
            .iter()
            .map(|entry| {
                let identity = MerchantIdentity {
                    merchant_id: entry.merchant_id.clone(),
                    owner_name: entry.owner_name.clone(),
                    email: entry.email.clone(),
                    phone: entry.phone.clone(),
                    stores: entry
                        .stores
                        .iter()
                        .map(|s| StoreProfile {
                            store_id: s.id.clone(),
                            legal_name: s.legal_name.clone(),
                            display_name: s.display_name.clone(),
                            brand_name: s.brand_name.clone(),
                        })
                        .collect(),
                };
                (entry.token.clone(), identity)
            })
            .collect();
        Self { sessions }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, session_token: &str) -> Result<MerchantIdentity> {
        if session_token.is_empty() {
            return Err(Error::Unauthorized);
        }
        self.sessions
            .get(session_token)
            .cloned()
            .ok_or(Error::Unauthorized)
    }
}
