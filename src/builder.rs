//! Wiring configuration into a ready verifier.

use crate::config::VerifierConfig;
use crate::error::Result;
use crate::identity::{IdentityResolver, StaticIdentityResolver};
use crate::store::{MemoryStore, SqliteStore, VerificationStore};
use crate::verification::{
    BankVerifier, MockValidationProvider, RazorpayProvider, ValidationProvider,
};
use std::sync::Arc;
use tracing::info;

/// Builder for a [`BankVerifier`].
///
/// Collaborators not set explicitly are derived from the configuration:
/// SQLite at `database_path`, the `[[merchants]]` session table, and the
/// Razorpay client.
pub struct VerifierBuilder {
    config: VerifierConfig,
    store: Option<Arc<dyn VerificationStore>>,
    identity: Option<Arc<dyn IdentityResolver>>,
    provider: Option<Arc<dyn ValidationProvider>>,
}

impl VerifierBuilder {
    /// Create a builder with the given configuration.
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            store: None,
            identity: None,
            provider: None,
        }
    }

    /// Use this store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn VerificationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Keep everything in memory.
    #[must_use]
    pub fn in_memory(self) -> Self {
        self.store(Arc::new(MemoryStore::new()))
    }

    /// Use this identity resolver.
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use this validation provider.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ValidationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Validate against the in-process mock instead of the real provider.
    #[must_use]
    pub fn mock_provider(self) -> Self {
        self.provider(Arc::new(MockValidationProvider::new()))
    }

    /// Build the verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client
    /// cannot be built.
    pub fn build(self) -> Result<BankVerifier> {
        let store = match self.store {
            Some(store) => store,
            None => {
                if let Some(parent) = self.config.database_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Arc::new(SqliteStore::open(&self.config.database_path)?)
            }
        };

        let identity = match self.identity {
            Some(identity) => identity,
            None => Arc::new(StaticIdentityResolver::from_entries(&self.config.merchants)),
        };

        let provider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(RazorpayProvider::new(&self.config.provider)?),
        };

        info!(
            "Verifier ready (provider={}, bank/day={}, upi/day={}, cooldown={}s)",
            provider.name(),
            self.config.policy.max_bank_attempts_per_day,
            self.config.policy.max_upi_attempts_per_day,
            self.config.policy.cooldown_secs
        );

        Ok(BankVerifier::new(store, identity, provider, &self.config))
    }
}
