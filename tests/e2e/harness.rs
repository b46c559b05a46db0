//! Test harness wiring a verifier to in-process collaborators.
//!
//! The `TestHarness` owns the store, the scripted provider and a session
//! table with two merchants, so tests can drive full verifications and then
//! inspect what was persisted.

use chrono::{DateTime, TimeZone, Utc};
use payee_verify::config::VerifierConfig;
use payee_verify::store::{BankAccount, MemoryStore, SqliteStore, VerificationLimits, VerificationStore};
use payee_verify::verification::{BankVerifier, MockValidationProvider, VerificationForm};
use payee_verify::{MerchantIdentity, StaticIdentityResolver, StoreProfile, VerificationOutcome};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Session of the merchant owning `STORE` and `SECOND_STORE`.
pub const OWNER_TOKEN: &str = "tok_owner";

/// Session of a merchant owning neither.
pub const OTHER_TOKEN: &str = "tok_other";

/// Store used by most tests. Owner "Ramesh Kumar", display name "RK Stores".
pub const STORE: &str = "store_1";

/// Second store of the same merchant.
pub const SECOND_STORE: &str = "store_2";

/// Error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Verifier or store error
    #[error("Verifier error: {0}")]
    Verifier(#[from] payee_verify::Error),

    /// Temporary directory error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Test harness for verification flows.
pub struct TestHarness {
    verifier: BankVerifier,
    store: Arc<dyn VerificationStore>,
    provider: Arc<MockValidationProvider>,
    config: VerifierConfig,
    _dir: Option<TempDir>,
}

impl TestHarness {
    /// In-memory store, mock provider and the default test policy.
    #[must_use]
    pub fn setup() -> Self {
        Self::setup_with_config(test_config())
    }

    /// In-memory store with a custom configuration.
    #[must_use]
    pub fn setup_with_config(config: VerifierConfig) -> Self {
        Self::assemble(
            Arc::new(MemoryStore::new()),
            Arc::new(MockValidationProvider::new()),
            config,
            None,
        )
    }

    /// In-memory store with a custom provider.
    #[must_use]
    pub fn setup_with_provider(provider: MockValidationProvider) -> Self {
        Self::assemble(
            Arc::new(MemoryStore::new()),
            Arc::new(provider),
            test_config(),
            None,
        )
    }

    /// SQLite store in a temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn setup_sqlite(provider: MockValidationProvider) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(&dir.path().join("verify.db"))?;
        info!("SQLite harness at {}", dir.path().display());
        Ok(Self::assemble(
            Arc::new(store),
            Arc::new(provider),
            test_config(),
            Some(dir),
        ))
    }

    fn assemble(
        store: Arc<dyn VerificationStore>,
        provider: Arc<MockValidationProvider>,
        config: VerifierConfig,
        dir: Option<TempDir>,
    ) -> Self {
        let verifier = BankVerifier::new(
            Arc::clone(&store),
            Arc::new(sessions()),
            provider.clone(),
            &config,
        );
        Self {
            verifier,
            store,
            provider,
            config,
            _dir: dir,
        }
    }

    /// The verifier under test.
    #[must_use]
    pub fn verifier(&self) -> &BankVerifier {
        &self.verifier
    }

    /// The scripted provider.
    #[must_use]
    pub fn provider(&self) -> &MockValidationProvider {
        &self.provider
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &dyn VerificationStore {
        self.store.as_ref()
    }

    /// Configuration the verifier was built with.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify as the store owner at `now`.
    ///
    /// # Errors
    ///
    /// Returns whatever the verifier returns.
    pub async fn verify_at(
        &self,
        form: &VerificationForm,
        now: DateTime<Utc>,
    ) -> payee_verify::Result<VerificationOutcome> {
        self.verifier.verify_at(OWNER_TOKEN, form, now).await
    }

    /// The store's primary active account.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn primary(&self, store_id: &str) -> Result<Option<BankAccount>> {
        Ok(self.store.primary_account(store_id).await?)
    }

    /// Number of active accounts of a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn active_accounts(&self, store_id: &str) -> Result<usize> {
        Ok(self.store.count_active_accounts(store_id).await?)
    }

    /// Counters for the local day containing `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn limits_at(&self, store_id: &str, now: DateTime<Utc>) -> Result<VerificationLimits> {
        let today = self.verifier.governor().today(now);
        Ok(self.store.load_limits(store_id, today).await?)
    }

    /// Audit rows of a store within a day of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn audit_rows(
        &self,
        store_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<payee_verify::VerificationAttempt>> {
        let day = chrono::Duration::days(1);
        Ok(self.store.list_attempts(store_id, now - day, now + day).await?)
    }
}

/// Test policy: three attempts per type per day, 60 s cooldown, no confirm
/// delay.
#[must_use]
pub fn test_config() -> VerifierConfig {
    let mut config = VerifierConfig::default();
    config.provider.key_id = "rzp_test".to_string();
    config.provider.key_secret = "secret".to_string();
    config.provider.source_account = "2323230000000000".to_string();
    config.provider.confirm_delay_ms = 0;
    config.provider.request_timeout_secs = 2;
    config.policy.max_bank_attempts_per_day = 3;
    config.policy.max_upi_attempts_per_day = 3;
    config.policy.cooldown_secs = 60;
    config.policy.max_accounts_per_store = 3;
    config
}

fn sessions() -> StaticIdentityResolver {
    StaticIdentityResolver::new()
        .with_session(
            OWNER_TOKEN,
            MerchantIdentity {
                merchant_id: "m_owner".to_string(),
                owner_name: Some("Ramesh Kumar".to_string()),
                email: Some("ramesh@example.com".to_string()),
                phone: Some("9000000001".to_string()),
                stores: vec![
                    StoreProfile {
                        store_id: STORE.to_string(),
                        display_name: Some("RK Stores".to_string()),
                        ..StoreProfile::default()
                    },
                    StoreProfile {
                        store_id: SECOND_STORE.to_string(),
                        legal_name: Some("Kumar Traders Pvt Ltd".to_string()),
                        ..StoreProfile::default()
                    },
                ],
            },
        )
        .with_session(
            OTHER_TOKEN,
            MerchantIdentity {
                merchant_id: "m_other".to_string(),
                owner_name: Some("Suresh Patel".to_string()),
                stores: vec![StoreProfile {
                    store_id: "store_9".to_string(),
                    ..StoreProfile::default()
                }],
                ..MerchantIdentity::default()
            },
        )
}

/// 11:30 IST on 2024-05-01.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// The bank form of the end-to-end scenario.
#[must_use]
pub fn bank_form() -> VerificationForm {
    VerificationForm {
        store_id: STORE.to_string(),
        account_holder_name: Some("Ramesh Kumar".to_string()),
        account_number: Some("1234567890123".to_string()),
        ifsc_code: Some("ABCD0123456".to_string()),
        bank_name: Some("Test Bank".to_string()),
        ..VerificationForm::default()
    }
}

/// A UPI form for `STORE`.
#[must_use]
pub fn upi_form(upi_id: &str) -> VerificationForm {
    VerificationForm {
        store_id: STORE.to_string(),
        account_type: Some("upi".to_string()),
        upi_id: Some(upi_id.to_string()),
        display_name: Some("RK Stores".to_string()),
        ..VerificationForm::default()
    }
}
