//! Storage for bank accounts, verification attempts and daily limits.
//!
//! The store is the single source of truth for quota counters, cooldown
//! timestamps and verification state. Implementations must refuse a second
//! primary active account for a store (see [`InsertOutcome::PrimaryConflict`]).

mod memory;
pub mod models;
mod sqlite;

pub use memory::MemoryStore;
pub use models::{
    AccountId, AttemptType, BankAccount, StoreId, VerificationAttempt, VerificationLimits,
    VerificationStatus,
};
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Outcome of inserting a new account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row written.
    Inserted,
    /// Another primary active account already exists for the store.
    PrimaryConflict,
}

/// Relational store used by the verification orchestrator.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Fetch an account by id, scoped to its store.
    async fn get_account(&self, store_id: &str, id: AccountId) -> Result<Option<BankAccount>>;

    /// Fetch the store's primary active account.
    async fn primary_account(&self, store_id: &str) -> Result<Option<BankAccount>>;

    /// Count the store's active accounts.
    async fn count_active_accounts(&self, store_id: &str) -> Result<usize>;

    /// Insert a new account.
    ///
    /// Returns [`InsertOutcome::PrimaryConflict`] instead of writing when the
    /// row is primary and active and the store already has such a row.
    async fn insert_account(&self, account: &BankAccount) -> Result<InsertOutcome>;

    /// Write a verification outcome onto an existing row and count the
    /// attempt.
    ///
    /// `attempt_count` is incremented in storage; the value carried by
    /// `account` is ignored, as are `is_primary`, `is_active` and
    /// `created_at`. Returns the row as stored, or `None` if it is gone.
    async fn record_verification(&self, account: &BankAccount) -> Result<Option<BankAccount>>;

    /// Write the status columns of a refreshed account, only while the row
    /// still carries `validation_id`.
    ///
    /// Returns `false` when the row is gone or a newer validation replaced
    /// it.
    async fn record_refresh(&self, account: &BankAccount, validation_id: &str) -> Result<bool>;

    /// Append an audit row.
    async fn append_attempt(&self, attempt: &VerificationAttempt) -> Result<()>;

    /// Audit rows for a store with `from <= created_at < to`, oldest first.
    async fn list_attempts(
        &self,
        store_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VerificationAttempt>>;

    /// Load the store's counters, rolling them over to `today` in the same
    /// atomic step. Creates the row if absent.
    async fn load_limits(&self, store_id: &str, today: NaiveDate) -> Result<VerificationLimits>;

    /// Count one attempt on `today`, rolling over first. Returns the new
    /// counters.
    async fn increment_attempts(
        &self,
        store_id: &str,
        attempt_type: AttemptType,
        today: NaiveDate,
    ) -> Result<VerificationLimits>;
}
