//! In-memory store.
//!
//! Used by tests and command-line dry runs. A single lock guards all three
//! tables so the primary-slot check and the insert are one step.

use super::{
    AccountId, AttemptType, BankAccount, InsertOutcome, VerificationAttempt, VerificationLimits,
    VerificationStore,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, BankAccount>,
    attempts: Vec<VerificationAttempt>,
    limits: HashMap<String, VerificationLimits>,
}

/// In-memory [`VerificationStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All accounts of a store, in no particular order.
    #[must_use]
    pub fn accounts_for(&self, store_id: &str) -> Vec<BankAccount> {
        self.tables
            .lock()
            .accounts
            .values()
            .filter(|a| a.store_id == store_id)
            .cloned()
            .collect()
    }

    /// Current counters of a store without rolling them over.
    #[must_use]
    pub fn limits_for(&self, store_id: &str) -> Option<VerificationLimits> {
        self.tables.lock().limits.get(store_id).cloned()
    }

    /// Overwrite a store's counters.
    pub fn set_limits(&self, limits: VerificationLimits) {
        self.tables
            .lock()
            .limits
            .insert(limits.store_id.clone(), limits);
    }

    /// Number of audit rows across all stores.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.tables.lock().attempts.len()
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn get_account(&self, store_id: &str, id: AccountId) -> Result<Option<BankAccount>> {
        Ok(self
            .tables
            .lock()
            .accounts
            .get(&id)
            .filter(|a| a.store_id == store_id)
            .cloned())
    }

    async fn primary_account(&self, store_id: &str) -> Result<Option<BankAccount>> {
        Ok(self
            .tables
            .lock()
            .accounts
            .values()
            .find(|a| a.store_id == store_id && a.is_primary && a.is_active)
            .cloned())
    }

    async fn count_active_accounts(&self, store_id: &str) -> Result<usize> {
        Ok(self
            .tables
            .lock()
            .accounts
            .values()
            .filter(|a| a.store_id == store_id && a.is_active)
            .count())
    }

    async fn insert_account(&self, account: &BankAccount) -> Result<InsertOutcome> {
        let mut tables = self.tables.lock();
        if account.is_primary && account.is_active {
            let taken = tables
                .accounts
                .values()
                .any(|a| a.store_id == account.store_id && a.is_primary && a.is_active);
            if taken {
                return Ok(InsertOutcome::PrimaryConflict);
            }
        }
        if tables.accounts.contains_key(&account.id) {
            return Err(Error::Database(format!("duplicate account id {}", account.id)));
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn record_verification(&self, account: &BankAccount) -> Result<Option<BankAccount>> {
        let mut tables = self.tables.lock();
        let Some(existing) = tables
            .accounts
            .get_mut(&account.id)
            .filter(|a| a.store_id == account.store_id)
        else {
            return Ok(None);
        };

        let attempt_count = existing.attempt_count.saturating_add(1);
        let (is_primary, is_active, created_at) =
            (existing.is_primary, existing.is_active, existing.created_at);
        *existing = account.clone();
        existing.attempt_count = attempt_count;
        existing.is_primary = is_primary;
        existing.is_active = is_active;
        existing.created_at = created_at;
        Ok(Some(existing.clone()))
    }

    async fn record_refresh(&self, account: &BankAccount, validation_id: &str) -> Result<bool> {
        let mut tables = self.tables.lock();
        let Some(existing) = tables.accounts.get_mut(&account.id).filter(|a| {
            a.store_id == account.store_id
                && a.provider_validation_id.as_deref() == Some(validation_id)
        }) else {
            return Ok(false);
        };

        existing.verification_status = account.verification_status;
        existing.is_verified = account.is_verified;
        existing.verified_at = account.verified_at;
        existing.beneficiary_name.clone_from(&account.beneficiary_name);
        existing
            .verification_response
            .clone_from(&account.verification_response);
        existing.updated_at = account.updated_at;
        Ok(true)
    }

    async fn append_attempt(&self, attempt: &VerificationAttempt) -> Result<()> {
        self.tables.lock().attempts.push(attempt.clone());
        Ok(())
    }

    async fn list_attempts(
        &self,
        store_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VerificationAttempt>> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .attempts
            .iter()
            .filter(|a| a.store_id == store_id && a.created_at >= from && a.created_at < to)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn load_limits(&self, store_id: &str, today: NaiveDate) -> Result<VerificationLimits> {
        let mut tables = self.tables.lock();
        let limits = tables
            .limits
            .entry(store_id.to_string())
            .or_insert_with(|| VerificationLimits::fresh(store_id, today));
        limits.roll_over(today);
        Ok(limits.clone())
    }

    async fn increment_attempts(
        &self,
        store_id: &str,
        attempt_type: AttemptType,
        today: NaiveDate,
    ) -> Result<VerificationLimits> {
        let mut tables = self.tables.lock();
        let limits = tables
            .limits
            .entry(store_id.to_string())
            .or_insert_with(|| VerificationLimits::fresh(store_id, today));
        limits.record(attempt_type, today);
        Ok(limits.clone())
    }
}
