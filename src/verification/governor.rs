//! Attempt governor: daily quota, per-account cooldown and account ceiling.
//!
//! Checks are read-only. Quota is consumed by [`AttemptGovernor::record_attempt`]
//! once a request has reached the provider, whatever the provider's verdict.

use crate::config::PolicyConfig;
use crate::error::{Error, Result};
use crate::store::{AttemptType, BankAccount, VerificationLimits, VerificationStore};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use tracing::{debug, warn};

/// Result of a governor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorDecision {
    /// The request may proceed to the provider.
    Allowed {
        /// Attempts already counted today for this type.
        attempts_today: u32,
    },
    /// The store used up today's attempts. Retry tomorrow.
    DailyLimitExceeded {
        /// Configured limit.
        limit: u32,
    },
    /// The target account was attempted too recently.
    CooldownActive {
        /// Seconds left in the cooldown window, at least 1.
        retry_after_secs: u64,
    },
    /// A new account row would exceed the store's ceiling.
    AccountLimitReached {
        /// Configured ceiling.
        max: usize,
    },
}

impl GovernorDecision {
    /// Returns true if the request may proceed.
    #[must_use]
    pub fn allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Seconds to wait, when the rejection is time-bound.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::CooldownActive { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Short machine-readable reason.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Allowed { .. } => "allowed",
            Self::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::AccountLimitReached { .. } => "account_limit_reached",
        }
    }

    /// Turn a rejection into the matching quota error.
    ///
    /// # Errors
    ///
    /// Returns the quota error for any decision other than `Allowed`.
    pub fn into_result(self, attempt_type: AttemptType) -> Result<()> {
        match self {
            Self::Allowed { .. } => Ok(()),
            Self::DailyLimitExceeded { limit } => Err(Error::DailyLimitExceeded {
                attempt_type: attempt_type.to_string(),
                limit,
            }),
            Self::CooldownActive { retry_after_secs } => {
                Err(Error::CooldownActive { retry_after_secs })
            }
            Self::AccountLimitReached { max } => Err(Error::AccountLimitReached { max }),
        }
    }
}

/// Applies the anti-abuse policy against persisted counters.
#[derive(Debug, Clone)]
pub struct AttemptGovernor {
    policy: PolicyConfig,
    offset: FixedOffset,
}

impl AttemptGovernor {
    /// Create a governor for the given policy.
    #[must_use]
    pub fn new(policy: PolicyConfig) -> Self {
        let offset = policy
            .day_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!(
                    "Invalid day offset of {} minutes, using UTC",
                    policy.day_offset_minutes
                );
                Utc.fix()
            });
        Self { policy, offset }
    }

    /// The policy in force.
    #[must_use]
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Local calendar day quotas are counted against.
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Daily limit for an attempt type.
    #[must_use]
    pub fn daily_limit(&self, attempt_type: AttemptType) -> u32 {
        match attempt_type {
            AttemptType::Bank => self.policy.max_bank_attempts_per_day,
            AttemptType::Upi => self.policy.max_upi_attempts_per_day,
        }
    }

    /// Check whether a request may reach the provider.
    ///
    /// `target` is the account the request would update; `None` means a new
    /// row would be inserted, which is when the account ceiling applies.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn check_and_reserve(
        &self,
        store: &dyn VerificationStore,
        store_id: &str,
        attempt_type: AttemptType,
        target: Option<&BankAccount>,
        now: DateTime<Utc>,
    ) -> Result<GovernorDecision> {
        let limits = store.load_limits(store_id, self.today(now)).await?;
        let attempts_today = limits.attempts(attempt_type);
        let limit = self.daily_limit(attempt_type);

        if attempts_today >= limit {
            debug!("Store {store_id}: {attempt_type} attempts {attempts_today}/{limit} used");
            return Ok(GovernorDecision::DailyLimitExceeded { limit });
        }

        if let Some(retry_after_secs) = target
            .and_then(|account| account.last_attempt_at)
            .and_then(|last| self.cooldown_remaining(last, now))
        {
            debug!("Store {store_id}: cooldown active for {retry_after_secs}s");
            return Ok(GovernorDecision::CooldownActive { retry_after_secs });
        }

        if target.is_none() {
            let active = store.count_active_accounts(store_id).await?;
            if active >= self.policy.max_accounts_per_store {
                debug!("Store {store_id}: {active} active accounts, no room for another");
                return Ok(GovernorDecision::AccountLimitReached {
                    max: self.policy.max_accounts_per_store,
                });
            }
        }

        Ok(GovernorDecision::Allowed { attempts_today })
    }

    /// Consume one attempt of today's quota.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be written.
    pub async fn record_attempt(
        &self,
        store: &dyn VerificationStore,
        store_id: &str,
        attempt_type: AttemptType,
        now: DateTime<Utc>,
    ) -> Result<VerificationLimits> {
        store
            .increment_attempts(store_id, attempt_type, self.today(now))
            .await
    }

    /// Whole seconds left in the cooldown, rounded up, or `None` if over.
    fn cooldown_remaining(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
        let cooldown_ms = i64::try_from(self.policy.cooldown_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        // Clock skew can put the last attempt in the future; count that as just now.
        let elapsed_ms = (now - last).num_milliseconds().max(0);
        let remaining_ms = cooldown_ms - elapsed_ms;
        if remaining_ms <= 0 {
            return None;
        }
        u64::try_from((remaining_ms + 999) / 1000).ok()
    }
}
