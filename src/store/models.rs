//! Persisted entities of the verification subsystem.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store identifier as issued by the onboarding system.
pub type StoreId = String;

/// Bank account row identifier.
pub type AccountId = Uuid;

/// Kind of payout instrument being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptType {
    /// Bank account number plus IFSC.
    Bank,
    /// UPI virtual payment address.
    Upi,
}

impl AttemptType {
    /// Stable lowercase name, as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Upi => "upi",
        }
    }

    /// Parse the stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank" => Some(Self::Bank),
            "upi" => Some(Self::Upi),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Never submitted.
    #[default]
    Pending,
    /// Submitted; the provider has not reached a verdict yet.
    Processing,
    /// Provider confirmed the account.
    Verified,
    /// Provider reported the account invalid.
    Failed,
}

impl VerificationStatus {
    /// Stable lowercase name, as stored and returned to callers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "verified" => Some(Self::Verified),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if the provider has reached a verdict.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payout account belonging to a store.
///
/// At most one row per store is both primary and active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Row id.
    pub id: AccountId,
    /// Owning store.
    pub store_id: StoreId,
    /// Instrument type of the most recent verification.
    pub account_type: AttemptType,
    /// Claimed account holder name.
    pub holder_name: String,
    /// Raw account number, kept only when encryption is unavailable.
    pub account_number: Option<String>,
    /// Account number with all but the last four digits masked.
    pub account_number_masked: Option<String>,
    /// Hex-encoded ciphertext of the account number.
    pub account_number_encrypted: Option<String>,
    /// IFSC routing code.
    pub ifsc_code: Option<String>,
    /// Bank name.
    pub bank_name: Option<String>,
    /// Branch name.
    pub branch_name: Option<String>,
    /// UPI virtual payment address.
    pub upi_id: Option<String>,
    /// Primary payout account for the store.
    pub is_primary: bool,
    /// Not soft-deleted.
    pub is_active: bool,
    /// Current verification state.
    pub verification_status: VerificationStatus,
    /// Shortcut for `verification_status == Verified`.
    pub is_verified: bool,
    /// Holder name as reported by the provider.
    pub beneficiary_name: Option<String>,
    /// Raw provider payload of the last attempt.
    pub verification_response: Option<serde_json::Value>,
    /// Completed attempts against this row.
    pub attempt_count: u32,
    /// Time of the last completed attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Time the account was last verified.
    pub verified_at: Option<DateTime<Utc>>,
    /// Provider validation id of the last attempt.
    pub provider_validation_id: Option<String>,
    /// Provider contact id.
    pub provider_contact_id: Option<String>,
    /// Provider fund account id.
    pub provider_fund_account_id: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    /// A fresh primary, active, unverified account for a store.
    #[must_use]
    pub fn new_primary(store_id: &str, account_type: AttemptType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id: store_id.to_string(),
            account_type,
            holder_name: String::new(),
            account_number: None,
            account_number_masked: None,
            account_number_encrypted: None,
            ifsc_code: None,
            bank_name: None,
            branch_name: None,
            upi_id: None,
            is_primary: true,
            is_active: true,
            verification_status: VerificationStatus::Pending,
            is_verified: false,
            beneficiary_name: None,
            verification_response: None,
            attempt_count: 0,
            last_attempt_at: None,
            verified_at: None,
            provider_validation_id: None,
            provider_contact_id: None,
            provider_fund_account_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only audit row, one per verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationAttempt {
    /// Row id.
    pub id: Uuid,
    /// Store the attempt was made for.
    pub store_id: StoreId,
    /// Bank or UPI.
    pub attempt_type: AttemptType,
    /// Account row the attempt targeted, if it was saved.
    pub bank_account_id: Option<AccountId>,
    /// Provider validation id.
    pub provider_validation_id: Option<String>,
    /// Provider fund account id.
    pub provider_fund_account_id: Option<String>,
    /// Resulting status.
    pub status: VerificationStatus,
    /// Raw provider payload.
    pub response: Option<serde_json::Value>,
    /// Free-form metadata such as the idempotency reference.
    pub metadata: serde_json::Value,
    /// Time of the attempt.
    pub created_at: DateTime<Utc>,
}

/// Per-store daily attempt counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationLimits {
    /// Store the counters belong to.
    pub store_id: StoreId,
    /// Bank attempts on `last_reset_date`.
    pub bank_attempts_today: u32,
    /// UPI attempts on `last_reset_date`.
    pub upi_attempts_today: u32,
    /// Local calendar day the counters refer to.
    pub last_reset_date: NaiveDate,
}

impl VerificationLimits {
    /// Zeroed counters for `today`.
    #[must_use]
    pub fn fresh(store_id: &str, today: NaiveDate) -> Self {
        Self {
            store_id: store_id.to_string(),
            bank_attempts_today: 0,
            upi_attempts_today: 0,
            last_reset_date: today,
        }
    }

    /// Counter for the given attempt type.
    #[must_use]
    pub fn attempts(&self, attempt_type: AttemptType) -> u32 {
        match attempt_type {
            AttemptType::Bank => self.bank_attempts_today,
            AttemptType::Upi => self.upi_attempts_today,
        }
    }

    /// Reset the counters if they refer to a day other than `today`.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.last_reset_date != today {
            self.bank_attempts_today = 0;
            self.upi_attempts_today = 0;
            self.last_reset_date = today;
        }
    }

    /// Count one attempt on `today`, rolling over first.
    pub fn record(&mut self, attempt_type: AttemptType, today: NaiveDate) {
        self.roll_over(today);
        match attempt_type {
            AttemptType::Bank => self.bank_attempts_today += 1,
            AttemptType::Upi => self.upi_attempts_today += 1,
        }
    }
}
