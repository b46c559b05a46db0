//! Validation provider contract.
//!
//! Providers validate asynchronously, so the protocol has two phases:
//! `submit` registers a validation and returns its id, `confirm` fetches the
//! latest result for that id. [`parse_result`] reads either payload.

use crate::error::Result;
use crate::store::VerificationStatus;
use crate::verification::request::mask_account_number;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Contact the provider records the validation against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContact {
    /// Contact name, the claimed holder name.
    pub name: String,
    /// Merchant email.
    pub email: Option<String>,
    /// Merchant phone.
    pub phone: Option<String>,
    /// Our reference for the contact, the store id.
    pub reference_id: String,
}

/// Instrument to validate.
#[derive(Clone, PartialEq, Eq)]
pub enum ValidationTarget {
    /// Bank account and IFSC.
    BankAccount {
        /// Claimed holder name.
        holder_name: String,
        /// Raw account number.
        account_number: String,
        /// IFSC routing code.
        ifsc: String,
    },
    /// UPI virtual payment address.
    Vpa {
        /// The handle.
        address: String,
    },
}

impl std::fmt::Debug for ValidationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BankAccount {
                holder_name,
                account_number,
                ifsc,
            } => f
                .debug_struct("BankAccount")
                .field("holder_name", holder_name)
                .field("account_number", &mask_account_number(account_number))
                .field("ifsc", ifsc)
                .finish(),
            Self::Vpa { address } => f.debug_struct("Vpa").field("address", address).finish(),
        }
    }
}

/// One validation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSubmission {
    /// Platform settlement account the validation is paid from.
    pub source_account: String,
    /// Idempotency reference, see [`validation_reference`].
    pub reference: String,
    /// Contact details.
    pub contact: ValidationContact,
    /// What to validate.
    pub target: ValidationTarget,
    /// Amount in minor units.
    pub amount: u64,
    /// Currency code.
    pub currency: String,
    /// Store the validation is for, echoed in provider notes.
    pub store_id: String,
}

/// A validation the provider accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedValidation {
    /// Provider validation id.
    pub validation_id: String,
    /// Provider fund account id.
    pub fund_account_id: Option<String>,
    /// Provider contact id.
    pub contact_id: Option<String>,
    /// Raw submit response.
    pub raw: Value,
}

/// External account validation service.
#[async_trait]
pub trait ValidationProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// Register a validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the submission or cannot be
    /// reached. Nothing was validated in that case.
    async fn submit(&self, submission: &ValidationSubmission) -> Result<SubmittedValidation>;

    /// Fetch the latest result of a validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or answers with an
    /// error. Callers fall back to the submit response.
    async fn confirm(&self, validation_id: &str) -> Result<Value>;
}

/// Reference distinguishing retried submissions for the same store.
#[must_use]
pub fn validation_reference(store_id: &str, now: DateTime<Utc>) -> String {
    format!("{store_id}-{}", now.timestamp_millis())
}

/// What a provider payload says about the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResult {
    /// Provider confirmed the account.
    pub verified: bool,
    /// Provider reported the account invalid or the validation failed.
    pub failed: bool,
    /// Registered holder name, if reported.
    pub beneficiary_name: Option<String>,
    /// Provider's own status string, `unknown` if absent.
    pub provider_status: String,
}

impl ParsedResult {
    /// Verification status this result maps to.
    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        if self.failed {
            VerificationStatus::Failed
        } else if self.verified {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Processing
        }
    }
}

const VERIFIED_ACCOUNT_STATES: &[&str] = &["active", "verified"];
const FAILED_ACCOUNT_STATES: &[&str] = &["invalid", "inactive", "failed"];

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read a submit or confirm payload.
///
/// Missing or partial fields never fail; without an explicit verified
/// signal the result is not verified.
#[must_use]
pub fn parse_result(raw: &Value) -> ParsedResult {
    let status = str_at(raw, &["status"]).map(str::to_ascii_lowercase);
    let account_status = str_at(raw, &["results", "account_status"]).map(str::to_ascii_lowercase);

    let verified = account_status
        .as_deref()
        .is_some_and(|s| VERIFIED_ACCOUNT_STATES.contains(&s));
    let failed = status.as_deref() == Some("failed")
        || account_status
            .as_deref()
            .is_some_and(|s| FAILED_ACCOUNT_STATES.contains(&s));

    let beneficiary_name = str_at(raw, &["results", "registered_name"])
        .or_else(|| str_at(raw, &["results", "beneficiary_name"]))
        .or_else(|| str_at(raw, &["beneficiary_name"]))
        .map(str::to_string);

    let provider_status = account_status
        .or(status)
        .unwrap_or_else(|| "unknown".to_string());

    ParsedResult {
        verified,
        failed,
        beneficiary_name,
        provider_status,
    }
}
