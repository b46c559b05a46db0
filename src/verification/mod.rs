//! Payout account verification.
//!
//! A merchant claims a bank account or UPI handle for a store; the account is
//! validated with an external provider before payouts may be routed to it.
//!
//! # Architecture
//!
//! ```text
//! verify request
//!        │
//!        ▼
//! ┌─────────────────────┐   reject: Unauthorized / MissingFields /
//! │ Authorize + parse   │──────────  InvalidField / NameMismatch
//! │ Name-match policy   │
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   reject: DailyLimitExceeded /
//! │ Attempt governor    │──────────  CooldownActive / AccountLimitReached
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   reject: Config
//! │ Configuration check │──────────
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   reject: ProviderRejected
//! │ Provider submit     │──────────  (nothing written, no quota used)
//! └─────────┬───────────┘
//!           ▼
//!    wait, then confirm ── failure ──► keep submit response
//!           │
//!           ▼
//!   processing / verified / failed
//!           │
//!           ▼
//! Save account ─► audit row ─► count attempt
//! ```

pub mod encryption;
pub mod governor;
pub mod mock;
pub mod name_match;
pub mod orchestrator;
pub mod provider;
pub mod razorpay;
pub mod request;

pub use encryption::AccountEncryptor;
pub use governor::{AttemptGovernor, GovernorDecision};
pub use mock::MockValidationProvider;
pub use name_match::{name_matches, normalize_name};
pub use orchestrator::{outcome_message, BankVerifier, VerificationOutcome};
pub use provider::{
    parse_result, validation_reference, ParsedResult, SubmittedValidation, ValidationContact,
    ValidationProvider, ValidationSubmission, ValidationTarget,
};
pub use razorpay::RazorpayProvider;
pub use request::{
    mask_account_number, AccountDetails, BankDetails, UpiDetails, VerificationForm,
    VerificationRequest,
};
