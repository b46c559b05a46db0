//! # payee-verify
//!
//! Bank account and UPI payout verification for merchant stores.
//!
//! Before payouts are routed to a store, its payout account is validated
//! with an external provider (a penny-drop style fund account validation).
//! This crate owns that flow: it authorizes the merchant, checks the claimed
//! holder name against the store's identities, paces attempts with a daily
//! quota and a per-account cooldown, submits and confirms the validation,
//! and records the outcome with an audit trail.
//!
//! ## Example
//!
//! ```rust,no_run
//! use payee_verify::{VerificationForm, VerifierBuilder, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> payee_verify::Result<()> {
//!     let config = VerifierConfig::from_file(std::path::Path::new("payee-verify.toml"))?;
//!     let verifier = VerifierBuilder::new(config).build()?;
//!
//!     let form = VerificationForm {
//!         store_id: "store_1".to_string(),
//!         account_holder_name: Some("Ramesh Kumar".to_string()),
//!         account_number: Some("1234567890123".to_string()),
//!         ifsc_code: Some("ABCD0123456".to_string()),
//!         bank_name: Some("Test Bank".to_string()),
//!         ..VerificationForm::default()
//!     };
//!     let outcome = verifier.verify("session-token", &form).await?;
//!     println!("{}: {}", outcome.status, outcome.message);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod store;
pub mod verification;

pub use builder::VerifierBuilder;
pub use config::VerifierConfig;
pub use error::{Error, ErrorKind, Result};
pub use event::{VerificationEvent, VerificationEventsChannel};
pub use identity::{IdentityResolver, MerchantIdentity, StaticIdentityResolver, StoreProfile};
pub use store::{
    AttemptType, BankAccount, MemoryStore, SqliteStore, VerificationAttempt, VerificationLimits,
    VerificationStatus, VerificationStore,
};
pub use verification::{
    BankVerifier, MockValidationProvider, ValidationProvider, VerificationForm,
    VerificationOutcome,
};
