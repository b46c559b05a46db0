//! Error types for payee-verify.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-checkable classification of an [`Error`].
///
/// Callers key their behavior off the kind, never off the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller not authenticated, or the store is not theirs.
    Authorization,
    /// Missing or malformed fields, or a holder-name mismatch.
    Validation,
    /// Daily limit, cooldown or account ceiling.
    Quota,
    /// Platform-side configuration is missing.
    Configuration,
    /// The validation provider rejected the submission.
    Provider,
    /// The outcome could not be saved after the provider was contacted.
    Persistence,
    /// Anything else (database reads, network, I/O).
    Internal,
}

/// Errors produced by the verification subsystem.
#[derive(Debug, Error)]
pub enum Error {
    /// Session is unknown, or the store does not belong to the caller.
    #[error("store not found or access denied")]
    Unauthorized,

    /// Required fields absent for the chosen account type.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// A field is present but malformed.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name as submitted.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Claimed holder name matches none of the store's identities.
    #[error("account holder name does not match the store or owner name")]
    NameMismatch,

    /// The store used up its verification attempts for the day.
    #[error("daily {attempt_type} verification limit of {limit} reached")]
    DailyLimitExceeded {
        /// Attempt type the limit applies to.
        attempt_type: String,
        /// Configured daily limit.
        limit: u32,
    },

    /// The targeted account was attempted too recently.
    #[error("verification cooldown active, retry after {retry_after_secs}s")]
    CooldownActive {
        /// Seconds until another attempt is allowed.
        retry_after_secs: u64,
    },

    /// The store already holds the maximum number of accounts.
    #[error("store already has the maximum of {max} bank accounts")]
    AccountLimitReached {
        /// Configured ceiling.
        max: usize,
    },

    /// Operator-side configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// The provider refused or could not process the submission.
    #[error("validation provider rejected the request: {0}")]
    ProviderRejected(String),

    /// Saving the outcome failed after the provider was contacted.
    #[error("failed to persist verification outcome (validation {}): {message}", .validation_id.as_deref().unwrap_or("unknown"))]
    Persistence {
        /// Provider validation id, for manual reconciliation.
        validation_id: Option<String>,
        /// Underlying failure.
        message: String,
    },

    /// Storage backend error.
    #[error("database error: {0}")]
    Database(String),

    /// Network error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Authorization,
            Self::MissingFields(_) | Self::InvalidField { .. } | Self::NameMismatch => {
                ErrorKind::Validation
            }
            Self::DailyLimitExceeded { .. }
            | Self::CooldownActive { .. }
            | Self::AccountLimitReached { .. } => ErrorKind::Quota,
            Self::Config(_) => ErrorKind::Configuration,
            Self::ProviderRejected(_) => ErrorKind::Provider,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::Database(_) | Self::Network(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message safe to show to the merchant.
    ///
    /// Never carries provider identifiers or operator detail.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => "Store not found.".to_string(),
            Self::MissingFields(fields) => {
                format!("Please fill in the required fields: {}.", fields.join(", "))
            }
            Self::InvalidField { field, reason } => format!("Invalid {field}: {reason}."),
            Self::NameMismatch => "The account holder name must match the store, owner or \
                                   brand name registered with us."
                .to_string(),
            Self::DailyLimitExceeded { .. } => {
                "You have reached today's verification limit. Please try again tomorrow."
                    .to_string()
            }
            Self::CooldownActive { retry_after_secs } => format!(
                "Please wait {retry_after_secs} seconds before trying again."
            ),
            Self::AccountLimitReached { max } => {
                format!("A store can have at most {max} bank accounts.")
            }
            Self::ProviderRejected(_) => "We could not validate this account. Please check \
                                          the account details and try again."
                .to_string(),
            Self::Persistence { .. } => "Verification may have succeeded but could not be \
                                         saved. Please contact support."
                .to_string(),
            Self::Config(_) | Self::Database(_) | Self::Network(_) | Self::Io(_) => {
                "Verification is temporarily unavailable. Please try again later.".to_string()
            }
        }
    }

    /// Seconds to wait before retrying, when known.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::CooldownActive { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
