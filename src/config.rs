//! Configuration for payee-verify.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Anti-abuse policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Validation provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Account number encryption.
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Static session table for the command-line identity resolver.
    #[serde(default)]
    pub merchants: Vec<MerchantEntry>,
}

/// Attempt quotas and cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Bank account verification attempts per store per day.
    #[serde(default = "default_max_attempts")]
    pub max_bank_attempts_per_day: u32,

    /// UPI verification attempts per store per day.
    #[serde(default = "default_max_attempts")]
    pub max_upi_attempts_per_day: u32,

    /// Minimum seconds between attempts on the same account.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Maximum number of active accounts a store may hold.
    #[serde(default = "default_max_accounts")]
    pub max_accounts_per_store: usize,

    /// UTC offset in minutes of the calendar day quotas roll over on.
    #[serde(default = "default_day_offset")]
    pub day_offset_minutes: i32,
}

/// External validation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key id.
    #[serde(default)]
    pub key_id: String,

    /// API key secret.
    #[serde(default)]
    pub key_secret: String,

    /// Platform settlement account the validation is paid from.
    #[serde(default)]
    pub source_account: String,

    /// Amount moved by a validation, in minor units.
    #[serde(default = "default_validation_amount")]
    pub validation_amount: u64,

    /// Currency of the validation amount.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Per-request network timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Wait before each confirm call, in milliseconds.
    #[serde(default = "default_confirm_delay")]
    pub confirm_delay_ms: u64,

    /// Confirm calls made before settling for `processing`.
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,
}

/// Encryption of stored account numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Secret the cipher key is derived from. Unset disables encryption.
    #[serde(default)]
    pub key: Option<String>,
}

/// One session in the static identity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantEntry {
    /// Session token presented by the caller.
    pub token: String,
    /// Merchant account id.
    pub merchant_id: String,
    /// Owner's legal name.
    #[serde(default)]
    pub owner_name: Option<String>,
    /// Contact email sent to the provider.
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone sent to the provider.
    #[serde(default)]
    pub phone: Option<String>,
    /// Stores this merchant may manage.
    #[serde(default)]
    pub stores: Vec<StoreEntry>,
}

/// A store in the static identity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Store id.
    pub id: String,
    /// Registered legal name.
    #[serde(default)]
    pub legal_name: Option<String>,
    /// Name shown to customers.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Parent brand name.
    #[serde(default)]
    pub brand_name: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_log_level(),
            policy: PolicyConfig::default(),
            provider: ProviderConfig::default(),
            encryption: EncryptionConfig::default(),
            merchants: Vec::new(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_bank_attempts_per_day: default_max_attempts(),
            max_upi_attempts_per_day: default_max_attempts(),
            cooldown_secs: default_cooldown_secs(),
            max_accounts_per_store: default_max_accounts(),
            day_offset_minutes: default_day_offset(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key_id: String::new(),
            key_secret: String::new(),
            source_account: String::new(),
            validation_amount: default_validation_amount(),
            currency: default_currency(),
            request_timeout_secs: default_request_timeout(),
            confirm_delay_ms: default_confirm_delay(),
            confirm_attempts: default_confirm_attempts(),
        }
    }
}

impl ProviderConfig {
    /// Network timeout applied to each provider call.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before each confirm call.
    #[must_use]
    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }

    /// Whether API credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.key_id.trim().is_empty() && !self.key_secret.trim().is_empty()
    }
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "payee-verify")
        .map(|dirs| dirs.data_dir().join("payee-verify.db"))
        .unwrap_or_else(|| PathBuf::from("payee-verify.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_cooldown_secs() -> u64 {
    60
}

const fn default_max_accounts() -> usize {
    3
}

const fn default_day_offset() -> i32 {
    330 // IST
}

fn default_base_url() -> String {
    "https://api.razorpay.com".to_string()
}

const fn default_validation_amount() -> u64 {
    100
}

fn default_currency() -> String {
    "INR".to_string()
}

const fn default_request_timeout() -> u64 {
    10
}

const fn default_confirm_delay() -> u64 {
    3000
}

const fn default_confirm_attempts() -> u32 {
    1
}

impl VerifierConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
