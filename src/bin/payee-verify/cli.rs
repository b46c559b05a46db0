//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use payee_verify::config::VerifierConfig;
use payee_verify::VerificationForm;
use std::path::PathBuf;
use uuid::Uuid;

/// Verify merchant payout bank accounts and UPI handles.
#[derive(Parser, Debug)]
#[command(name = "payee-verify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file.
    #[arg(long, global = true, env = "PAYEE_VERIFY_DATABASE")]
    pub database: Option<PathBuf>,

    /// Session token identifying the merchant.
    #[arg(long, global = true, env = "PAYEE_VERIFY_SESSION", default_value = "")]
    pub session: String,

    /// Validate against the in-process mock provider.
    #[arg(long, global = true)]
    pub mock_provider: bool,

    /// Provider API key id.
    #[arg(long, global = true, env = "PAYEE_VERIFY_KEY_ID", hide_env_values = true)]
    pub key_id: Option<String>,

    /// Provider API key secret.
    #[arg(long, global = true, env = "PAYEE_VERIFY_KEY_SECRET", hide_env_values = true)]
    pub key_secret: Option<String>,

    /// Platform settlement account validations are paid from.
    #[arg(long, global = true, env = "PAYEE_VERIFY_SOURCE_ACCOUNT")]
    pub source_account: Option<String>,

    /// Secret the account number encryption key is derived from.
    #[arg(long, global = true, env = "PAYEE_VERIFY_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Log level.
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a bank account.
    VerifyBank(BankArgs),
    /// Verify a UPI handle.
    VerifyUpi(UpiArgs),
    /// Re-confirm an account still in processing.
    Refresh {
        /// Store id.
        #[arg(long)]
        store: String,
        /// Account id.
        #[arg(long)]
        account_id: Uuid,
    },
    /// List a store's verification attempts.
    Attempts {
        /// Store id.
        #[arg(long)]
        store: String,
        /// How many hours back to look.
        #[arg(long, default_value = "24")]
        hours: i64,
    },
    /// Write a configuration file with defaults.
    InitConfig {
        /// Where to write it.
        #[arg(long, short, default_value = "payee-verify.toml")]
        output: PathBuf,
    },
}

/// Bank account arguments.
#[derive(Args, Debug)]
pub struct BankArgs {
    /// Store id.
    #[arg(long)]
    pub store: String,
    /// Existing account to re-verify.
    #[arg(long)]
    pub account_id: Option<String>,
    /// Account holder name.
    #[arg(long)]
    pub holder: String,
    /// Account number.
    #[arg(long)]
    pub account_number: String,
    /// IFSC routing code.
    #[arg(long)]
    pub ifsc: String,
    /// Bank name.
    #[arg(long)]
    pub bank_name: String,
    /// Branch name.
    #[arg(long)]
    pub branch: Option<String>,
}

/// UPI arguments.
#[derive(Args, Debug)]
pub struct UpiArgs {
    /// Store id.
    #[arg(long)]
    pub store: String,
    /// Existing account to re-verify.
    #[arg(long)]
    pub account_id: Option<String>,
    /// UPI handle, name@bank.
    #[arg(long)]
    pub upi_id: String,
    /// Name shown for the handle.
    #[arg(long)]
    pub display_name: Option<String>,
}

impl From<BankArgs> for VerificationForm {
    fn from(args: BankArgs) -> Self {
        Self {
            store_id: args.store,
            account_id: args.account_id,
            account_type: Some("bank".to_string()),
            account_holder_name: Some(args.holder),
            account_number: Some(args.account_number),
            ifsc_code: Some(args.ifsc),
            bank_name: Some(args.bank_name),
            branch_name: args.branch,
            ..Self::default()
        }
    }
}

impl From<UpiArgs> for VerificationForm {
    fn from(args: UpiArgs) -> Self {
        Self {
            store_id: args.store,
            account_id: args.account_id,
            account_type: Some("upi".to_string()),
            upi_id: Some(args.upi_id),
            display_name: args.display_name,
            ..Self::default()
        }
    }
}

impl Cli {
    /// Build the verifier configuration: file, then flags and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn load_config(&self) -> color_eyre::Result<VerifierConfig> {
        let mut config = if let Some(ref path) = self.config {
            VerifierConfig::from_file(path)?
        } else {
            VerifierConfig::default()
        };

        if let Some(ref database) = self.database {
            config.database_path.clone_from(database);
        }
        if let Some(ref key_id) = self.key_id {
            config.provider.key_id.clone_from(key_id);
        }
        if let Some(ref key_secret) = self.key_secret {
            config.provider.key_secret.clone_from(key_secret);
        }
        if let Some(ref source_account) = self.source_account {
            config.provider.source_account.clone_from(source_account);
        }
        if self.encryption_key.is_some() {
            config.encryption.key.clone_from(&self.encryption_key);
        }
        config.log_level.clone_from(&self.log_level);

        if self.mock_provider && config.provider.source_account.is_empty() {
            config.provider.source_account = "mock-source-account".to_string();
        }

        Ok(config)
    }
}
