//! Fund account validation over the Razorpay payouts API.
//!
//! `submit` creates a composite fund account validation (contact, fund
//! account and penny transfer in one call); `confirm` fetches it by id.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::verification::provider::{
    SubmittedValidation, ValidationProvider, ValidationSubmission, ValidationTarget,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const VALIDATIONS_PATH: &str = "/v1/fund_accounts/validations";
const IDEMPOTENCY_HEADER: &str = "X-Payout-Idempotency";

/// Razorpay-backed validation provider.
pub struct RazorpayProvider {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RazorpayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayProvider")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RazorpayProvider {
    /// Create a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("HTTP client error: {e}")))?;

        info!(
            "Validation provider: razorpay at {} (credentials: {})",
            config.base_url,
            if config.has_credentials() { "set" } else { "missing" }
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{VALIDATIONS_PATH}{suffix}", self.base_url)
    }

    async fn read_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = error_description(&body).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(Error::ProviderRejected(reason));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::ProviderRejected(format!("unreadable response: {e}")))
    }
}

/// JSON body for a composite validation request.
pub(crate) fn request_body(submission: &ValidationSubmission) -> Value {
    let contact = json!({
        "name": submission.contact.name,
        "email": submission.contact.email,
        "contact": submission.contact.phone,
        "type": "vendor",
        "reference_id": submission.contact.reference_id,
    });

    let fund_account = match &submission.target {
        ValidationTarget::BankAccount {
            holder_name,
            account_number,
            ifsc,
        } => json!({
            "account_type": "bank_account",
            "bank_account": {
                "name": holder_name,
                "ifsc": ifsc,
                "account_number": account_number,
            },
            "contact": contact,
        }),
        ValidationTarget::Vpa { address } => json!({
            "account_type": "vpa",
            "vpa": { "address": address },
            "contact": contact,
        }),
    };

    json!({
        "account_number": submission.source_account,
        "fund_account": fund_account,
        "amount": submission.amount,
        "currency": submission.currency,
        "reference_id": submission.reference,
        "notes": {
            "store_id": submission.store_id,
            "purpose": "payout_account_verification",
        },
    })
}

/// `error.description` of an API error body.
pub(crate) fn error_description(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("description")?
        .as_str()
        .map(str::to_string)
}

fn id_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ValidationProvider for RazorpayProvider {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn is_configured(&self) -> bool {
        !self.key_id.trim().is_empty() && !self.key_secret.trim().is_empty()
    }

    async fn submit(&self, submission: &ValidationSubmission) -> Result<SubmittedValidation> {
        debug!(
            "Submitting validation {} for store {}: {:?}",
            submission.reference, submission.store_id, submission.target
        );

        let response = self
            .client
            .post(self.url(""))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(IDEMPOTENCY_HEADER, &submission.reference)
            .json(&request_body(submission))
            .send()
            .await?;

        let raw = Self::read_response(response).await?;

        let Some(validation_id) = id_at(&raw, &["id"]) else {
            warn!("Provider accepted validation {} without an id", submission.reference);
            return Err(Error::ProviderRejected(
                "response carried no validation id".to_string(),
            ));
        };

        Ok(SubmittedValidation {
            validation_id,
            fund_account_id: id_at(&raw, &["fund_account", "id"]),
            contact_id: id_at(&raw, &["fund_account", "contact_id"])
                .or_else(|| id_at(&raw, &["fund_account", "contact", "id"])),
            raw,
        })
    }

    async fn confirm(&self, validation_id: &str) -> Result<Value> {
        debug!("Confirming validation {validation_id}");
        let response = self
            .client
            .get(self.url(&format!("/{validation_id}")))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        Self::read_response(response).await
    }
}
