//! In-process validation provider for tests and local dry runs.
//!
//! Without a script the mock is deterministic: account numbers ending in
//! `0000` are rejected at submit, numbers ending in `9999` confirm as
//! invalid, everything else confirms as verified with the holder name
//! upper-cased as the registered name. Queued responses take precedence.

use crate::error::{Error, Result};
use crate::verification::provider::{
    SubmittedValidation, ValidationProvider, ValidationSubmission, ValidationTarget,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Scripted = std::result::Result<Value, String>;

/// Scripted validation provider.
#[derive(Debug)]
pub struct MockValidationProvider {
    configured: bool,
    delay: Duration,
    submit_script: Mutex<VecDeque<Scripted>>,
    confirm_script: Mutex<VecDeque<Scripted>>,
    submitted: Mutex<HashMap<String, ValidationSubmission>>,
    last_submission: Mutex<Option<ValidationSubmission>>,
    submit_calls: AtomicUsize,
    confirm_calls: AtomicUsize,
}

impl Default for MockValidationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockValidationProvider {
    /// A configured mock with no script and no delay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            configured: true,
            delay: Duration::ZERO,
            submit_script: Mutex::new(VecDeque::new()),
            confirm_script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(HashMap::new()),
            last_submission: Mutex::new(None),
            submit_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
        }
    }

    /// Report missing credentials.
    #[must_use]
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a raw submit response. It must carry an `id`.
    pub fn push_submit(&self, raw: Value) {
        self.submit_script.lock().push_back(Ok(raw));
    }

    /// Queue a submit rejection.
    pub fn push_submit_error(&self, reason: impl Into<String>) {
        self.submit_script.lock().push_back(Err(reason.into()));
    }

    /// Queue a raw confirm response.
    pub fn push_confirm(&self, raw: Value) {
        self.confirm_script.lock().push_back(Ok(raw));
    }

    /// Queue a confirm failure.
    pub fn push_confirm_error(&self, reason: impl Into<String>) {
        self.confirm_script.lock().push_back(Err(reason.into()));
    }

    /// Number of submit calls made.
    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Number of confirm calls made.
    #[must_use]
    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    /// The most recent submission received.
    #[must_use]
    pub fn last_submission(&self) -> Option<ValidationSubmission> {
        self.last_submission.lock().clone()
    }

    fn default_submit(submission: &ValidationSubmission, n: usize) -> Scripted {
        if let ValidationTarget::BankAccount { account_number, .. } = &submission.target {
            if account_number.ends_with("0000") {
                return Err("Invalid account number".to_string());
            }
        }
        Ok(json!({
            "id": format!("fav_mock_{n}"),
            "entity": "fund_account.validation",
            "fund_account": {
                "id": format!("fa_mock_{n}"),
                "contact_id": format!("cont_mock_{n}"),
            },
            "status": "created",
            "results": {"account_status": null, "registered_name": null},
        }))
    }

    fn default_confirm(&self, validation_id: &str) -> Scripted {
        let submitted = self.submitted.lock();
        let Some(submission) = submitted.get(validation_id) else {
            return Err(format!("unknown validation {validation_id}"));
        };

        let invalid = matches!(
            &submission.target,
            ValidationTarget::BankAccount { account_number, .. } if account_number.ends_with("9999")
        );
        if invalid {
            return Ok(json!({
                "id": validation_id,
                "status": "completed",
                "results": {"account_status": "invalid", "registered_name": null},
            }));
        }

        Ok(json!({
            "id": validation_id,
            "status": "completed",
            "results": {
                "account_status": "active",
                "registered_name": submission.contact.name.to_uppercase(),
            },
        }))
    }
}

fn id_of(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl ValidationProvider for MockValidationProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn submit(&self, submission: &ValidationSubmission) -> Result<SubmittedValidation> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_submission.lock() = Some(submission.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.submit_script.lock().pop_front();
        let raw = scripted
            .unwrap_or_else(|| Self::default_submit(submission, n))
            .map_err(Error::ProviderRejected)?;

        let validation_id = id_of(&raw, "id").ok_or_else(|| {
            Error::ProviderRejected("response carried no validation id".to_string())
        })?;
        self.submitted
            .lock()
            .insert(validation_id.clone(), submission.clone());

        let fund_account = raw.get("fund_account").cloned().unwrap_or(Value::Null);
        Ok(SubmittedValidation {
            validation_id,
            fund_account_id: id_of(&fund_account, "id"),
            contact_id: id_of(&fund_account, "contact_id"),
            raw,
        })
    }

    async fn confirm(&self, validation_id: &str) -> Result<Value> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.confirm_script.lock().pop_front();
        scripted
            .unwrap_or_else(|| self.default_confirm(validation_id))
            .map_err(Error::Network)
    }
}
