//! The verification orchestrator.
//!
//! One request runs its steps strictly in order: authorize, parse, name
//! match, governor checks, configuration check, submit, confirm, save,
//! audit, count. Everything before submit is local and side-effect free
//! apart from creating an empty limits row.

use crate::config::{ProviderConfig, VerifierConfig};
use crate::error::{Error, Result};
use crate::event::{
    create_event_channel, VerificationEvent, VerificationEventsChannel, VerificationEventsSender,
};
use crate::identity::{IdentityResolver, MerchantIdentity, StoreProfile};
use crate::store::{
    AccountId, BankAccount, InsertOutcome, VerificationAttempt, VerificationStatus,
    VerificationStore,
};
use crate::verification::encryption::AccountEncryptor;
use crate::verification::governor::AttemptGovernor;
use crate::verification::name_match::name_matches;
use crate::verification::provider::{
    parse_result, validation_reference, ParsedResult, SubmittedValidation, ValidationContact,
    ValidationProvider, ValidationSubmission, ValidationTarget,
};
use crate::verification::request::{
    mask_account_number, AccountDetails, VerificationForm, VerificationRequest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What the caller gets back from a verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// Resulting status. Callers key behavior off this, never the message.
    pub status: VerificationStatus,
    /// Holder name reported by the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary_name: Option<String>,
    /// Stable human-readable message for the status.
    pub message: String,
    /// Account row the outcome was saved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

impl VerificationOutcome {
    fn new(
        status: VerificationStatus,
        beneficiary_name: Option<String>,
        account_id: AccountId,
    ) -> Self {
        Self {
            status,
            beneficiary_name,
            message: outcome_message(status).to_string(),
            account_id: Some(account_id),
        }
    }

    fn from_account(account: &BankAccount) -> Self {
        Self::new(
            account.verification_status,
            account.beneficiary_name.clone(),
            account.id,
        )
    }
}

/// Fixed message for each status.
#[must_use]
pub fn outcome_message(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Verified => "Account verified successfully.",
        VerificationStatus::Failed => {
            "Account verification failed. Please check the account details and try again."
        }
        VerificationStatus::Processing => {
            "Verification is in progress. Please check back in a few minutes."
        }
        VerificationStatus::Pending => "Verification has not been started for this account.",
    }
}

/// Result of the provider phase, applied to an account row.
struct ProviderOutcome<'a> {
    submitted: &'a SubmittedValidation,
    raw: &'a Value,
    parsed: &'a ParsedResult,
    encrypted: Option<String>,
    now: DateTime<Utc>,
}

/// Verifies merchant payout accounts.
pub struct BankVerifier {
    store: Arc<dyn VerificationStore>,
    identity: Arc<dyn IdentityResolver>,
    provider: Arc<dyn ValidationProvider>,
    encryptor: AccountEncryptor,
    governor: AttemptGovernor,
    settings: ProviderConfig,
    events_tx: VerificationEventsSender,
}

impl BankVerifier {
    /// Wire a verifier from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn VerificationStore>,
        identity: Arc<dyn IdentityResolver>,
        provider: Arc<dyn ValidationProvider>,
        config: &VerifierConfig,
    ) -> Self {
        let (events_tx, _) = create_event_channel();
        Self {
            store,
            identity,
            provider,
            encryptor: AccountEncryptor::new(config.encryption.key.as_deref()),
            governor: AttemptGovernor::new(config.policy.clone()),
            settings: config.provider.clone(),
            events_tx,
        }
    }

    /// Subscribe to verification events.
    #[must_use]
    pub fn subscribe_events(&self) -> VerificationEventsChannel {
        self.events_tx.subscribe()
    }

    /// The governor applying the anti-abuse policy.
    #[must_use]
    pub fn governor(&self) -> &AttemptGovernor {
        &self.governor
    }

    /// Verify a bank account or UPI handle for a store.
    ///
    /// # Errors
    ///
    /// Returns an error classified by [`Error::kind`]; see [`Self::verify_at`].
    pub async fn verify(
        &self,
        session_token: &str,
        form: &VerificationForm,
    ) -> Result<VerificationOutcome> {
        self.verify_at(session_token, form, Utc::now()).await
    }

    /// [`Self::verify`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// - Authorization, validation, quota and configuration errors before
    ///   the provider is contacted. Nothing is written.
    /// - [`Error::ProviderRejected`] if submit fails. Nothing is written.
    /// - [`Error::Persistence`] if the outcome cannot be saved after submit.
    pub async fn verify_at(
        &self,
        session_token: &str,
        form: &VerificationForm,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome> {
        // Step 1: Identity and store ownership
        let (identity, profile) = self.authorize(session_token, &form.store_id).await?;
        let store_id = profile.store_id.as_str();

        // Step 2: Required fields for the account type
        let request = VerificationRequest::from_form(form)?;
        let attempt_type = request.details.attempt_type();

        // Step 3: Holder name against the store's identities
        let allowed = identity.allowed_names(&profile);
        if let Some(claimed) = request.details.claimed_name() {
            if !name_matches(claimed, allowed.iter().copied()) {
                info!("Store {store_id}: holder name does not match any store identity");
                return Err(Error::NameMismatch);
            }
        }

        // Step 4: Quota, cooldown and account ceiling
        let target = self.load_target(store_id, request.account_id).await?;
        self.governor
            .check_and_reserve(
                self.store.as_ref(),
                store_id,
                attempt_type,
                target.as_ref(),
                now,
            )
            .await?
            .into_result(attempt_type)?;

        // Step 5: Platform configuration
        self.ensure_configured(true)?;

        // Step 6: Submit
        let submission = self.build_submission(&request, &identity, &profile, now);
        let submitted = self.submit(&submission).await?;
        info!(
            "Store {store_id}: {attempt_type} validation {} submitted via {}",
            submitted.validation_id,
            self.provider.name()
        );

        // Step 7: Confirm, falling back to the submit response
        let (raw, confirmed) = self.confirm_with_fallback(&submitted).await;
        let parsed = parse_result(&raw);

        // Step 8: Status
        let status = parsed.status();
        let beneficiary_match = parsed.beneficiary_name.as_deref().map(|beneficiary| {
            match request.details.claimed_name() {
                Some(claimed) => name_matches(beneficiary, [claimed]),
                None => name_matches(beneficiary, allowed.iter().copied()),
            }
        });
        if status == VerificationStatus::Verified && beneficiary_match == Some(false) {
            warn!(
                "Store {store_id}: provider beneficiary name differs from the claimed holder \
                 (validation {})",
                submitted.validation_id
            );
        }

        // Step 9: Upsert the account row
        let encrypted = match &request.details {
            AccountDetails::Bank(bank) => self.encryptor.encrypt(&bank.account_number),
            AccountDetails::Upi(_) => None,
        };
        let outcome = ProviderOutcome {
            submitted: &submitted,
            raw: &raw,
            parsed: &parsed,
            encrypted,
            now,
        };
        let saved = self
            .save_account(store_id, target, &request.details, &outcome)
            .await;

        // Step 10: Audit row, best effort
        let attempt = VerificationAttempt {
            id: Uuid::new_v4(),
            store_id: store_id.to_string(),
            attempt_type,
            bank_account_id: saved.as_ref().ok().map(|account| account.id),
            provider_validation_id: Some(submitted.validation_id.clone()),
            provider_fund_account_id: submitted.fund_account_id.clone(),
            status,
            response: Some(raw.clone()),
            metadata: json!({
                "reference": submission.reference,
                "provider": self.provider.name(),
                "provider_status": parsed.provider_status,
                "confirmed": confirmed,
                "beneficiary_match": beneficiary_match,
            }),
            created_at: now,
        };
        self.write_audit(&attempt).await;

        // Step 11: Quota is consumed once the provider was contacted
        match self
            .governor
            .record_attempt(self.store.as_ref(), store_id, attempt_type, now)
            .await
        {
            Ok(limits) => debug!(
                "Store {store_id}: {} {attempt_type} attempts today",
                limits.attempts(attempt_type)
            ),
            Err(e) => {
                error!(
                    "Store {store_id}: {attempt_type} attempt for validation {} (fund account {}) \
                     not counted: {e}",
                    submitted.validation_id,
                    submitted.fund_account_id.as_deref().unwrap_or("unknown")
                );
                let _ = self.events_tx.send(VerificationEvent::AttemptNotCounted {
                    store_id: store_id.to_string(),
                    attempt_type,
                    validation_id: submitted.validation_id.clone(),
                });
            }
        }

        let account = saved.map_err(|e| self.persistence_failed(store_id, &submitted, &e))?;

        // Step 12: Respond
        let _ = self.events_tx.send(VerificationEvent::AttemptCompleted {
            store_id: store_id.to_string(),
            attempt_type,
            status,
        });
        info!(
            "Store {store_id}: {attempt_type} verification {status} (validation {})",
            submitted.validation_id
        );

        Ok(VerificationOutcome::new(
            status,
            parsed.beneficiary_name,
            account.id,
        ))
    }

    /// Re-confirm an account left in `processing`.
    ///
    /// Makes no submission and consumes no quota. Accounts in any other
    /// state are returned as stored, as are accounts whose validation was
    /// replaced by a newer verification while the confirm was in flight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the account is not the caller's,
    /// [`Error::Config`] without provider credentials, or
    /// [`Error::Persistence`] if the new state cannot be saved.
    pub async fn refresh(
        &self,
        session_token: &str,
        store_id: &str,
        account_id: AccountId,
    ) -> Result<VerificationOutcome> {
        self.refresh_at(session_token, store_id, account_id, Utc::now())
            .await
    }

    /// [`Self::refresh`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::refresh`].
    pub async fn refresh_at(
        &self,
        session_token: &str,
        store_id: &str,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome> {
        let (_, profile) = self.authorize(session_token, store_id).await?;
        let store_id = profile.store_id.as_str();

        let mut account = self
            .load_target(store_id, Some(account_id))
            .await?
            .ok_or(Error::Unauthorized)?;

        let validation_id = match (
            account.verification_status,
            account.provider_validation_id.clone(),
        ) {
            (VerificationStatus::Processing, Some(id)) => id,
            _ => {
                debug!("Account {account_id} is {}, nothing to refresh", account.verification_status);
                return Ok(VerificationOutcome::from_account(&account));
            }
        };

        self.ensure_configured(false)?;

        let raw = match timeout(
            self.settings.request_timeout(),
            self.provider.confirm(&validation_id),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Refresh of validation {validation_id} failed: {e}");
                return Ok(VerificationOutcome::from_account(&account));
            }
            Err(_) => {
                warn!("Refresh of validation {validation_id} timed out");
                return Ok(VerificationOutcome::from_account(&account));
            }
        };

        let parsed = parse_result(&raw);
        let status = parsed.status();
        if status == VerificationStatus::Processing {
            return Ok(VerificationOutcome::from_account(&account));
        }

        account.verification_status = status;
        account.is_verified = status == VerificationStatus::Verified;
        account.verified_at = account.is_verified.then_some(now);
        account.beneficiary_name = parsed.beneficiary_name.clone();
        account.verification_response = Some(raw.clone());
        account.updated_at = now;

        let saved = self.store.record_refresh(&account, &validation_id).await;
        if matches!(saved, Ok(false)) {
            // A newer verification replaced this validation while we waited.
            info!("Store {store_id}: validation {validation_id} superseded, refresh discarded");
            let current = self
                .load_target(store_id, Some(account_id))
                .await?
                .ok_or(Error::Unauthorized)?;
            return Ok(VerificationOutcome::from_account(&current));
        }

        let attempt = VerificationAttempt {
            id: Uuid::new_v4(),
            store_id: store_id.to_string(),
            attempt_type: account.account_type,
            bank_account_id: Some(account.id),
            provider_validation_id: Some(validation_id.clone()),
            provider_fund_account_id: account.provider_fund_account_id.clone(),
            status,
            response: Some(raw),
            metadata: json!({
                "refresh": true,
                "provider": self.provider.name(),
                "provider_status": parsed.provider_status,
            }),
            created_at: now,
        };
        self.write_audit(&attempt).await;

        if let Err(e) = saved {
            error!(
                "Store {store_id}: failed to save refreshed validation {validation_id}: {e}"
            );
            let _ = self.events_tx.send(VerificationEvent::PersistenceFailed {
                store_id: store_id.to_string(),
                validation_id: Some(validation_id.clone()),
            });
            return Err(Error::Persistence {
                validation_id: Some(validation_id),
                message: e.to_string(),
            });
        }

        let _ = self.events_tx.send(VerificationEvent::RefreshCompleted {
            store_id: store_id.to_string(),
            status,
        });
        info!("Store {store_id}: validation {validation_id} refreshed to {status}");

        Ok(VerificationOutcome::from_account(&account))
    }

    /// Audit rows for a store in `[from, to)`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the store is not the caller's,
    /// [`Error::InvalidField`] for an empty range, or a storage error.
    pub async fn attempts(
        &self,
        session_token: &str,
        store_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VerificationAttempt>> {
        let (_, profile) = self.authorize(session_token, store_id).await?;
        if from >= to {
            return Err(Error::InvalidField {
                field: "to".to_string(),
                reason: "must be after from".to_string(),
            });
        }
        self.store.list_attempts(&profile.store_id, from, to).await
    }

    async fn authorize(
        &self,
        session_token: &str,
        store_id: &str,
    ) -> Result<(MerchantIdentity, StoreProfile)> {
        let identity = self.identity.resolve(session_token).await?;
        let Some(profile) = identity.store(store_id.trim()).cloned() else {
            warn!(
                "Merchant {} denied access to store {}",
                identity.merchant_id,
                store_id.trim()
            );
            return Err(Error::Unauthorized);
        };
        Ok((identity, profile))
    }

    /// The account a request updates: the named one, else the primary.
    async fn load_target(
        &self,
        store_id: &str,
        account_id: Option<AccountId>,
    ) -> Result<Option<BankAccount>> {
        match account_id {
            Some(id) => match self.store.get_account(store_id, id).await? {
                Some(account) if account.is_active => Ok(Some(account)),
                _ => {
                    warn!("Store {store_id}: account {id} not found");
                    Err(Error::Unauthorized)
                }
            },
            None => self.store.primary_account(store_id).await,
        }
    }

    fn ensure_configured(&self, needs_source_account: bool) -> Result<()> {
        let missing = if needs_source_account && self.settings.source_account.trim().is_empty() {
            Some("settlement source account")
        } else if !self.provider.is_configured() {
            Some("validation provider credentials")
        } else {
            None
        };

        if let Some(detail) = missing {
            error!("Verification unavailable: {detail} not configured");
            let _ = self.events_tx.send(VerificationEvent::ConfigurationMissing {
                detail: detail.to_string(),
            });
            return Err(Error::Config(format!("{detail} not configured")));
        }
        Ok(())
    }

    fn build_submission(
        &self,
        request: &VerificationRequest,
        identity: &MerchantIdentity,
        profile: &StoreProfile,
        now: DateTime<Utc>,
    ) -> ValidationSubmission {
        let (contact_name, target) = match &request.details {
            AccountDetails::Bank(bank) => (
                bank.holder_name.clone(),
                ValidationTarget::BankAccount {
                    holder_name: bank.holder_name.clone(),
                    account_number: bank.account_number.clone(),
                    ifsc: bank.ifsc_code.clone(),
                },
            ),
            AccountDetails::Upi(upi) => (
                upi.display_name
                    .clone()
                    .or_else(|| identity.owner_name.clone())
                    .or_else(|| profile.display_name.clone())
                    .unwrap_or_else(|| profile.store_id.clone()),
                ValidationTarget::Vpa {
                    address: upi.upi_id.clone(),
                },
            ),
        };

        ValidationSubmission {
            source_account: self.settings.source_account.clone(),
            reference: validation_reference(&profile.store_id, now),
            contact: ValidationContact {
                name: contact_name,
                email: identity.email.clone(),
                phone: identity.phone.clone(),
                reference_id: profile.store_id.clone(),
            },
            target,
            amount: self.settings.validation_amount,
            currency: self.settings.currency.clone(),
            store_id: profile.store_id.clone(),
        }
    }

    async fn submit(&self, submission: &ValidationSubmission) -> Result<SubmittedValidation> {
        match timeout(
            self.settings.request_timeout(),
            self.provider.submit(submission),
        )
        .await
        {
            Ok(Ok(submitted)) => Ok(submitted),
            Ok(Err(e)) => {
                warn!(
                    "Store {}: validation {} rejected: {e}",
                    submission.store_id, submission.reference
                );
                Err(match e {
                    Error::ProviderRejected(reason) => Error::ProviderRejected(reason),
                    other => Error::ProviderRejected(other.to_string()),
                })
            }
            Err(_) => {
                warn!(
                    "Store {}: validation {} timed out",
                    submission.store_id, submission.reference
                );
                Err(Error::ProviderRejected("provider timed out".to_string()))
            }
        }
    }

    /// Latest provider payload and whether any confirm call succeeded.
    async fn confirm_with_fallback(&self, submitted: &SubmittedValidation) -> (Value, bool) {
        let mut latest = submitted.raw.clone();
        let mut confirmed = false;

        for attempt in 1..=self.settings.confirm_attempts {
            tokio::time::sleep(self.settings.confirm_delay()).await;
            match timeout(
                self.settings.request_timeout(),
                self.provider.confirm(&submitted.validation_id),
            )
            .await
            {
                Ok(Ok(raw)) => {
                    latest = raw;
                    confirmed = true;
                    if parse_result(&latest).status().is_terminal() {
                        break;
                    }
                }
                Ok(Err(e)) => warn!(
                    "Confirm {attempt} of validation {} failed: {e}",
                    submitted.validation_id
                ),
                Err(_) => warn!(
                    "Confirm {attempt} of validation {} timed out",
                    submitted.validation_id
                ),
            }
        }

        (latest, confirmed)
    }

    async fn save_account(
        &self,
        store_id: &str,
        target: Option<BankAccount>,
        details: &AccountDetails,
        outcome: &ProviderOutcome<'_>,
    ) -> Result<BankAccount> {
        if let Some(mut account) = target {
            apply_outcome(&mut account, details, outcome);
            return self.record_verification(&account).await;
        }

        let mut account = BankAccount::new_primary(store_id, details.attempt_type(), outcome.now);
        apply_outcome(&mut account, details, outcome);
        match self.store.insert_account(&account).await? {
            InsertOutcome::Inserted => Ok(account),
            InsertOutcome::PrimaryConflict => {
                // A concurrent request took the primary slot; reuse it.
                debug!("Store {store_id}: primary slot taken concurrently, updating it");
                let mut primary = self.store.primary_account(store_id).await?.ok_or_else(|| {
                    Error::Database("primary account disappeared after conflict".to_string())
                })?;
                apply_outcome(&mut primary, details, outcome);
                self.record_verification(&primary).await
            }
        }
    }

    /// Write onto an existing row; the store counts the attempt.
    async fn record_verification(&self, account: &BankAccount) -> Result<BankAccount> {
        self.store
            .record_verification(account)
            .await?
            .ok_or_else(|| Error::Database(format!("account {} disappeared", account.id)))
    }

    async fn write_audit(&self, attempt: &VerificationAttempt) {
        if let Err(e) = self.store.append_attempt(attempt).await {
            warn!(
                "Store {}: failed to write audit row for validation {}: {e}",
                attempt.store_id,
                attempt.provider_validation_id.as_deref().unwrap_or("unknown")
            );
            let _ = self.events_tx.send(VerificationEvent::AuditWriteFailed {
                store_id: attempt.store_id.clone(),
                message: e.to_string(),
            });
        }
    }

    fn persistence_failed(
        &self,
        store_id: &str,
        submitted: &SubmittedValidation,
        cause: &Error,
    ) -> Error {
        error!(
            "Store {store_id}: outcome of validation {} (fund account {}) not saved: {cause}",
            submitted.validation_id,
            submitted.fund_account_id.as_deref().unwrap_or("unknown")
        );
        let _ = self.events_tx.send(VerificationEvent::PersistenceFailed {
            store_id: store_id.to_string(),
            validation_id: Some(submitted.validation_id.clone()),
        });
        Error::Persistence {
            validation_id: Some(submitted.validation_id.clone()),
            message: cause.to_string(),
        }
    }
}

fn apply_outcome(account: &mut BankAccount, details: &AccountDetails, outcome: &ProviderOutcome<'_>) {
    let status = outcome.parsed.status();

    account.account_type = details.attempt_type();
    match details {
        AccountDetails::Bank(bank) => {
            account.holder_name.clone_from(&bank.holder_name);
            account.account_number_masked = Some(mask_account_number(&bank.account_number));
            account.account_number = if outcome.encrypted.is_some() {
                None
            } else {
                Some(bank.account_number.clone())
            };
            account.account_number_encrypted.clone_from(&outcome.encrypted);
            account.ifsc_code = Some(bank.ifsc_code.clone());
            account.bank_name = Some(bank.bank_name.clone());
            account.branch_name.clone_from(&bank.branch_name);
        }
        AccountDetails::Upi(upi) => {
            account.upi_id = Some(upi.upi_id.clone());
            if let Some(name) = &upi.display_name {
                account.holder_name.clone_from(name);
            }
        }
    }

    account.verification_status = status;
    account.is_verified = status == VerificationStatus::Verified;
    account.verified_at = account.is_verified.then_some(outcome.now);
    account.beneficiary_name.clone_from(&outcome.parsed.beneficiary_name);
    account.verification_response = Some(outcome.raw.clone());
    account.attempt_count = account.attempt_count.saturating_add(1);
    account.last_attempt_at = Some(outcome.now);
    account.provider_validation_id = Some(outcome.submitted.validation_id.clone());
    if outcome.submitted.fund_account_id.is_some() {
        account
            .provider_fund_account_id
            .clone_from(&outcome.submitted.fund_account_id);
    }
    if outcome.submitted.contact_id.is_some() {
        account
            .provider_contact_id
            .clone_from(&outcome.submitted.contact_id);
    }
    account.updated_at = outcome.now;
}
