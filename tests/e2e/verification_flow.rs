//! Verification flows through the full orchestrator.

use super::{
    bank_form, base_time, test_config, upi_form, TestHarness, OTHER_TOKEN, OWNER_TOKEN,
    SECOND_STORE, STORE,
};
use chrono::Duration;
use payee_verify::verification::{outcome_message, MockValidationProvider, VerificationForm};
use payee_verify::{Error, ErrorKind, VerificationStatus};
use serde_json::json;

fn verified_payload() -> serde_json::Value {
    json!({
        "status": "completed",
        "results": {"account_status": "verified", "registered_name": "RAMESH KUMAR"}
    })
}

#[tokio::test]
async fn test_new_store_bank_account_is_verified() {
    let harness = TestHarness::setup();
    harness
        .provider()
        .push_submit(json!({"id": "val_1", "status": "created"}));
    harness.provider().push_confirm(verified_payload());
    let now = base_time();
    let before = harness.limits_at(STORE, now).await.expect("limits");

    let outcome = harness.verify_at(&bank_form(), now).await.expect("verify");

    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(outcome.beneficiary_name.as_deref(), Some("RAMESH KUMAR"));
    assert_eq!(outcome.message, outcome_message(VerificationStatus::Verified));

    let account = harness.primary(STORE).await.expect("read").expect("saved");
    assert!(account.is_verified);
    assert_eq!(account.provider_validation_id.as_deref(), Some("val_1"));
    assert_eq!(harness.active_accounts(STORE).await.expect("count"), 1);

    let audit = harness.audit_rows(STORE, now).await.expect("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].bank_account_id, Some(account.id));
    assert_eq!(audit[0].status, VerificationStatus::Verified);

    let after = harness.limits_at(STORE, now).await.expect("limits");
    assert_eq!(after.bank_attempts_today, before.bank_attempts_today + 1);

    let submission = harness.provider().last_submission().expect("submitted");
    assert_eq!(submission.reference, format!("{STORE}-{}", now.timestamp_millis()));
    assert_eq!(submission.contact.email.as_deref(), Some("ramesh@example.com"));
}

#[tokio::test]
async fn test_outcome_serializes_for_callers() {
    let harness = TestHarness::setup();
    let outcome = harness
        .verify_at(&bank_form(), base_time())
        .await
        .expect("verify");
    let value = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(value["status"], "verified");
    assert_eq!(value["beneficiaryName"], "RAMESH KUMAR");
    assert!(value["message"].is_string());
}

#[tokio::test]
async fn test_reverification_reuses_primary_slot() {
    let mut config = test_config();
    config.policy.max_bank_attempts_per_day = 10;
    let harness = TestHarness::setup_with_config(config);
    let mut now = base_time();

    for n in 1..=5u32 {
        harness.verify_at(&bank_form(), now).await.expect("verify");
        let primary = harness.primary(STORE).await.expect("read").expect("primary");
        assert_eq!(primary.attempt_count, n);
        assert_eq!(harness.active_accounts(STORE).await.expect("count"), 1);
        now += Duration::seconds(61);
    }
}

#[tokio::test]
async fn test_verified_account_can_fail_on_reverification() {
    let harness = TestHarness::setup();
    let now = base_time();
    harness.verify_at(&bank_form(), now).await.expect("first");
    let verified = harness.primary(STORE).await.expect("read").expect("primary");
    assert_eq!(verified.verified_at, Some(now));

    harness
        .provider()
        .push_submit(json!({"id": "val_2", "status": "created"}));
    harness.provider().push_confirm(json!({
        "status": "completed",
        "results": {"account_status": "invalid", "registered_name": null}
    }));
    let outcome = harness
        .verify_at(&bank_form(), now + Duration::minutes(2))
        .await
        .expect("second");

    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert_eq!(outcome.beneficiary_name, None);
    let primary = harness.primary(STORE).await.expect("read").expect("primary");
    assert!(!primary.is_verified);
    assert_eq!(primary.verification_status, VerificationStatus::Failed);
    assert_eq!(primary.verified_at, None);
    assert_eq!(primary.attempt_count, 2);
    assert_eq!(harness.audit_rows(STORE, now).await.expect("audit").len(), 2);
}

#[tokio::test]
async fn test_confirm_failure_degrades_to_processing() {
    let harness = TestHarness::setup();
    harness
        .provider()
        .push_submit(json!({"id": "val_1", "status": "created"}));
    harness.provider().push_confirm_error("connection reset");
    let now = base_time();

    let outcome = harness.verify_at(&bank_form(), now).await.expect("verify");

    assert_eq!(outcome.status, VerificationStatus::Processing);
    assert_eq!(outcome.message, outcome_message(VerificationStatus::Processing));
    let primary = harness.primary(STORE).await.expect("read").expect("primary");
    assert!(!primary.is_verified);
    assert_eq!(primary.verification_status, VerificationStatus::Processing);
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        1
    );

    let audit = harness.audit_rows(STORE, now).await.expect("audit");
    assert_eq!(audit[0].metadata["confirmed"], false);
}

#[tokio::test]
async fn test_non_terminal_confirm_stays_processing() {
    let harness = TestHarness::setup();
    harness
        .provider()
        .push_submit(json!({"id": "val_1", "status": "created"}));
    harness.provider().push_confirm(json!({"id": "val_1", "status": "created"}));

    let outcome = harness
        .verify_at(&bank_form(), base_time())
        .await
        .expect("verify");
    assert_eq!(outcome.status, VerificationStatus::Processing);
    assert_eq!(harness.provider().confirm_calls(), 1);
}

#[tokio::test]
async fn test_second_confirm_attempt_recovers() {
    let mut config = test_config();
    config.provider.confirm_attempts = 2;
    let harness = TestHarness::setup_with_config(config);
    harness
        .provider()
        .push_submit(json!({"id": "val_1", "status": "created"}));
    harness.provider().push_confirm_error("connection reset");
    harness.provider().push_confirm(verified_payload());

    let outcome = harness
        .verify_at(&bank_form(), base_time())
        .await
        .expect("verify");
    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(harness.provider().confirm_calls(), 2);
}

#[tokio::test]
async fn test_processing_account_can_be_refreshed() {
    let harness = TestHarness::setup();
    harness
        .provider()
        .push_submit(json!({"id": "val_1", "status": "created"}));
    harness.provider().push_confirm_error("connection reset");
    let now = base_time();
    let outcome = harness.verify_at(&bank_form(), now).await.expect("verify");
    let account_id = outcome.account_id.expect("saved");

    harness.provider().push_confirm(verified_payload());
    let refreshed = harness
        .verifier()
        .refresh_at(OWNER_TOKEN, STORE, account_id, now + Duration::seconds(5))
        .await
        .expect("refresh");

    assert_eq!(refreshed.status, VerificationStatus::Verified);
    assert_eq!(harness.provider().submit_calls(), 1);
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        1
    );
    let audit = harness.audit_rows(STORE, now).await.expect("audit");
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1].metadata["refresh"], true);
}

#[tokio::test]
async fn test_name_mismatch_rejected_before_quota() {
    let harness = TestHarness::setup();
    let now = base_time();
    let form = VerificationForm {
        account_holder_name: Some("Suresh Patel".to_string()),
        ..bank_form()
    };

    let err = harness.verify_at(&form, now).await.unwrap_err();

    assert!(matches!(err, Error::NameMismatch));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(harness.provider().submit_calls(), 0);
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        0
    );
}

#[tokio::test]
async fn test_holder_name_with_suffix_matches_legal_name() {
    let harness = TestHarness::setup();
    let form = VerificationForm {
        store_id: SECOND_STORE.to_string(),
        account_holder_name: Some("kumar traders".to_string()),
        ..bank_form()
    };
    let outcome = harness.verify_at(&form, base_time()).await.expect("verify");
    assert_eq!(outcome.status, VerificationStatus::Verified);
}

#[tokio::test]
async fn test_missing_fields_are_all_listed() {
    let harness = TestHarness::setup();
    let form = VerificationForm {
        store_id: STORE.to_string(),
        account_holder_name: Some("Ramesh Kumar".to_string()),
        ..VerificationForm::default()
    };

    let err = harness.verify_at(&form, base_time()).await.unwrap_err();

    match err {
        Error::MissingFields(fields) => {
            assert_eq!(fields, vec!["account_number", "ifsc_code", "bank_name"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.provider().submit_calls(), 0);
}

#[tokio::test]
async fn test_foreign_store_is_unauthorized() {
    let harness = TestHarness::setup();

    let err = harness
        .verifier()
        .verify_at(OTHER_TOKEN, &bank_form(), base_time())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(err.user_message(), "Store not found.");

    let err = harness
        .verifier()
        .verify_at("expired", &bank_form(), base_time())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
    assert_eq!(harness.provider().submit_calls(), 0);
}

#[tokio::test]
async fn test_provider_rejection_writes_nothing() {
    let harness = TestHarness::setup();
    let now = base_time();
    harness.provider().push_submit_error("Invalid IFSC Code");

    let err = harness.verify_at(&bank_form(), now).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert!(err.user_message().contains("check"));
    assert!(harness.primary(STORE).await.expect("read").is_none());
    assert!(harness.audit_rows(STORE, now).await.expect("audit").is_empty());
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        0
    );
}

#[tokio::test]
async fn test_upi_verification() {
    let harness = TestHarness::setup();
    let now = base_time();

    let outcome = harness
        .verify_at(&upi_form("RK.Stores@OKBANK"), now)
        .await
        .expect("verify");

    assert_eq!(outcome.status, VerificationStatus::Verified);
    assert_eq!(outcome.beneficiary_name.as_deref(), Some("RK STORES"));
    let primary = harness.primary(STORE).await.expect("read").expect("primary");
    assert_eq!(primary.upi_id.as_deref(), Some("rk.stores@okbank"));
    assert_eq!(primary.account_number_masked, None);

    let limits = harness.limits_at(STORE, now).await.expect("limits");
    assert_eq!((limits.bank_attempts_today, limits.upi_attempts_today), (0, 1));
}

#[tokio::test]
async fn test_upi_display_name_must_match() {
    let harness = TestHarness::setup();
    let form = VerificationForm {
        display_name: Some("Someone Else".to_string()),
        ..upi_form("someone@okbank")
    };
    let err = harness.verify_at(&form, base_time()).await.unwrap_err();
    assert!(matches!(err, Error::NameMismatch));
}

#[tokio::test]
async fn test_unconfigured_provider_is_unavailable() {
    let harness = TestHarness::setup_with_provider(MockValidationProvider::new().unconfigured());
    let now = base_time();

    let err = harness.verify_at(&bank_form(), now).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(harness.provider().submit_calls(), 0);
    assert!(harness.primary(STORE).await.expect("read").is_none());
    assert!(harness.config().provider.source_account.ends_with("0000"));
}
