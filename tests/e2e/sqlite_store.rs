//! Full flows against the SQLite store.

use super::{bank_form, base_time, TestHarness, OWNER_TOKEN, STORE};
use chrono::Duration;
use payee_verify::verification::MockValidationProvider;
use payee_verify::{SqliteStore, VerificationStatus, VerificationStore};
use std::time::Duration as StdDuration;

#[tokio::test]
async fn test_scenario_on_sqlite() {
    let harness = TestHarness::setup_sqlite(MockValidationProvider::new()).expect("harness");
    let now = base_time();

    let outcome = harness.verify_at(&bank_form(), now).await.expect("verify");
    assert_eq!(outcome.status, VerificationStatus::Verified);

    let primary = harness.primary(STORE).await.expect("read").expect("primary");
    assert!(primary.is_verified);
    assert_eq!(primary.account_number_masked.as_deref(), Some("XXXXXXXXX0123"));
    assert!(primary.verification_response.is_some());
    assert_eq!(harness.audit_rows(STORE, now).await.expect("audit").len(), 1);
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        1
    );
}

#[tokio::test]
async fn test_concurrent_first_verifications_share_one_primary() {
    // The delay keeps both requests in flight past the primary lookup.
    let provider = MockValidationProvider::new().with_delay(StdDuration::from_millis(50));
    let harness = TestHarness::setup_sqlite(provider).expect("harness");
    let now = base_time();
    let form = bank_form();

    let (first, second) = tokio::join!(
        harness.verifier().verify_at(OWNER_TOKEN, &form, now),
        harness.verifier().verify_at(OWNER_TOKEN, &form, now),
    );
    first.expect("first");
    second.expect("second");

    assert_eq!(harness.provider().submit_calls(), 2);
    assert_eq!(harness.active_accounts(STORE).await.expect("count"), 1);
    let primary = harness.primary(STORE).await.expect("read").expect("primary");
    assert_eq!(primary.attempt_count, 2);
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        2
    );
}

#[tokio::test]
async fn test_concurrent_reverifications_count_every_attempt() {
    let provider = MockValidationProvider::new().with_delay(StdDuration::from_millis(50));
    let harness = TestHarness::setup_sqlite(provider).expect("harness");
    let now = base_time();
    let form = bank_form();
    harness.verify_at(&form, now).await.expect("first");

    let later = now + Duration::seconds(120);
    let (first, second) = tokio::join!(
        harness.verifier().verify_at(OWNER_TOKEN, &form, later),
        harness.verifier().verify_at(OWNER_TOKEN, &form, later),
    );
    first.expect("first concurrent");
    second.expect("second concurrent");

    assert_eq!(harness.provider().submit_calls(), 3);
    assert_eq!(
        harness.limits_at(STORE, now).await.expect("limits").bank_attempts_today,
        3
    );
    assert_eq!(harness.audit_rows(STORE, now).await.expect("audit").len(), 3);
    let primary = harness.primary(STORE).await.expect("read").expect("primary");
    assert_eq!(primary.attempt_count, 3);
    assert_eq!(harness.active_accounts(STORE).await.expect("count"), 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("verify.db");
    let now = base_time();

    {
        let store = SqliteStore::open(&path).expect("open");
        let mut account =
            payee_verify::BankAccount::new_primary(STORE, payee_verify::AttemptType::Bank, now);
        account.attempt_count = 2;
        account.last_attempt_at = Some(now);
        store.insert_account(&account).await.expect("insert");
    }

    let store = SqliteStore::open(&path).expect("reopen");
    let primary = store.primary_account(STORE).await.expect("read").expect("primary");
    assert_eq!(primary.attempt_count, 2);
    assert_eq!(primary.last_attempt_at, Some(now));

    // The cooldown is read back from disk.
    let governor = payee_verify::verification::AttemptGovernor::new(
        super::test_config().policy,
    );
    let decision = governor
        .check_and_reserve(
            &store,
            STORE,
            payee_verify::AttemptType::Bank,
            Some(&primary),
            now + Duration::seconds(10),
        )
        .await
        .expect("check");
    assert_eq!(decision.retry_after_secs(), Some(50));
}
