//! Daily quota, cooldown and account ceiling.

use super::{bank_form, base_time, test_config, upi_form, TestHarness, STORE};
use chrono::Duration;
use payee_verify::store::{AttemptType, BankAccount, VerificationLimits};
use payee_verify::verification::VerificationForm;
use payee_verify::{Error, ErrorKind, VerificationStatus};
use serde_json::json;

#[tokio::test]
async fn test_every_provider_outcome_consumes_quota() {
    let harness = TestHarness::setup();
    let mut now = base_time();
    let verdicts = [
        (json!({"status": "completed", "results": {"account_status": "active"}}), VerificationStatus::Verified),
        (json!({"status": "completed", "results": {"account_status": "invalid"}}), VerificationStatus::Failed),
        (json!({"status": "created"}), VerificationStatus::Processing),
    ];

    for (k, (confirm, expected)) in verdicts.into_iter().enumerate() {
        harness
            .provider()
            .push_submit(json!({"id": format!("val_{k}"), "status": "created"}));
        harness.provider().push_confirm(confirm);

        let before = harness.limits_at(STORE, now).await.expect("limits");
        let outcome = harness.verify_at(&bank_form(), now).await.expect("verify");
        let after = harness.limits_at(STORE, now).await.expect("limits");

        assert_eq!(outcome.status, expected);
        assert_eq!(after.bank_attempts_today, before.bank_attempts_today + 1);
        now += Duration::seconds(90);
    }
}

#[tokio::test]
async fn test_rejected_requests_leave_quota_untouched() {
    let mut config = test_config();
    config.provider.source_account = String::new();
    let harness = TestHarness::setup_with_config(config);
    let now = base_time();

    let err = harness.verify_at(&bank_form(), now).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.user_message().contains("unavailable"));

    let bad_ifsc = VerificationForm {
        ifsc_code: Some("ABCD1234567".to_string()),
        ..bank_form()
    };
    assert!(matches!(
        harness.verify_at(&bad_ifsc, now).await,
        Err(Error::InvalidField { .. })
    ));

    let limits = harness.limits_at(STORE, now).await.expect("limits");
    assert_eq!(limits.bank_attempts_today, 0);
    assert_eq!(harness.provider().submit_calls(), 0);
}

#[tokio::test]
async fn test_daily_limit_blocks_fourth_attempt() {
    let harness = TestHarness::setup();
    let mut now = base_time();
    for _ in 0..3 {
        harness.verify_at(&bank_form(), now).await.expect("verify");
        now += Duration::seconds(61);
    }

    let err = harness.verify_at(&bank_form(), now).await.unwrap_err();

    assert!(matches!(err, Error::DailyLimitExceeded { limit: 3, .. }));
    assert_eq!(err.retry_after_secs(), None);
    assert!(err.user_message().contains("tomorrow"));
    assert_eq!(harness.provider().submit_calls(), 3);

    // UPI has its own counter.
    harness
        .verify_at(&upi_form("rk.stores@okbank"), now)
        .await
        .expect("upi");
}

#[tokio::test]
async fn test_cooldown_blocks_rapid_retry() {
    let harness = TestHarness::setup();
    let now = base_time();
    harness.verify_at(&bank_form(), now).await.expect("first");

    let err = harness
        .verify_at(&bank_form(), now + Duration::seconds(20))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Quota);
    assert_eq!(err.retry_after_secs(), Some(40));
    assert_eq!(harness.provider().submit_calls(), 1);

    harness
        .verify_at(&bank_form(), now + Duration::seconds(60))
        .await
        .expect("after cooldown");
}

#[tokio::test]
async fn test_daily_reset_allows_next_day() {
    let harness = TestHarness::setup();
    let day_one = base_time();
    let today = harness.verifier().governor().today(day_one);
    harness
        .store()
        .load_limits(STORE, today)
        .await
        .expect("create row");
    for _ in 0..3 {
        harness
            .store()
            .increment_attempts(STORE, AttemptType::Bank, today)
            .await
            .expect("increment");
    }
    assert!(harness.verify_at(&bank_form(), day_one).await.is_err());

    let day_two = day_one + Duration::days(1);
    harness.verify_at(&bank_form(), day_two).await.expect("next day");

    let limits: VerificationLimits = harness.limits_at(STORE, day_two).await.expect("limits");
    assert_eq!(limits.bank_attempts_today, 1);
    assert_eq!(limits.last_reset_date, harness.verifier().governor().today(day_two));
}

#[tokio::test]
async fn test_day_rolls_over_at_local_midnight() {
    let harness = TestHarness::setup();
    // 18:25 UTC is 23:55 IST; 18:35 UTC is already the next local day.
    let late = base_time() + Duration::hours(12) + Duration::minutes(25);
    let mut now = late - Duration::minutes(10);
    for _ in 0..3 {
        harness.verify_at(&bank_form(), now).await.expect("verify");
        now += Duration::seconds(61);
    }
    assert!(harness.verify_at(&bank_form(), late).await.is_err());

    harness
        .verify_at(&bank_form(), late + Duration::minutes(10))
        .await
        .expect("after local midnight");
}

#[tokio::test]
async fn test_account_ceiling_applies_to_new_rows() {
    let mut config = test_config();
    config.policy.max_accounts_per_store = 1;
    let harness = TestHarness::setup_with_config(config);
    let now = base_time();

    let mut inactive_primary = BankAccount::new_primary(STORE, AttemptType::Bank, now);
    inactive_primary.is_primary = false;
    harness
        .store()
        .insert_account(&inactive_primary)
        .await
        .expect("insert");

    let err = harness.verify_at(&bank_form(), now).await.unwrap_err();
    assert!(matches!(err, Error::AccountLimitReached { max: 1 }));
    assert_eq!(harness.provider().submit_calls(), 0);

    // Targeting the existing row is still allowed.
    let form = VerificationForm {
        account_id: Some(inactive_primary.id.to_string()),
        ..bank_form()
    };
    let outcome = harness.verify_at(&form, now).await.expect("verify");
    assert_eq!(outcome.account_id, Some(inactive_primary.id));
}
