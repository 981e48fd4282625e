//! One-time code lifecycle: issue, verify, expiry and attempt budget.

use chrono::{DateTime, Duration, TimeZone, Utc};

use astranote::otp::{OtpResult, OtpStore, OTP_LEN};
use astranote::store::ChannelKind;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 4, 30, 0)
        .single()
        .expect("valid instant")
}

fn wrong(code: &str) -> String {
    if code == "000000" {
        "111111".to_owned()
    } else {
        "000000".to_owned()
    }
}

#[test]
fn correct_code_verifies_and_is_consumed() {
    let store = OtpStore::default();
    let code = store.issue(42, ChannelKind::Email, "a@example.com", t0());
    assert_eq!(code.len(), OTP_LEN);
    assert_eq!(store.len(), 1);

    assert_eq!(
        store.verify(42, &code, t0() + Duration::minutes(1)),
        OtpResult::Verified {
            kind: ChannelKind::Email,
            address: "a@example.com".to_owned(),
        }
    );
    assert!(store.is_empty());
    assert_eq!(store.verify(42, &code, t0()), OtpResult::NotFound);
}

#[test]
fn surrounding_whitespace_is_ignored() {
    let store = OtpStore::default();
    let code = store.issue(42, ChannelKind::Email, "a@example.com", t0());
    assert!(matches!(
        store.verify(42, &format!("  {code}\n"), t0()),
        OtpResult::Verified { .. }
    ));
}

#[test]
fn unknown_chat_is_not_found() {
    let store = OtpStore::default();
    assert_eq!(store.verify(42, "123456", t0()), OtpResult::NotFound);
}

#[test]
fn wrong_guesses_count_down_then_lock_out() {
    let store = OtpStore::new(Duration::minutes(10), 3);
    let code = store.issue(42, ChannelKind::Email, "a@example.com", t0());
    let bad = wrong(&code);

    assert_eq!(store.verify(42, &bad, t0()), OtpResult::WrongCode { remaining: 2 });
    assert_eq!(store.verify(42, &bad, t0()), OtpResult::WrongCode { remaining: 1 });
    assert_eq!(store.verify(42, &bad, t0()), OtpResult::WrongCode { remaining: 0 });
    assert_eq!(store.verify(42, &code, t0()), OtpResult::TooManyAttempts);
    assert!(store.is_empty());
}

#[test]
fn wrong_code_is_the_only_retryable_outcome() {
    assert!(!OtpResult::WrongCode { remaining: 1 }.is_terminal());
    assert!(OtpResult::Expired.is_terminal());
    assert!(OtpResult::TooManyAttempts.is_terminal());
    assert!(OtpResult::NotFound.is_terminal());
}

#[test]
fn expired_code_is_rejected_and_removed() {
    let store = OtpStore::new(Duration::minutes(10), 3);
    let code = store.issue(42, ChannelKind::Email, "a@example.com", t0());

    assert_eq!(
        store.verify(42, &code, t0() + Duration::minutes(10) + Duration::seconds(1)),
        OtpResult::Expired
    );
    assert!(store.is_empty());
}

#[test]
fn code_is_valid_up_to_its_expiry() {
    let store = OtpStore::new(Duration::minutes(10), 3);
    let code = store.issue(42, ChannelKind::Email, "a@example.com", t0());
    assert!(matches!(
        store.verify(42, &code, t0() + Duration::minutes(10)),
        OtpResult::Verified { .. }
    ));
}

#[test]
fn reissue_replaces_the_pending_code() {
    let store = OtpStore::default();
    store.issue(42, ChannelKind::Email, "old@example.com", t0());
    let code = store.issue(42, ChannelKind::Email, "new@example.com", t0());
    assert_eq!(store.len(), 1);

    assert_eq!(
        store.verify(42, &code, t0()),
        OtpResult::Verified {
            kind: ChannelKind::Email,
            address: "new@example.com".to_owned(),
        }
    );
}

#[test]
fn codes_are_per_chat() {
    let store = OtpStore::default();
    let first = store.issue(1, ChannelKind::Email, "one@example.com", t0());
    store.issue(2, ChannelKind::Email, "two@example.com", t0());

    store.clear(2);
    assert_eq!(store.len(), 1);
    assert!(matches!(store.verify(1, &first, t0()), OtpResult::Verified { .. }));
}

#[test]
fn gc_removes_only_expired_codes() {
    let store = OtpStore::new(Duration::minutes(10), 3);
    store.issue(1, ChannelKind::Email, "one@example.com", t0());
    store.issue(2, ChannelKind::Email, "two@example.com", t0() + Duration::minutes(5));

    assert_eq!(store.gc_expired(t0() + Duration::minutes(11)), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(store.gc_expired(t0() + Duration::minutes(16)), 1);
    assert!(store.is_empty());
}

#[test]
fn default_lifetime_is_ten_minutes() {
    assert_eq!(OtpStore::default().expiry(), Duration::minutes(10));
}
