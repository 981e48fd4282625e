//! One-time codes for verifying email delivery channels.
//!
//! [`OtpStore`] keeps at most one pending code per chat in memory. A code
//! expires after a fixed lifetime and tolerates a bounded number of wrong
//! guesses; every terminal outcome consumes it. Time is passed in by the
//! caller so expiry is testable without sleeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::store::ChannelKind;

/// Number of digits in a code.
pub const OTP_LEN: usize = 6;

/// Default code lifetime in minutes.
pub const OTP_EXPIRY_MINUTES: i64 = 10;

/// Default number of guesses allowed per code.
pub const OTP_MAX_ATTEMPTS: u32 = 3;

/// A code waiting to be confirmed.
#[derive(Debug, Clone)]
pub struct PendingOtp {
    /// The digits the user must send back.
    pub code: String,
    /// Channel being verified.
    pub kind: ChannelKind,
    /// Address being verified.
    pub address: String,
    /// When the code was issued.
    pub created_at: DateTime<Utc>,
    /// When the code stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Guesses made so far.
    pub attempts: u32,
}

/// Result of checking a guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpResult {
    /// Correct code; the pending entry was consumed.
    Verified {
        /// Channel that was verified.
        kind: ChannelKind,
        /// Address that was verified.
        address: String,
    },
    /// Wrong code; the user may try again.
    WrongCode {
        /// Guesses left.
        remaining: u32,
    },
    /// The guess budget is exhausted; the code was discarded.
    TooManyAttempts,
    /// The code expired; it was discarded.
    Expired,
    /// No code is pending for this chat.
    NotFound,
}

impl OtpResult {
    /// Whether the verification flow is over (the user cannot retry).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::WrongCode { .. })
    }
}

/// In-memory one-time-code table keyed by chat id.
///
/// Uses a sync [`Mutex`] since the critical section is brief (no awaits).
#[derive(Debug)]
pub struct OtpStore {
    pending: Mutex<HashMap<i64, PendingOtp>>,
    expiry: Duration,
    max_attempts: u32,
}

impl OtpStore {
    /// Store with a custom lifetime and guess budget.
    pub fn new(expiry: Duration, max_attempts: u32) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            expiry,
            max_attempts,
        }
    }

    /// Code lifetime.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Issue a fresh code for `chat_id`, replacing any pending one.
    pub fn issue(&self, chat_id: i64, kind: ChannelKind, address: &str, now: DateTime<Utc>) -> String {
        let code = generate_code();
        let expires_at = now.checked_add_signed(self.expiry).unwrap_or(now);

        let pending = PendingOtp {
            code: code.clone(),
            kind,
            address: address.to_owned(),
            created_at: now,
            expires_at,
            attempts: 0,
        };

        if let Ok(mut map) = self.pending.lock() {
            map.insert(chat_id, pending);
        }
        debug!(chat_id, channel = kind.as_str(), "one-time code issued");

        code
    }

    /// Check `guess` for `chat_id` at `now`.
    ///
    /// Every attempt counts, including the correct one; exceeding the budget
    /// discards the code even if the guess is right.
    pub fn verify(&self, chat_id: i64, guess: &str, now: DateTime<Utc>) -> OtpResult {
        let mut map = match self.pending.lock() {
            Ok(m) => m,
            Err(_) => return OtpResult::NotFound,
        };

        let Some(entry) = map.get_mut(&chat_id) else {
            return OtpResult::NotFound;
        };

        if now > entry.expires_at {
            map.remove(&chat_id);
            return OtpResult::Expired;
        }

        entry.attempts = entry.attempts.saturating_add(1);
        if entry.attempts > self.max_attempts {
            map.remove(&chat_id);
            return OtpResult::TooManyAttempts;
        }

        if entry.code != guess.trim() {
            return OtpResult::WrongCode {
                remaining: self.max_attempts.saturating_sub(entry.attempts),
            };
        }

        match map.remove(&chat_id) {
            Some(entry) => OtpResult::Verified {
                kind: entry.kind,
                address: entry.address,
            },
            None => OtpResult::NotFound,
        }
    }

    /// Drop any pending code for `chat_id`.
    pub fn clear(&self, chat_id: i64) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&chat_id);
        }
    }

    /// Remove all codes expired at `now`; returns how many were removed.
    pub fn gc_expired(&self, now: DateTime<Utc>) -> usize {
        match self.pending.lock() {
            Ok(mut map) => {
                let before = map.len();
                map.retain(|_, v| v.expires_at >= now);
                before.saturating_sub(map.len())
            }
            Err(_) => 0,
        }
    }

    /// Number of pending codes.
    pub fn len(&self) -> usize {
        self.pending.lock().map_or(0, |map| map.len())
    }

    /// Whether no codes are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new(Duration::minutes(OTP_EXPIRY_MINUTES), OTP_MAX_ATTEMPTS)
    }
}

/// Periodically purge expired codes until `shutdown_rx` flips to `true`.
pub async fn run_sweeper(
    store: Arc<OtpStore>,
    every: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = store.gc_expired(Utc::now());
                if removed > 0 {
                    debug!(removed, "expired one-time codes purged");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("one-time code sweeper shutting down");
                    break;
                }
            }
        }
    }
}

/// Generate a random numeric code of [`OTP_LEN`] digits.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_LEN)
        .map(|_| char::from(b'0'.saturating_add(rng.gen_range(0..10u8))))
        .collect()
}
