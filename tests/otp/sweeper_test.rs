//! Background sweep task behavior.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use astranote::otp::{run_sweeper, OtpStore};
use astranote::store::ChannelKind;

#[tokio::test]
async fn sweeper_purges_expired_codes() {
    let store = Arc::new(OtpStore::new(Duration::minutes(10), 3));
    store.issue(1, ChannelKind::Email, "stale@example.com", Utc::now() - Duration::hours(1));
    store.issue(2, ChannelKind::Email, "fresh@example.com", Utc::now());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_sweeper(
        Arc::clone(&store),
        StdDuration::from_millis(10),
        shutdown_rx,
    ));

    for _ in 0..100 {
        if store.len() == 1 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(store.len(), 1);

    shutdown_tx.send(true).expect("sweeper should be listening");
    tokio::time::timeout(StdDuration::from_secs(1), task)
        .await
        .expect("sweeper should stop")
        .expect("sweeper should not panic");
}
