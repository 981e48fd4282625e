//! Fan-out of fired reminders to verified channels.

use std::sync::Arc;

use tokio::sync::mpsc;

use astranote::delivery::email::EmailSender;
use astranote::delivery::{reminder_text, Delivery, DeliveryReport};
use astranote::store::{ChannelKind, Store};

use crate::support::RecordingEmail;

async fn store() -> Store {
    Store::in_memory().await.expect("in-memory store should open")
}

#[tokio::test]
async fn unverified_user_gets_the_reminder_in_chat() {
    let store = store().await;
    let (tx, mut rx) = mpsc::channel(4);
    let delivery = Delivery::new(store, tx, None);

    let report = delivery.deliver(42, "chai").await;
    assert_eq!(
        report,
        DeliveryReport {
            delivered: 1,
            failed: 0,
        }
    );
    let outbound = rx.try_recv().expect("queued");
    assert_eq!(outbound.chat_id, 42);
    assert_eq!(outbound.text, reminder_text("chai"));
}

#[tokio::test]
async fn every_verified_channel_receives_it() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");
    store
        .save_channel(42, ChannelKind::Email, "a@example.com", true)
        .await
        .expect("save");

    let email = Arc::new(RecordingEmail::default());
    let sender: Arc<dyn EmailSender> = email.clone();
    let (tx, mut rx) = mpsc::channel(4);
    let delivery = Delivery::new(store, tx, Some(sender));

    let report = delivery.deliver(42, "gym <now>").await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(rx.try_recv().expect("queued").chat_id, 42);
    let sent = email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@example.com");
    assert!(sent[0].html.contains("gym &lt;now&gt;"));
}

#[tokio::test]
async fn unverified_channels_are_skipped() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");
    store
        .save_channel(42, ChannelKind::Email, "a@example.com", false)
        .await
        .expect("save");

    let email = Arc::new(RecordingEmail::default());
    let sender: Arc<dyn EmailSender> = email.clone();
    let (tx, _rx) = mpsc::channel(4);
    let delivery = Delivery::new(store, tx, Some(sender));

    assert_eq!(delivery.deliver(42, "chai").await.delivered, 1);
    assert!(email.sent().is_empty());
}

#[tokio::test]
async fn channel_failures_are_counted_not_raised() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");
    store
        .save_channel(42, ChannelKind::Email, "a@example.com", true)
        .await
        .expect("save");

    let sender: Arc<dyn EmailSender> = Arc::new(RecordingEmail::rejecting());
    let (tx, _rx) = mpsc::channel(4);
    let delivery = Delivery::new(store, tx, Some(sender));

    assert_eq!(
        delivery.deliver(42, "chai").await,
        DeliveryReport {
            delivered: 1,
            failed: 1,
        }
    );
}

#[tokio::test]
async fn verified_email_without_a_sender_fails() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Email, "a@example.com", true)
        .await
        .expect("save");
    let (tx, mut rx) = mpsc::channel(4);
    let delivery = Delivery::new(store, tx, None);

    let report = delivery.deliver(42, "chai").await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn closed_outbound_queue_counts_as_failure() {
    let store = store().await;
    let (tx, rx) = mpsc::channel(4);
    drop(rx);
    let delivery = Delivery::new(store, tx, None);

    assert!(!delivery.send_telegram(42, "hi".to_owned()).await);
    assert_eq!(delivery.deliver(42, "chai").await.failed, 1);
}

#[tokio::test]
async fn malformed_telegram_address_fails() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "not-a-chat", true)
        .await
        .expect("save");
    let (tx, _rx) = mpsc::channel(4);
    let delivery = Delivery::new(store, tx, None);

    assert_eq!(delivery.deliver(42, "chai").await.failed, 1);
}
