//! Delivery channel persistence.

use astranote::store::{ChannelKind, Store};

async fn store() -> Store {
    Store::in_memory().await.expect("in-memory store should open")
}

#[tokio::test]
async fn new_chat_is_not_verified() {
    let store = store().await;
    assert!(!store.is_user_verified(42).await.expect("query"));
    assert!(store.channels(42).await.expect("query").is_empty());
}

#[tokio::test]
async fn verified_channel_verifies_the_chat() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");

    assert!(store.is_user_verified(42).await.expect("query"));
    assert!(!store.is_user_verified(7).await.expect("query"));
}

#[tokio::test]
async fn unverified_channel_is_not_a_delivery_target() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");
    store
        .save_channel(42, ChannelKind::Email, "a@example.com", false)
        .await
        .expect("save");

    assert_eq!(store.channels(42).await.expect("query").len(), 2);
    let targets = store.verified_channels(42).await.expect("query");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].kind, ChannelKind::Telegram);
}

#[tokio::test]
async fn saving_again_replaces_the_channel() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Email, "old@example.com", false)
        .await
        .expect("save");
    store
        .save_channel(42, ChannelKind::Email, "new@example.com", true)
        .await
        .expect("save");

    let channels = store.channels(42).await.expect("query");
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].address, "new@example.com");
    assert!(channels[0].verified);
}

#[tokio::test]
async fn channels_are_ordered_by_kind() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");
    store
        .save_channel(42, ChannelKind::Email, "a@example.com", true)
        .await
        .expect("save");

    let kinds: Vec<ChannelKind> = store
        .channels(42)
        .await
        .expect("query")
        .into_iter()
        .map(|c| c.kind)
        .collect();
    assert_eq!(kinds, vec![ChannelKind::Email, ChannelKind::Telegram]);
}

#[tokio::test]
async fn delete_channel_reports_whether_it_existed() {
    let store = store().await;
    store
        .save_channel(42, ChannelKind::Telegram, "42", true)
        .await
        .expect("save");

    assert!(store.delete_channel(42, ChannelKind::Telegram).await.expect("delete"));
    assert!(!store.delete_channel(42, ChannelKind::Telegram).await.expect("delete"));
    assert!(!store.is_user_verified(42).await.expect("query"));
}
