// Tests for ConversationDirectory

use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use levely_messaging::{
    badge_label, ConversationDirectory, DirectoryEvent, DirectoryState, MessagingConfig,
};
use levely_store::{LevelyStore, NewMessage, PersistenceConfig, Profile};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

async fn create_test_store() -> (LevelyStore, NamedTempFile, TempDir) {
    let db_file = NamedTempFile::new().unwrap();
    let storage_dir = TempDir::new().unwrap();
    let store = LevelyStore::open(PersistenceConfig {
        db_path: db_file.path().to_path_buf(),
        storage_root: storage_dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .expect("Failed to open store");

    for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "carol")] {
        store
            .profiles()
            .upsert(&Profile {
                id: id.to_string(),
                username: name.to_string(),
                avatar_url: Some(format!("https://img.test/{}.png", name)),
                level: 3,
            })
            .await
            .unwrap();
    }
    (store, db_file, storage_dir)
}

async fn open(
    store: &LevelyStore,
    viewer: &str,
) -> (ConversationDirectory, UnboundedReceiver<DirectoryEvent>) {
    ConversationDirectory::open(store.clone(), Arc::new(MessagingConfig::default()), viewer).await
}

async fn wait_for<F>(events: &mut UnboundedReceiver<DirectoryEvent>, mut matches: F)
where
    F: FnMut(&DirectoryEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.next().await.expect("event stream ended");
            if matches(&event) {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for directory event")
}

#[tokio::test]
async fn test_empty_directory_is_ready() {
    let (store, _db, _dir) = create_test_store().await;
    let (directory, mut events) = open(&store, "u1").await;

    assert_eq!(directory.state(), DirectoryState::Ready(Vec::new()));
    wait_for(&mut events, |e| {
        matches!(e, DirectoryEvent::Refreshed { conversations: 0, unread_total: 0 })
    })
    .await;
}

#[tokio::test]
async fn test_first_message_shows_up_unread() {
    let (store, _db, _dir) = create_test_store().await;
    let (sender_directory, _sender_events) = open(&store, "u1").await;
    let (receiver_directory, mut receiver_events) = open(&store, "u2").await;

    let conv = sender_directory.start_conversation("u2").await.unwrap();
    assert_eq!(
        store.conversations().get_or_create("u2", "u1").await.unwrap().id,
        conv.id
    );

    store
        .messages()
        .insert(NewMessage::text(&conv.id, "u1", "u2", "hello"))
        .await
        .unwrap();

    wait_for(&mut receiver_events, |e| {
        matches!(e, DirectoryEvent::Refreshed { conversations: 1, unread_total: 1 })
    })
    .await;

    let entries = receiver_directory.conversations();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.conversation.id, conv.id);
    assert_eq!(entry.counterpart.username, "alice");
    assert_eq!(entry.unread_count, 1);
    assert_eq!(
        entry.last_message.as_ref().and_then(|m| m.content.as_deref()),
        Some("hello")
    );
    assert_eq!(receiver_directory.total_unread().await.unwrap(), 1);

    // The sender's own message does not count as unread for them
    let sender_view = sender_directory.refresh().await;
    assert_eq!(sender_view[0].unread_count, 0);
}

#[tokio::test]
async fn test_opening_conversation_clears_unread() {
    let (store, _db, _dir) = create_test_store().await;
    let conv = store.conversations().get_or_create("u1", "u2").await.unwrap();
    store
        .messages()
        .insert(NewMessage::text(&conv.id, "u1", "u2", "hello"))
        .await
        .unwrap();

    let (directory, mut events) = open(&store, "u2").await;
    assert_eq!(directory.summary(&conv.id).unwrap().unread_count, 1);

    let (channel, _channel_events) = directory.select(&conv.id).await.unwrap();
    assert_eq!(directory.selected().as_deref(), Some(conv.id.as_str()));
    assert_eq!(channel.messages().len(), 1);

    wait_for(&mut events, |e| {
        matches!(e, DirectoryEvent::Refreshed { unread_total: 0, .. })
    })
    .await;
    assert_eq!(directory.summary(&conv.id).unwrap().unread_count, 0);
    assert_eq!(directory.total_unread().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ordered_by_latest_activity() {
    let (store, _db, _dir) = create_test_store().await;
    let older = store.conversations().get_or_create("u1", "u2").await.unwrap();
    let newer = store.conversations().get_or_create("u1", "u3").await.unwrap();

    store
        .messages()
        .insert(NewMessage::text(&older.id, "u2", "u1", "first"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    store
        .messages()
        .insert(NewMessage::text(&newer.id, "u3", "u1", "second"))
        .await
        .unwrap();

    let (directory, _events) = open(&store, "u1").await;
    let ids: Vec<String> = directory
        .conversations()
        .into_iter()
        .map(|s| s.conversation.id)
        .collect();
    assert_eq!(ids, vec![newer.id, older.id]);
    assert_eq!(directory.total_unread().await.unwrap(), 2);
}

#[tokio::test]
async fn test_missing_profile_is_skipped() {
    let (store, _db, _dir) = create_test_store().await;
    let known = store.conversations().get_or_create("u1", "u2").await.unwrap();
    store
        .conversations()
        .get_or_create("u1", "ghost")
        .await
        .unwrap();

    let (directory, _events) = open(&store, "u1").await;
    let entries = directory.conversations();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].conversation.id, known.id);
    assert!(entries[0].last_message.is_none());
}

#[tokio::test]
async fn test_deleted_message_leaves_preview() {
    let (store, _db, _dir) = create_test_store().await;
    let conv = store.conversations().get_or_create("u1", "u2").await.unwrap();
    let kept = store
        .messages()
        .insert(NewMessage::text(&conv.id, "u1", "u2", "kept"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let removed = store
        .messages()
        .insert(NewMessage::text(&conv.id, "u1", "u2", "removed"))
        .await
        .unwrap();

    let (directory, mut events) = open(&store, "u2").await;
    assert_eq!(directory.summary(&conv.id).unwrap().unread_count, 2);

    store.messages().soft_delete(&removed.id, "u1").await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, DirectoryEvent::Refreshed { unread_total: 1, .. })
    })
    .await;

    let summary = directory.summary(&conv.id).unwrap();
    assert_eq!(summary.last_message.map(|m| m.id), Some(kept.id));
    assert_eq!(summary.unread_count, 1);
}

#[tokio::test]
async fn test_start_conversation_with_self_rejected() {
    let (store, _db, _dir) = create_test_store().await;
    let (directory, _events) = open(&store, "u1").await;
    assert!(directory.start_conversation("u1").await.is_err());
}

#[tokio::test]
async fn test_close_stops_watching() {
    let (store, _db, _dir) = create_test_store().await;
    let (directory, _events) = open(&store, "u1").await;
    assert_eq!(store.feed().subscriber_count(), 1);

    directory.close().await;
    directory.close().await;
    assert_eq!(store.feed().subscriber_count(), 0);
}

#[test]
fn test_badge_label() {
    assert_eq!(badge_label(0), None);
    assert_eq!(badge_label(1).as_deref(), Some("1"));
    assert_eq!(badge_label(9).as_deref(), Some("9"));
    assert_eq!(badge_label(10).as_deref(), Some("9+"));
    assert_eq!(badge_label(250).as_deref(), Some("9+"));
}
