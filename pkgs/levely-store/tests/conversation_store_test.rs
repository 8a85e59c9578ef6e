// Tests for ConversationStore

use levely_store::{LevelyStore, PersistenceConfig, StoreError};
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
    (store, db_file, storage_dir)
}

#[tokio::test]
async fn test_get_or_create_is_order_insensitive() {
    let (store, _db, _dir) = create_test_store().await;
    let conversations = store.conversations();

    let first = conversations.get_or_create("u1", "u2").await.unwrap();
    let second = conversations.get_or_create("u2", "u1").await.unwrap();
    let third = conversations.get_or_create("u1", "u2").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, third.id);
    assert_eq!(first.participant_a, "u1");
    assert_eq!(first.participant_b, "u2");

    assert_eq!(conversations.list_for_user("u1").await.unwrap().len(), 1);
    assert_eq!(conversations.list_for_user("u2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_one_record() {
    let (store, _db, _dir) = create_test_store().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let conversations = store.conversations();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                conversations.get_or_create("alice", "bob").await
            } else {
                conversations.get_or_create("bob", "alice").await
            }
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(
        store.conversations().list_for_user("alice").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_cannot_talk_to_yourself() {
    let (store, _db, _dir) = create_test_store().await;
    let err = store
        .conversations()
        .get_or_create("u1", "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_list_orders_by_last_message() {
    let (store, _db, _dir) = create_test_store().await;
    let conversations = store.conversations();

    let older = conversations.get_or_create("u1", "u2").await.unwrap();
    let newer = conversations.get_or_create("u1", "u3").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // A message in the older conversation moves it to the top
    store
        .messages()
        .insert(levely_store::NewMessage::text(&older.id, "u2", "u1", "ping"))
        .await
        .unwrap();

    let listed = conversations.list_for_user("u1").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, older.id);
    assert_eq!(listed[1].id, newer.id);
    assert!(listed[0].last_message_at > listed[0].created_at);
}

#[tokio::test]
async fn test_missing_conversation() {
    let (store, _db, _dir) = create_test_store().await;
    assert!(store.conversations().get("nope").await.unwrap().is_none());
    let err = store.conversations().require("nope").await.unwrap_err();
    assert!(err.is_not_found());
}
