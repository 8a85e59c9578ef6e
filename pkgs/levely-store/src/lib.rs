//! Levely Store - the backend the messaging subsystem talks to
//!
//! This crate stands in for the hosted backend: it owns every durable record
//! and the push channels clients use to hear about changes.
//!
//! # Architecture
//!
//! - **ConversationStore**: get-or-create of one conversation per user pair
//! - **MessageStore**: message persistence, read marking, soft delete, unread counts
//! - **ProfileStore**: identity lookups (username, avatar, level)
//! - **ChangeFeed**: row-level insert/update notifications for messages
//! - **BroadcastHub**: ephemeral named channels (typing indicators)
//! - **ObjectStorage**: bucketed binary uploads with public URLs
//!
//! Records live in SQLite through Sea-ORM. The [`LevelyStore`] handle is cheap
//! to clone and is what the messaging crate receives.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use levely_store::{LevelyStore, NewMessage, PersistenceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LevelyStore::open(PersistenceConfig::default()).await?;
//!
//! let conversation = store.conversations().get_or_create("u1", "u2").await?;
//! store
//!     .messages()
//!     .insert(NewMessage::text(&conversation.id, "u1", "u2", "hello"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod conversation_store;
pub mod entities;
pub mod error;
pub mod feed;
pub mod message_store;
pub mod migration;
pub mod object_storage;
pub mod profile_store;

mod models;

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub use broadcast::{BroadcastEnvelope, BroadcastHub, BroadcastSubscription};
pub use conversation_store::ConversationStore;
pub use error::{Result, StoreError};
pub use feed::{ChangeFeed, FeedFilter, FeedSubscription};
pub use message_store::MessageStore;
pub use models::{ChangeKind, Conversation, Message, MessageChange, NewMessage, Profile};
pub use object_storage::{LocalObjectStorage, ObjectStorage, StoredObject};
pub use profile_store::ProfileStore;

/// Configuration for the persistence layer
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// Directory holding uploaded objects, one sub-directory per bucket
    pub storage_root: PathBuf,

    /// Prefix for public object URLs
    pub public_url_base: String,

    /// Buffered changes per feed subscriber before it starts lagging (default: 256)
    pub feed_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("levely.db"),
            storage_root: PathBuf::from("levely-storage"),
            public_url_base: "http://localhost:8080/storage".to_string(),
            feed_capacity: 256,
        }
    }
}

/// Handle to the whole backend
#[derive(Clone)]
pub struct LevelyStore {
    db: DatabaseConnection,
    feed: ChangeFeed,
    broadcast: BroadcastHub,
    storage: Arc<dyn ObjectStorage>,
}

impl LevelyStore {
    /// Connect to the database, run migrations and set up local object storage.
    pub async fn open(config: PersistenceConfig) -> Result<Self> {
        let db_path = config.db_path.to_str().ok_or_else(|| {
            StoreError::InvalidRequest(format!(
                "Invalid database path: {}",
                config.db_path.display()
            ))
        })?;
        let db_url = format!("sqlite:{}?mode=rwc", db_path.replace('\\', "/"));

        let db = Database::connect(db_url.as_str()).await?;
        migration::Migrator::up(&db, None).await?;

        info!("Levely store initialized at {}", config.db_path.display());

        let storage = LocalObjectStorage::new(&config.storage_root, config.public_url_base);
        Ok(Self::assemble(db, Arc::new(storage), config.feed_capacity))
    }

    /// Build a store around an existing, already migrated connection.
    pub fn with_connection(db: DatabaseConnection, storage: Arc<dyn ObjectStorage>) -> Self {
        Self::assemble(db, storage, PersistenceConfig::default().feed_capacity)
    }

    fn assemble(
        db: DatabaseConnection,
        storage: Arc<dyn ObjectStorage>,
        feed_capacity: usize,
    ) -> Self {
        Self {
            db,
            feed: ChangeFeed::new(feed_capacity),
            broadcast: BroadcastHub::new(),
            storage,
        }
    }

    pub fn conversations(&self) -> ConversationStore {
        ConversationStore::new(self.db.clone())
    }

    pub fn messages(&self) -> MessageStore {
        MessageStore::new(self.db.clone(), self.feed.clone())
    }

    pub fn profiles(&self) -> ProfileStore {
        ProfileStore::new(self.db.clone())
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn broadcast(&self) -> &BroadcastHub {
        &self.broadcast
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}
