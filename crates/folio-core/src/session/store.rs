//! Pluggable key-value persistence for the chat history.
//!
//! The history is one JSON array under [`HISTORY_KEY`], newest-bounded to
//! [`HISTORY_CAP`] entries.

use super::message::Message;
use crate::error::StoreError;
use dashmap::DashMap;
use std::path::Path;

pub const HISTORY_KEY: &str = "portfolio-chat-history";
pub const HISTORY_CAP: usize = 50;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Durable store backed by a sled tree.
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    const TREE: &'static str = "chat_session";

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let tree = db.open_tree(Self::TREE)?;
        Ok(Self { db, tree })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tree
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }
}

/// Write the newest [`HISTORY_CAP`] messages.
pub fn save_history(store: &dyn KeyValueStore, messages: &[Message]) -> Result<(), StoreError> {
    let start = messages.len().saturating_sub(HISTORY_CAP);
    let json = serde_json::to_string(&messages[start..])?;
    store.set(HISTORY_KEY, &json)
}

/// Read the persisted history. A corrupt entry reads as empty.
pub fn load_history(store: &dyn KeyValueStore) -> Result<Vec<Message>, StoreError> {
    let Some(raw) = store.get(HISTORY_KEY)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<Message>>(&raw) {
        Ok(messages) => Ok(messages),
        Err(e) => {
            tracing::warn!(target: "folio::session", "Discarding unreadable chat history: {}", e);
            Ok(Vec::new())
        }
    }
}

pub fn clear_history(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.remove(HISTORY_KEY)
}
