//! Durable key-value store shared by the engine and every observer

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info};

use super::{Settings, TimerState};
use crate::error::{StoreError, StoreResult};

/// Key holding the persisted [`TimerState`]
pub const TIMER_STATE_KEY: &str = "timerState";
/// Key holding the persisted [`Settings`]
pub const SETTINGS_KEY: &str = "settings";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted after a key has been durably written
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub key: String,
    pub value: Value,
}

/// Asynchronous store with whole-record writes and change notifications
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write a record. Subscribers are notified only after the write is durable.
    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Read the timer record, if one has been written
pub async fn read_timer_state(store: &dyn StateStore) -> StoreResult<Option<TimerState>> {
    read_typed(store, TIMER_STATE_KEY).await
}

pub async fn write_timer_state(store: &dyn StateStore, state: &TimerState) -> StoreResult<()> {
    write_typed(store, TIMER_STATE_KEY, state).await
}

/// Read settings, falling back to defaults when none were seeded
pub async fn read_settings(store: &dyn StateStore) -> StoreResult<Settings> {
    Ok(read_typed(store, SETTINGS_KEY).await?.unwrap_or_default())
}

pub async fn write_settings(store: &dyn StateStore, settings: &Settings) -> StoreResult<()> {
    write_typed(store, SETTINGS_KEY, settings).await
}

/// Decode the timer record carried by a change notification
pub fn timer_state_from_change(change: &StoreChange) -> Option<TimerState> {
    if change.key != TIMER_STATE_KEY {
        return None;
    }
    serde_json::from_value(change.value.clone()).ok()
}

async fn read_typed<T: serde::de::DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Serialization { key: key.to_string(), source }),
        None => Ok(None),
    }
}

async fn write_typed<T: serde::Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let value = serde_json::to_value(value)
        .map_err(|source| StoreError::Serialization { key: key.to_string(), source })?;
    store.set(key, value).await
}

/// Volatile store, used by tests and by short-lived embeddings
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        {
            let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
            entries.insert(key.to_string(), value.clone());
        }
        // No subscribers is fine
        let _ = self.changes.send(StoreChange { key: key.to_string(), value });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Store persisted as one JSON object on disk.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never see a half-written record.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: AsyncMutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing entries if the file exists
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                StoreError::Serialization { key: path.display().to_string(), source }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Io { path: path.display().to_string(), source });
            }
        };

        info!("Opened state store at {} ({} keys)", path.display(), entries.len());
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            entries: AsyncMutex::new(entries),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &HashMap<String, Value>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| {
            StoreError::Serialization { key: self.path.display().to_string(), source }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value.clone());

        if let Err(e) = self.flush(&entries).await {
            // Keep memory in step with what is on disk
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        drop(entries);

        debug!("Persisted {} to {}", key, self.path.display());
        let _ = self.changes.send(StoreChange { key: key.to_string(), value });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
