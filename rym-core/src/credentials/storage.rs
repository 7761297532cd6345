//! Durable key/value storage with change events.
//!
//! Plays the part of the browser's `localStorage`: every write is visible
//! to every store built over the same backing storage, and each change is
//! broadcast as a `StorageEvent` so independently constructed consumers
//! can react without sharing in-memory state.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// A change to one key. `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Every key that actually changed in one `update`, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub changes: Vec<KeyChange>,
}

impl StorageEvent {
    pub fn touches(&self, key: &str) -> bool {
        self.changes.iter().any(|c| c.key == key)
    }
}

/// One write in a batch: `Some` stores the value, `None` removes the key.
pub type StorageWrite<'a> = (&'a str, Option<&'a str>);

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Apply `writes` in order and broadcast one event for the keys whose
    /// value changed. Writing the value a key already holds, or removing
    /// an absent key, is not a change.
    fn update(&self, writes: &[StorageWrite<'_>]) -> Result<(), StorageError>;

    /// Receive change events from this storage.
    fn watch(&self) -> broadcast::Receiver<StorageEvent>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(&[(key, None)])
    }
}

fn announce(event_tx: &broadcast::Sender<StorageEvent>, changes: Vec<KeyChange>) {
    if !changes.is_empty() {
        // No receivers is fine
        let _ = event_tx.send(StorageEvent { changes });
    }
}

/// In-memory storage scoped to the process, the equivalent of a
/// tab-scoped session store. Share it behind an `Arc` between stores.
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    event_tx: broadcast::Sender<StorageEvent>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            event_tx,
        }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn update(&self, writes: &[StorageWrite<'_>]) -> Result<(), StorageError> {
        let mut changes = Vec::new();
        {
            let mut values = self.values.lock().unwrap();
            for (key, value) in writes {
                let old_value = match value {
                    Some(v) => values.insert(key.to_string(), v.to_string()),
                    None => values.remove(*key),
                };
                if old_value.as_deref() != *value {
                    changes.push(KeyChange {
                        key: key.to_string(),
                        old_value,
                        new_value: value.map(String::from),
                    });
                }
            }
        }
        announce(&self.event_tx, changes);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

/// OS keyring storage, durable across restarts.
///
/// Each key is a separate keyring entry under `service`, so values must
/// fit the platform's per-entry limit (about 2.5 KB on Windows). Change
/// events reach receivers in this process that watch this instance.
pub struct KeyringStorage {
    service: String,
    event_tx: broadcast::Sender<StorageEvent>,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service: service.into(),
            event_tx,
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StorageError> {
        Ok(keyring::Entry::new(&self.service, key)?)
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        let entry = self.entry(key)?;
        match value {
            Some(v) => {
                entry.set_password(v)?;
                info!("Saved {} to keyring", key);
            }
            None => match entry.delete_credential() {
                Ok(()) => info!("Deleted {} from keyring", key),
                Err(keyring::Error::NoEntry) => {
                    warn!("Tried to delete {} but none was stored", key);
                }
                Err(e) => return Err(StorageError::Keyring(e)),
            },
        }
        Ok(())
    }
}

impl KeyValueStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(e)),
        }
    }

    fn update(&self, writes: &[StorageWrite<'_>]) -> Result<(), StorageError> {
        let mut changes = Vec::new();
        let mut result = Ok(());
        for (key, value) in writes {
            let step = self.get(key).and_then(|old_value| {
                if old_value.as_deref() == *value {
                    return Ok(None);
                }
                self.write(key, *value)?;
                Ok(Some(old_value))
            });
            match step {
                Ok(Some(old_value)) => changes.push(KeyChange {
                    key: key.to_string(),
                    old_value,
                    new_value: value.map(String::from),
                }),
                Ok(None) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        // Writes that landed before a failure are still announced
        announce(&self.event_tx, changes);
        result
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<StorageEvent>) -> Vec<StorageEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn set_and_remove_emit_events() {
        let storage = MemoryStorage::new();
        let mut rx = storage.watch();

        storage.set("k", "v1").unwrap();
        storage.set("k", "v2").unwrap();
        storage.remove("k").unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].changes[0].old_value, None);
        assert_eq!(events[1].changes[0].old_value.as_deref(), Some("v1"));
        assert_eq!(events[2].changes[0].new_value, None);
    }

    #[test]
    fn unchanged_writes_are_silent() {
        let storage = MemoryStorage::new();
        storage.set("k", "v").unwrap();
        let mut rx = storage.watch();

        storage.set("k", "v").unwrap();
        storage.remove("missing").unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn batch_is_one_event_with_only_real_changes() {
        let storage = MemoryStorage::new();
        storage.set("a", "1").unwrap();
        let mut rx = storage.watch();

        storage
            .update(&[("a", Some("1")), ("b", Some("2")), ("c", None)])
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].changes,
            vec![KeyChange {
                key: "b".to_string(),
                old_value: None,
                new_value: Some("2".to_string()),
            }]
        );
        assert!(events[0].touches("b"));
        assert!(!events[0].touches("a"));
    }

    #[test]
    fn dropped_receiver_does_not_block_writes() {
        let storage = MemoryStorage::new();
        drop(storage.watch());
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
    }
}
