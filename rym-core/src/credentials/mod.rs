//! The signed-in user's credential.
//!
//! `CredentialStore` holds no copy of the credential: every read goes to
//! the backing `KeyValueStorage`, and change notification is driven by the
//! storage's events. Two stores built over the same storage therefore see
//! each other's writes without sharing any in-memory state.
//!
//! Each token lives under its own key so no single stored value carries
//! more than one JWT. A credential is written or cleared in one batch, so
//! watchers never observe a half-replaced credential.

mod storage;

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

pub use storage::{
    KeyChange, KeyValueStorage, KeyringStorage, MemoryStorage, StorageError, StorageEvent,
    StorageWrite,
};

pub const ID_TOKEN_KEY: &str = "rym.id_token";
pub const ACCESS_TOKEN_KEY: &str = "rym.access_token";
pub const REFRESH_TOKEN_KEY: &str = "rym.refresh_token";

/// Every storage key that holds part of the credential.
pub const CREDENTIAL_KEYS: [&str; 3] = [ID_TOKEN_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY];

/// Tokens from a successful code exchange. Replaced wholesale, never patched.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credential {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credential {
    /// Token sent as `Authorization: Bearer`.
    ///
    /// The backend authorizer reads identity claims, so the id token is
    /// preferred and the access token is the fallback.
    pub fn bearer(&self) -> Option<&str> {
        non_empty(&self.id_token).or_else(|| non_empty(&self.access_token))
    }

    fn token_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            ID_TOKEN_KEY => Some(&mut self.id_token),
            ACCESS_TOKEN_KEY => Some(&mut self.access_token),
            REFRESH_TOKEN_KEY => Some(&mut self.refresh_token),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.id_token.is_none() && self.access_token.is_none() && self.refresh_token.is_none()
    }
}

fn non_empty(token: &Option<String>) -> Option<&str> {
    token.as_deref().filter(|t| !t.is_empty())
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credential")
            .field("id_token", &redact(&self.id_token))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// A credential transition seen through storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialEvent {
    /// A credential was stored, replacing any previous one.
    Stored(Credential),
    /// The credential was removed (logout or rejected session).
    Cleared,
}

impl CredentialEvent {
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            CredentialEvent::Stored(credential) => Some(credential),
            CredentialEvent::Cleared => None,
        }
    }
}

/// Zero-or-one credential, persisted in key/value storage.
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Current credential, read from storage.
    ///
    /// Unreadable storage reads as signed out.
    pub fn get(&self) -> Option<Credential> {
        match read_credential(self.storage.as_ref()) {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Failed to read credential: {}", e);
                None
            }
        }
    }

    pub fn set(&self, credential: &Credential) -> Result<(), StorageError> {
        self.storage.update(&[
            (ID_TOKEN_KEY, credential.id_token.as_deref()),
            (ACCESS_TOKEN_KEY, credential.access_token.as_deref()),
            (REFRESH_TOKEN_KEY, credential.refresh_token.as_deref()),
        ])?;
        info!("Credential stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let writes: Vec<StorageWrite<'_>> = CREDENTIAL_KEYS.iter().map(|k| (*k, None)).collect();
        self.storage.update(&writes)?;
        info!("Credential cleared");
        Ok(())
    }

    pub fn bearer(&self) -> Option<String> {
        self.get().and_then(|c| c.bearer().map(String::from))
    }

    pub fn is_signed_in(&self) -> bool {
        self.bearer().is_some()
    }

    /// Subscribe to credential transitions, including writes made through
    /// other stores over the same storage. Dropping the receiver
    /// unsubscribes.
    pub fn on_change(&self) -> CredentialChanges {
        let events = self.storage.watch();
        CredentialChanges {
            events,
            storage: self.storage.clone(),
            last: self.get(),
        }
    }
}

fn read_credential(storage: &dyn KeyValueStorage) -> Result<Option<Credential>, StorageError> {
    let credential = Credential {
        id_token: storage.get(ID_TOKEN_KEY)?,
        access_token: storage.get(ACCESS_TOKEN_KEY)?,
        refresh_token: storage.get(REFRESH_TOKEN_KEY)?,
    };
    Ok(Some(credential).filter(|c| !c.is_empty()))
}

/// Receiver of credential transitions for one subscriber.
///
/// Storage events are folded onto the last credential this receiver saw,
/// so only real transitions come out. If the receiver falls behind, or an
/// event does not follow from what it last saw, it re-reads storage and
/// reports the current state if that differs.
pub struct CredentialChanges {
    events: broadcast::Receiver<StorageEvent>,
    storage: Arc<dyn KeyValueStorage>,
    last: Option<Credential>,
}

impl CredentialChanges {
    /// Wait for the next transition. `None` once the storage is gone.
    pub async fn recv(&mut self) -> Option<CredentialEvent> {
        loop {
            let next = match self.events.recv().await {
                Ok(event) => self.fold(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.resync(skipped),
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            if next.is_some() {
                return next;
            }
        }
    }

    /// The next transition already delivered, without waiting.
    pub fn try_next(&mut self) -> Option<CredentialEvent> {
        loop {
            let next = match self.events.try_recv() {
                Ok(event) => self.fold(&event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.resync(skipped),
                Err(_) => return None,
            };
            if next.is_some() {
                return next;
            }
        }
    }

    fn fold(&mut self, event: &StorageEvent) -> Option<CredentialEvent> {
        if !CREDENTIAL_KEYS.iter().any(|k| event.touches(k)) {
            return None;
        }
        let mut credential = self.last.clone().unwrap_or_default();
        for change in &event.changes {
            let Some(token) = credential.token_mut(&change.key) else {
                continue;
            };
            if *token != change.old_value {
                // Already reflected in `last`, or written elsewhere
                return self.resync(0);
            }
            *token = change.new_value.clone();
        }
        self.transition(Some(credential).filter(|c| !c.is_empty()))
    }

    fn resync(&mut self, skipped: u64) -> Option<CredentialEvent> {
        if skipped > 0 {
            warn!("Credential watcher missed {} storage events", skipped);
        }
        match read_credential(self.storage.as_ref()) {
            Ok(current) => self.transition(current),
            Err(e) => {
                warn!("Failed to read credential: {}", e);
                None
            }
        }
    }

    fn transition(&mut self, current: Option<Credential>) -> Option<CredentialEvent> {
        if current == self.last {
            return None;
        }
        self.last = current.clone();
        Some(match current {
            Some(credential) => CredentialEvent::Stored(credential),
            None => CredentialEvent::Cleared,
        })
    }
}
