use std::collections::HashMap;
use std::fmt::Debug;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use log::debug;
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::core::error::BatteryError;

/// Per-visit key/value state, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    async fn get(&self, session: &str, key: &str) -> Result<Option<serde_json::Value>, BatteryError>;

    async fn set(&self, session: &str, key: &str, value: serde_json::Value) -> Result<(), BatteryError>;

    async fn remove(&self, session: &str, key: &str) -> Result<(), BatteryError>;

    /// Drop every key of a session at once
    async fn clear(&self, session: &str) -> Result<(), BatteryError>;
}

/// Read a typed value from the session
pub async fn load<T: DeserializeOwned>(
    store: &dyn SessionStore,
    session: &str,
    key: &str,
) -> Result<Option<T>, BatteryError> {
    match store.get(session, key).await? {
        Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
            BatteryError::InvalidState(format!("session value '{}' is unreadable: {}", key, e))
        }),
        None => Ok(None),
    }
}

/// Write a typed value to the session
pub async fn save<T: Serialize + Sync>(
    store: &dyn SessionStore,
    session: &str,
    key: &str,
    value: &T,
) -> Result<(), BatteryError> {
    let value = serde_json::to_value(value)
        .map_err(|e| BatteryError::PersistenceFailure(format!("cannot encode '{}': {}", key, e)))?;
    store.set(session, key, value).await
}

/// In-process session store bounded by an LRU over visits
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: Mutex<LruCache<String, HashMap<String, serde_json::Value>>>,
}

impl MemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of visits currently held
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session: &str, key: &str) -> Result<Option<serde_json::Value>, BatteryError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.get(session).and_then(|values| values.get(key).cloned()))
    }

    async fn set(&self, session: &str, key: &str, value: serde_json::Value) -> Result<(), BatteryError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(values) = sessions.get_mut(session) {
            values.insert(key.to_string(), value);
            return Ok(());
        }
        let mut values = HashMap::new();
        values.insert(key.to_string(), value);
        if let Some((evicted, _)) = sessions.push(session.to_string(), values) {
            if evicted != session {
                debug!("Evicted idle session {}", evicted);
            }
        }
        Ok(())
    }

    async fn remove(&self, session: &str, key: &str) -> Result<(), BatteryError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(values) = sessions.get_mut(session) {
            values.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), BatteryError> {
        self.sessions.lock().await.pop(session);
        Ok(())
    }
}
