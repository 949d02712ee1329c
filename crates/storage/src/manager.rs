//! Typed, expiring entries over a [`StorageBackend`]
//!
//! Each value is wrapped in a [`StoredEntry`] and written as JSON text.
//! Reads check expiry lazily: an expired entry is deleted and reported as
//! absent, so a stale value is never returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};

/// Envelope persisted for every key.
///
/// `timestamp` and `expires_at` are unix timestamps in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry<T> {
    pub value: T,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl<T> StoredEntry<T> {
    pub fn new(value: T, expires_in: Option<Duration>) -> Self {
        let timestamp = now_millis();
        Self {
            value,
            timestamp,
            expires_at: expires_in.and_then(|ttl| expiry_after(timestamp, ttl)),
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// `timestamp + ttl` in milliseconds; `None` when it does not fit, which
/// leaves the entry without an expiry.
fn expiry_after(timestamp: u64, ttl: Duration) -> Option<u64> {
    u64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ms| timestamp.checked_add(ms))
}

/// Options for [`StorageManager::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Entry lifetime. `None` never expires; zero expires immediately.
    pub expires_in: Option<Duration>,
}

impl SetOptions {
    pub fn expires_in(ttl: Duration) -> Self {
        Self {
            expires_in: Some(ttl),
        }
    }
}

/// Fail-soft storage facade.
///
/// Cheap to clone; clones share the backend. A manager built with
/// [`StorageManager::unavailable`] behaves like a context without any store:
/// writes report `false`, reads report absent.
#[derive(Clone)]
pub struct StorageManager {
    backend: Option<Arc<dyn StorageBackend>>,
}

impl StorageManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    /// Whether the backend exists and accepts a sentinel write + delete.
    pub fn is_available(&self) -> bool {
        match &self.backend {
            Some(backend) => match backend.probe() {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "storage probe failed");
                    false
                }
            },
            None => false,
        }
    }

    fn backend(&self) -> Result<&dyn StorageBackend> {
        match &self.backend {
            Some(backend) if self.is_available() => Ok(backend.as_ref()),
            _ => Err(StorageError::Unavailable),
        }
    }

    /// Serialize `value` into a [`StoredEntry`] and write it under `key`.
    pub fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<()> {
        let backend = self.backend()?;
        let entry = StoredEntry::new(value, options.expires_in);
        let text = serde_json::to_string(&entry)
            .map_err(|e| StorageError::Serialization(format!("serializing {key}: {e}")))?;
        backend.set_item(key, &text)
    }

    /// Read `key`. `Ok(None)` covers both missing and expired entries; expired
    /// entries are removed as a side effect.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let backend = self.backend()?;
        let Some(text) = backend.get_item(key)? else {
            return Ok(None);
        };
        let entry: StoredEntry<serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| StorageError::Serialization(format!("parsing {key}: {e}")))?;

        if entry.is_expired_at(now_millis()) {
            debug!(key, "storage entry expired, removing");
            backend.remove_item(key)?;
            return Ok(None);
        }

        serde_json::from_value(entry.value)
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("decoding {key}: {e}")))
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        match self.try_set(key, value, options) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "failed to write storage entry");
                false
            }
        }
    }

    /// Read `key`, treating missing, corrupt, expired and unavailable alike.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(StorageError::Unavailable) => None,
            Err(e) => {
                warn!(key, error = %e, "failed to read storage entry");
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend().and_then(|backend| backend.remove_item(key)) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "failed to remove storage entry");
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        match self.backend().and_then(|backend| backend.clear()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to clear storage");
                false
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match self.backend().and_then(|backend| backend.keys()) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list storage keys");
                Vec::new()
            }
        }
    }

    /// Whether a live (non-expired, parseable) entry exists under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get::<serde_json::Value>(key).is_some()
    }

    /// Read several keys, substituting `default` for each absent one.
    pub fn get_multiple<T>(&self, keys: &[&str], default: T) -> HashMap<String, T>
    where
        T: DeserializeOwned + Clone,
    {
        keys.iter()
            .map(|key| (key.to_string(), self.get_or(key, default.clone())))
            .collect()
    }

    /// Write several entries one at a time.
    ///
    /// Not atomic: on failure earlier entries stay written. Returns true only
    /// when every write succeeded.
    pub fn set_multiple<I, K, V>(&self, entries: I, options: SetOptions) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        entries
            .into_iter()
            .fold(true, |ok, (key, value)| self.set(key.as_ref(), &value, options) && ok)
    }

    /// Remove several keys; true only when every removal succeeded.
    pub fn remove_multiple(&self, keys: &[&str]) -> bool {
        keys.iter().fold(true, |ok, key| self.remove(key) && ok)
    }
}

/// Current time as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
