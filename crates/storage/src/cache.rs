//! Short-lived response cache under a reserved key prefix

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::manager::{SetOptions, StorageManager};

/// Prefix reserved for cache entries.
pub const CACHE_PREFIX: &str = "cache_";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct CacheStorage {
    storage: StorageManager,
    ttl: Duration,
}

impl CacheStorage {
    pub fn new(storage: StorageManager) -> Self {
        Self::with_ttl(storage, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(storage: StorageManager, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    fn key(key: &str) -> String {
        format!("{CACHE_PREFIX}{key}")
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.set_with_ttl(key, value, self.ttl)
    }

    pub fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        self.storage
            .set(&Self::key(key), value, SetOptions::expires_in(ttl))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.storage.get(&Self::key(key))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.storage.remove(&Self::key(key))
    }

    /// Remove every prefixed key and nothing else.
    pub fn clear_all(&self) -> bool {
        let keys: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(CACHE_PREFIX))
            .collect();
        debug!(entries = keys.len(), "clearing cache entries");
        keys.iter().fold(true, |ok, key| self.storage.remove(key) && ok)
    }
}
