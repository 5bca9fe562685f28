//! Versioned asset caches and the controller that serves requests from them.

mod controller;
mod disk;
mod fallback;
mod strategy;

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::net::Response;

pub use controller::{AssetCacheController, ClientMessage, ControlMessage, FetchResponse, WorkerState};
pub use disk::DiskCacheStore;
pub use fallback::{OFFLINE_STATUS_TEXT, TRANSPARENT_GIF, offline_page, placeholder_image, unavailable};
pub use strategy::{RequestClass, classify, is_image};

/// A store of named caches, each mapping a request key to a response.
///
/// Mirrors the browser cache storage: caches are created on demand and a
/// whole cache is deleted at once.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Names of every existing cache, sorted.
    async fn cache_names(&self) -> Result<Vec<String>>;

    /// Creates the named cache if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Looks up `key` in the named cache. A missing cache is a miss.
    async fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>>;

    /// Stores `response` under `key`, creating the cache if needed.
    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()>;

    /// Deletes the named cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: Mutex<BTreeMap<String, HashMap<String, Response>>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, HashMap<String, Response>>>> {
        self.caches
            .lock()
            .map_err(|_| Error::Cache("cache store lock poisoned".to_string()))
    }

    /// Number of entries in the named cache, or `None` if it does not exist.
    #[must_use]
    pub fn len_of(&self, name: &str) -> Option<usize> {
        self.lock().ok()?.get(name).map(HashMap::len)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn open(&self, name: &str) -> Result<()> {
        self.lock()?.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>> {
        Ok(self
            .lock()?
            .get(name)
            .and_then(|cache| cache.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()> {
        self.lock()?
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.remove(name).is_some())
    }
}
