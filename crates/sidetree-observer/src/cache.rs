//! Per-namespace document cache with stale marking.
//!
//! Entries are never deleted on invalidation. They are marked stale, and
//! the next [`DocumentCache::resolve`] reloads from the [`DocumentLoader`],
//! falling back to the stale value only if the loader has nothing. An entry
//! stays stale until a reload returns something different, since the
//! operation store may not have caught up with the invalidation yet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ObserverError, ObserverResult};

pub const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Produces the resolution result for a suffix.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// `None` if the suffix has no document.
    async fn load(&self, unique_suffix: &str) -> ObserverResult<Option<Value>>;
}

#[derive(Clone, Debug)]
struct Entry {
    stale: bool,
    result: Value,
}

/// Bounded, insertion-ordered cache of resolution results.
pub struct DocumentCache {
    channel: String,
    namespace: String,
    capacity: usize,
    loader: Arc<dyn DocumentLoader>,
    entries: Mutex<IndexMap<String, Entry>>,
}

impl DocumentCache {
    /// A `capacity` of 0 selects [`DEFAULT_CACHE_SIZE`].
    pub fn new(
        channel: impl Into<String>,
        namespace: impl Into<String>,
        capacity: usize,
        loader: Arc<dyn DocumentLoader>,
    ) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CACHE_SIZE } else { capacity };
        let channel = channel.into();
        let namespace = namespace.into();
        info!(channel = %channel, namespace = %namespace, capacity, "creating document cache");
        Self {
            channel,
            namespace,
            capacity,
            loader,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn is_stale(&self, unique_suffix: &str) -> Option<bool> {
        self.entries.lock().get(unique_suffix).map(|e| e.stale)
    }

    /// Cached result for `unique_suffix`, loading on a miss or when stale.
    pub async fn resolve(&self, unique_suffix: &str) -> ObserverResult<Option<Value>> {
        let cached = self.entries.lock().get(unique_suffix).cloned();
        match cached {
            Some(Entry { stale: false, result }) => Ok(Some(result)),
            Some(Entry { stale: true, result }) => {
                debug!(
                    channel = %self.channel,
                    namespace = %self.namespace,
                    suffix = unique_suffix,
                    "reloading stale document"
                );
                match self.loader.load(unique_suffix).await? {
                    Some(fresh) if fresh != result => {
                        self.insert(unique_suffix, fresh.clone());
                        Ok(Some(fresh))
                    }
                    Some(_) => {
                        debug!(
                            namespace = %self.namespace,
                            suffix = unique_suffix,
                            "reloaded document unchanged, keeping it stale"
                        );
                        Ok(Some(result))
                    }
                    None => Ok(Some(result)),
                }
            }
            None => {
                let loaded = self.loader.load(unique_suffix).await?;
                if let Some(result) = &loaded {
                    self.insert(unique_suffix, result.clone());
                }
                Ok(loaded)
            }
        }
    }

    /// Mark the entry for `unique_suffix` stale. Uncached suffixes are ignored.
    pub fn invalidate(&self, unique_suffix: &str) {
        match self.entries.lock().get_mut(unique_suffix) {
            Some(entry) => {
                entry.stale = true;
                debug!(
                    channel = %self.channel,
                    namespace = %self.namespace,
                    suffix = unique_suffix,
                    "invalidated document"
                );
            }
            None => {
                debug!(
                    channel = %self.channel,
                    namespace = %self.namespace,
                    suffix = unique_suffix,
                    "document not cached"
                );
            }
        }
    }

    fn insert(&self, unique_suffix: &str, result: Value) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(unique_suffix) && entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(unique_suffix.to_string(), Entry { stale: false, result });
    }
}

/// Document caches by (channel, namespace).
#[derive(Default)]
pub struct DocumentCacheRegistry {
    caches: RwLock<HashMap<(String, String), Arc<DocumentCache>>>,
}

impl DocumentCacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: &str, cache: Arc<DocumentCache>) -> ObserverResult<()> {
        let key = (channel.to_string(), cache.namespace().to_string());
        let mut caches = self.caches.write();
        if caches.contains_key(&key) {
            return Err(ObserverError::DuplicateCache {
                channel: key.0,
                namespace: key.1,
            });
        }
        caches.insert(key, cache);
        Ok(())
    }

    pub fn get(&self, channel: &str, namespace: &str) -> ObserverResult<Arc<DocumentCache>> {
        self.caches
            .read()
            .get(&(channel.to_string(), namespace.to_string()))
            .cloned()
            .ok_or_else(|| ObserverError::CacheNotFound {
                channel: channel.to_string(),
                namespace: namespace.to_string(),
            })
    }

    /// Drop every cache registered for `channel`.
    pub fn remove_channel(&self, channel: &str) {
        self.caches.write().retain(|(c, _), _| c != channel);
    }
}
