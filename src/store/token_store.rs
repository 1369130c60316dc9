//! Durable token → value store
//!
//! Wraps a persistence backend with an in-memory cache. Persistence
//! failures are logged and absorbed: the cache keeps the current session
//! working, and callers never see an error from `load` or `save`.
//!
//! Entries whose write failed stay queued. They take precedence over the
//! backend's copy on `load` and are written again by the next `save`.

use crate::config::StorageConfig;
use crate::error::Result;
use crate::privacy::token::{Token, TokenMapping};
use crate::store::persistence::{FilePersistence, Persistence};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Token store with merge-on-write persistence
pub struct TokenStore {
    backend: Option<Arc<dyn Persistence>>,
    key: String,
    cache: Arc<RwLock<TokenMapping>>,
    /// Entries not yet written to the backend; also serializes load/save
    unsaved: Mutex<TokenMapping>,
}

impl TokenStore {
    /// Store persisting under `key` in `backend`
    pub fn new(backend: Arc<dyn Persistence>, key: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            key: key.into(),
            cache: Arc::new(RwLock::new(TokenMapping::new())),
            unsaved: Mutex::new(TokenMapping::new()),
        }
    }

    /// Store without persistence (cache only)
    pub fn in_memory() -> Self {
        Self {
            backend: None,
            key: crate::config::DEFAULT_STORE_KEY.to_string(),
            cache: Arc::new(RwLock::new(TokenMapping::new())),
            unsaved: Mutex::new(TokenMapping::new()),
        }
    }

    /// Build from storage configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        if !config.enabled {
            return Self::in_memory();
        }
        Self::new(
            Arc::new(FilePersistence::new(config.path.clone())),
            config.key.clone(),
        )
    }

    /// Whether a persistence backend is attached
    pub fn is_persistent(&self) -> bool {
        self.backend.is_some()
    }

    /// Full token map.
    ///
    /// Persisted entries are merged into the cache, under any entries still
    /// waiting to be written; on failure the cache is returned as-is.
    pub async fn load(&self) -> TokenMapping {
        let Some(backend) = &self.backend else {
            return self.snapshot().await;
        };

        let unsaved = self.unsaved.lock().await;
        match self.read_persisted(backend.as_ref()).await {
            Ok(mut persisted) => {
                persisted.extend(unsaved.iter().map(|(k, v)| (k.clone(), v.clone())));
                let mut cache = self.cache.write().await;
                cache.extend(persisted);
                cache.clone()
            }
            Err(e) => {
                tracing::warn!(
                    backend = backend.name(),
                    "Token store load failed, using in-memory cache: {}",
                    e
                );
                self.snapshot().await
            }
        }
    }

    /// Merge `entries` into the store; new values win on key collision.
    ///
    /// The cache is always updated. The read-merge-write against the
    /// backend is serialized per store and also carries entries left over
    /// from earlier failed writes.
    pub async fn save(&self, entries: &TokenMapping) {
        if entries.is_empty() {
            return;
        }

        let mut unsaved = self.unsaved.lock().await;

        self.cache
            .write()
            .await
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        let Some(backend) = &self.backend else {
            return;
        };
        unsaved.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut merged = match self.read_persisted(backend.as_ref()).await {
            Ok(persisted) => persisted,
            Err(e) => {
                // Writing now would clobber whatever the backend holds
                tracing::warn!(
                    backend = backend.name(),
                    unsaved = unsaved.len(),
                    "Token store read before save failed, keeping entries in memory: {}",
                    e
                );
                return;
            }
        };
        merged.extend(unsaved.iter().map(|(k, v)| (k.clone(), v.clone())));

        let value = match serde_json::to_value(&merged) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Token map serialization failed: {}", e);
                return;
            }
        };

        match backend.set(&self.key, value).await {
            Ok(()) => {
                tracing::debug!(
                    backend = backend.name(),
                    added = entries.len(),
                    written = unsaved.len(),
                    total = merged.len(),
                    "Token map persisted"
                );
                unsaved.clear();
                self.cache.write().await.extend(merged);
            }
            Err(e) => tracing::warn!(
                backend = backend.name(),
                unsaved = unsaved.len(),
                "Token store save failed, keeping entries in memory: {}",
                e
            ),
        }
    }

    /// Current cache contents (no I/O)
    pub async fn snapshot(&self) -> TokenMapping {
        self.cache.read().await.clone()
    }

    /// Value for a single token from the cache
    pub async fn lookup(&self, token: &str) -> Option<String> {
        self.cache.read().await.get(token).cloned()
    }

    /// Number of cached tokens
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Token count per label, without exposing values
    pub async fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for token in self.cache.read().await.keys() {
            let label = Token::parse(token)
                .map(|t| t.label().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    async fn read_persisted(&self, backend: &dyn Persistence) -> Result<TokenMapping> {
        match backend.get(&self.key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(TokenMapping::new()),
        }
    }
}
