// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

use crate::cache::traits::KeyValueStore;
use crate::content::ContentSnapshot;

const CONTENT_KEY_SUFFIX: &str = "admin_data";
const LAST_SYNC_KEY_SUFFIX: &str = "last_sync";

/// Synchronous source of truth for reads: the full snapshot plus the time of
/// the last successful remote sync, stored under two namespaced keys.
///
/// Nothing here returns an error. Reads fall back to the empty snapshot and
/// writes report persistence as a `bool`, so callers keep running whatever
/// the storage does. A snapshot the store refused is held in memory and
/// served by `read` until a later write persists.
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    content_key: String,
    last_sync_key: String,
    unpersisted: Arc<Mutex<Option<ContentSnapshot>>>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            store,
            content_key: format!("{}_{}", namespace, CONTENT_KEY_SUFFIX),
            last_sync_key: format!("{}_{}", namespace, LAST_SYNC_KEY_SUFFIX),
            unpersisted: Arc::new(Mutex::new(None)),
        }
    }

    pub fn content_key(&self) -> &str {
        &self.content_key
    }

    pub fn last_sync_key(&self) -> &str {
        &self.last_sync_key
    }

    pub fn read(&self) -> ContentSnapshot {
        if let Some(snapshot) = self.lock_unpersisted().as_ref() {
            return snapshot.clone();
        }

        match self.store.get(&self.content_key) {
            Ok(Some(raw)) => ContentSnapshot::from_json_lossy(&raw),
            Ok(None) => ContentSnapshot::default(),
            Err(e) => {
                warn!(error = %e, key = %self.content_key, "Failed to read cached content");
                ContentSnapshot::default()
            }
        }
    }

    pub fn write(&self, snapshot: &ContentSnapshot) -> bool {
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Failed to serialize content snapshot");
                *self.lock_unpersisted() = Some(snapshot.clone());
                return false;
            }
        };

        match self.store.set(&self.content_key, &raw) {
            Ok(()) => {
                self.lock_unpersisted().take();
                debug!(bytes = raw.len(), items = snapshot.item_count(), "Cached content snapshot");
                true
            }
            Err(e) => {
                warn!(error = %e, key = %self.content_key, "Failed to persist content snapshot, keeping it in memory");
                *self.lock_unpersisted() = Some(snapshot.clone());
                false
            }
        }
    }

    /// Whether the snapshot served by `read` is only held in memory
    pub fn has_unpersisted(&self) -> bool {
        self.lock_unpersisted().is_some()
    }

    pub fn mark_synced_now(&self) -> bool {
        self.mark_synced_at(Utc::now())
    }

    pub fn mark_synced_at(&self, at: DateTime<Utc>) -> bool {
        match self.store.set(&self.last_sync_key, &at.to_rfc3339()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to record last sync time");
                false
            }
        }
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(&self.last_sync_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read last sync time");
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                warn!(error = %e, value = %raw, "Ignoring unparseable last sync time");
                None
            }
        }
    }

    /// Drop both the snapshot and the sync marker
    pub fn clear(&self) -> bool {
        self.lock_unpersisted().take();
        let content = self.store.remove(&self.content_key);
        let marker = self.store.remove(&self.last_sync_key);

        match content.and(marker) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear local cache");
                false
            }
        }
    }

    fn lock_unpersisted(&self) -> MutexGuard<'_, Option<ContentSnapshot>> {
        self.unpersisted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
