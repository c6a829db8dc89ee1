// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::Utc;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::{LocalCache, MemoryStore};
use crate::config::Config;
use crate::content::{ContentSnapshot, Item};
use crate::remote::{BackendKind, RemoteChange, RemoteError, RemoteStore, SubscriptionHandle};
use crate::sync::{SyncCoordinator, SyncSettings};

#[derive(Default)]
struct MemoryRemoteState {
    document: Option<ContentSnapshot>,
    subscribers: Vec<(Arc<AtomicBool>, mpsc::Sender<RemoteChange>)>,
    saves: Vec<ContentSnapshot>,
    fail_next_saves: usize,
    fail_next_loads: usize,
    load_calls: usize,
}

impl MemoryRemoteState {
    fn notify(&mut self) {
        let change = RemoteChange::new(self.document.clone());
        self.subscribers
            .retain(|(active, tx)| active.load(Ordering::SeqCst) && tx.try_send(change.clone()).is_ok());
    }
}

/// In-process remote with push semantics close to the Realtime Database:
/// every subscriber gets the current document on subscribe and after every
/// save, including its own.
#[derive(Clone)]
pub struct MemoryRemote {
    kind: BackendKind,
    save_latency: Duration,
    emit_on_subscribe: bool,
    state: Arc<Mutex<MemoryRemoteState>>,
}

impl MemoryRemote {
    pub fn push(document: Option<ContentSnapshot>) -> Self {
        Self::with_kind(BackendKind::Push, document)
    }

    pub fn pull(document: Option<ContentSnapshot>) -> Self {
        Self::with_kind(BackendKind::Pull, document)
    }

    fn with_kind(kind: BackendKind, document: Option<ContentSnapshot>) -> Self {
        Self {
            kind,
            save_latency: Duration::ZERO,
            emit_on_subscribe: true,
            state: Arc::new(Mutex::new(MemoryRemoteState {
                document,
                ..MemoryRemoteState::default()
            })),
        }
    }

    pub fn with_save_latency(mut self, latency: Duration) -> Self {
        self.save_latency = latency;
        self
    }

    pub fn without_initial_event(mut self) -> Self {
        self.emit_on_subscribe = false;
        self
    }

    /// Simulate another client writing the document
    pub fn push_remote_change(&self, document: Option<ContentSnapshot>) {
        let mut state = self.state.lock().unwrap();
        state.document = document;
        state.notify();
    }

    /// Replace the document without notifying anyone
    pub fn set_document(&self, document: Option<ContentSnapshot>) {
        self.state.lock().unwrap().document = document;
    }

    /// Simulate the server dropping every stream
    pub fn drop_subscribers(&self) {
        let mut state = self.state.lock().unwrap();
        for (active, _) in state.subscribers.drain(..) {
            active.store(false, Ordering::SeqCst);
        }
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.state.lock().unwrap().fail_next_saves = count;
    }

    pub fn fail_next_loads(&self, count: usize) {
        self.state.lock().unwrap().fail_next_loads = count;
    }

    /// Current server-side document
    pub fn document(&self) -> Option<ContentSnapshot> {
        self.state.lock().unwrap().document.clone()
    }

    pub fn saves(&self) -> Vec<ContentSnapshot> {
        self.state.lock().unwrap().saves.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.state.lock().unwrap().load_calls
    }

    pub fn active_subscribers(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state
            .subscribers
            .retain(|(active, tx)| active.load(Ordering::SeqCst) && !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn load(&self) -> Result<Option<ContentSnapshot>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.load_calls += 1;
        if state.fail_next_loads > 0 {
            state.fail_next_loads -= 1;
            return Err(RemoteError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(state.document.clone())
    }

    async fn save(&self, snapshot: &ContentSnapshot) -> Result<(), RemoteError> {
        if self.kind == BackendKind::Pull {
            return Err(RemoteError::Unsupported {
                backend: BackendKind::Pull,
                operation: "save",
            });
        }

        tokio::time::sleep(self.save_latency).await;

        let mut state = self.state.lock().unwrap();
        if state.fail_next_saves > 0 {
            state.fail_next_saves -= 1;
            return Err(RemoteError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        state.document = Some(snapshot.clone());
        state.saves.push(snapshot.clone());
        state.notify();
        Ok(())
    }

    async fn subscribe(&self, sink: mpsc::Sender<RemoteChange>) -> Option<SubscriptionHandle> {
        if self.kind == BackendKind::Pull {
            return None;
        }

        let active = Arc::new(AtomicBool::new(true));
        let mut state = self.state.lock().unwrap();
        if self.emit_on_subscribe {
            let _ = sink.try_send(RemoteChange::new(state.document.clone()));
        }
        state.subscribers.push((active.clone(), sink));

        Some(SubscriptionHandle::new(active, None))
    }
}

/// Shop snapshot with one item per name, ids starting at 1
pub fn snapshot_with(names: &[&str]) -> ContentSnapshot {
    let now = Utc::now();
    let mut snapshot = ContentSnapshot::default();
    for (i, name) in names.iter().enumerate() {
        snapshot.shop.push(Item {
            name: Some(name.to_string()),
            price: Some(20.0),
            ..Item::new(i as u64 + 1, now)
        });
    }
    snapshot
}

pub fn memory_cache() -> LocalCache {
    LocalCache::new(Arc::new(MemoryStore::new()), "test")
}

/// Coordinator over an in-memory cache with default timings
pub fn test_coordinator(remote: MemoryRemote) -> (SyncCoordinator, LocalCache) {
    let cache = memory_cache();
    let coordinator = SyncCoordinator::new(cache.clone(), Arc::new(remote), SyncSettings::default());
    (coordinator, cache)
}

/// Create a test configuration with temporary paths
pub fn create_test_config() -> Config {
    let temp_dir = std::env::temp_dir().join(format!("storefront-sync-test-{}", uuid::Uuid::new_v4()));

    Config {
        data_dir: temp_dir,
        cache_namespace: "test".to_string(),
        storage_quota_bytes: Some(1024 * 1024),
        backend: BackendKind::Push,
        database_url: Some("http://127.0.0.1:9000".to_string()),
        database_path: "content".to_string(),
        database_auth: None,
        static_content_url: None,
        debounce_ms: 2000,
        grace_delay_ms: 500,
        save_timeout_secs: None,
        initial_sync_timeout_secs: 10,
        stale_after_secs: 3600,
        staleness_check_secs: 300,
        local_api_bind: SocketAddr::from_str("127.0.0.1:0").unwrap(), // Use port 0 to auto-assign
        log_level: "error".to_string(), // Reduce log noise in tests
        log_json: false,
    }
}
