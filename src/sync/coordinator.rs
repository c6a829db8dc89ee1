// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::LocalCache;
use crate::content::ContentSnapshot;
use crate::remote::{BackendKind, RemoteChange, RemoteError, RemoteStore, SubscriptionHandle};
use crate::sync::debounce::Debouncer;
use crate::sync::staleness::StalenessPolicy;
use crate::sync::state::{Hydration, SyncPhase, SyncSettings, SyncStatus, WriteOutcome, WriteReport};

const CHANGE_BUFFER: usize = 16;

/// Keeps the local cache and one remote document in step.
///
/// Reads always come from the cache. Saves land in the cache synchronously
/// and reach the remote after a debounce window. While an outbound write is
/// in flight the push subscription is detached, and every write carries a
/// fresh sync tag so that its echo is recognised after re-attaching.
///
/// Cloning is cheap; all clones drive the same coordinator.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    settings: SyncSettings,
    staleness: StalenessPolicy,
    phase: watch::Sender<SyncPhase>,
    state: Mutex<SyncState>,
    /// At most one outbound write in flight
    write_lock: tokio::sync::Mutex<()>,
    outbound: Debouncer<ContentSnapshot>,
    /// Bumped by every local save
    local_edits: AtomicU64,
    /// Writes that left the debouncer but have not stamped their tag yet
    queued_writes: AtomicUsize,
    this: Weak<Inner>,
}

#[derive(Default)]
struct SyncState {
    subscription: Option<SubscriptionHandle>,
    pump: Option<JoinHandle<()>>,
    last_written_tag: Option<String>,
    last_write: Option<WriteOutcome>,
    last_write_at: Option<DateTime<Utc>>,
}

impl SyncCoordinator {
    pub fn new(cache: LocalCache, remote: Arc<dyn RemoteStore>, settings: SyncSettings) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<Inner>| {
            let weak = this.clone();
            let outbound = Debouncer::new(settings.debounce, move |snapshot: ContentSnapshot| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.write_through(snapshot).await;
                    }
                }
            });

            Inner {
                cache,
                remote,
                staleness: StalenessPolicy::new(settings.stale_after),
                settings,
                phase: watch::Sender::new(SyncPhase::Uninitialized),
                state: Mutex::new(SyncState::default()),
                write_lock: tokio::sync::Mutex::new(()),
                outbound,
                local_edits: AtomicU64::new(0),
                queued_writes: AtomicUsize::new(0),
                this: this.clone(),
            }
        });

        Self { inner }
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.remote.kind()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    /// Hydrate the cache from the remote and start listening.
    ///
    /// Runs once; later calls return `AlreadyInitialized`. The coordinator
    /// reaches `Listening` even when the remote is unreachable, serving the
    /// existing cache until a later sync succeeds.
    pub async fn init(&self) -> Hydration {
        let started = self.inner.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::Uninitialized {
                *phase = SyncPhase::SyncingInitial;
                true
            } else {
                false
            }
        });
        if !started {
            return Hydration::AlreadyInitialized;
        }

        info!(backend = %self.backend(), "Starting initial sync");
        let hydration = match self.backend() {
            BackendKind::Push => self.inner.hydrate_from_subscription().await,
            BackendKind::Pull => self.inner.hydrate_from_load().await,
        };

        self.inner.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::SyncingInitial {
                *phase = SyncPhase::Listening;
                true
            } else {
                false
            }
        });

        info!(hydration = ?hydration, phase = %self.phase(), "Initial sync finished");
        hydration
    }

    /// Current cached content
    pub fn load(&self) -> ContentSnapshot {
        self.inner.cache.read()
    }

    /// Persist `snapshot` locally now and schedule the remote write.
    ///
    /// Returns whether the local cache accepted it. The remote write happens
    /// even when the cache is full, so the data is not lost.
    pub fn save(&self, snapshot: ContentSnapshot) -> bool {
        let snapshot = snapshot.normalized(Utc::now());
        let persisted = self.inner.cache.write(&snapshot);
        self.inner.local_edits.fetch_add(1, Ordering::SeqCst);

        if self.phase() == SyncPhase::Stopped {
            warn!("Coordinator stopped, change kept locally only");
            return persisted;
        }

        self.inner.outbound.call(snapshot);
        debug!(persisted, delay = ?self.inner.outbound.delay(), "Scheduled remote write");
        persisted
    }

    pub fn is_outdated(&self) -> bool {
        self.inner
            .staleness
            .is_outdated(self.inner.cache.last_synced_at(), Utc::now())
    }

    /// Reload from the remote right now, ignoring staleness.
    ///
    /// A pending local write is sent first so it is not replaced by older
    /// remote data. If the cache is edited again before the load returns, the
    /// loaded document is discarded and the edit goes out on its own write.
    /// Re-attaches the push subscription if it was lost.
    pub async fn force_sync(&self) -> bool {
        if self.phase() == SyncPhase::Stopped {
            return false;
        }

        let edits_before = self.inner.local_edits.load(Ordering::SeqCst);
        self.flush().await;

        let _write = self.inner.write_lock.lock().await;
        let loaded = self.inner.remote.load().await;
        let edited = self.inner.local_edits.load(Ordering::SeqCst) != edits_before;

        let synced = match loaded {
            Ok(_) if edited => {
                info!(write_pending = self.inner.outbound.is_pending(), "Cache edited during forced sync, keeping local edit");
                false
            }
            Ok(snapshot) => {
                let snapshot = snapshot.unwrap_or_default();
                let written = self.inner.cache.write(&snapshot);
                if written {
                    self.inner.cache.mark_synced_now();
                }
                info!(items = snapshot.item_count(), written, "Forced sync from remote");
                written
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Forced sync failed, keeping cache");
                false
            }
        };

        if self.backend() == BackendKind::Push && self.phase() == SyncPhase::Listening && !self.inner.is_subscribed() {
            info!("Re-attaching lost subscription");
            if let Some(rx) = self.inner.attach().await {
                self.inner.spawn_pump(rx);
            }
        }

        synced
    }

    /// Send the pending debounced write now. `None` when nothing was pending.
    pub async fn flush(&self) -> Option<WriteOutcome> {
        if self.inner.outbound.flush().await {
            self.inner.lock_state().last_write
        } else {
            None
        }
    }

    /// Replace the whole content and push it to the remote without waiting
    /// for the debounce window.
    pub async fn import_snapshot(&self, snapshot: ContentSnapshot) -> WriteReport {
        info!(items = snapshot.item_count(), "Importing snapshot");
        let persisted = self.save(snapshot);
        let remote = self.flush().await;
        WriteReport { persisted, remote }
    }

    /// Forget all local content and the sync marker. The remote is untouched.
    pub fn reset(&self) -> bool {
        if self.inner.outbound.cancel() {
            warn!("Discarded a pending remote write during reset");
        }
        self.inner.lock_state().last_written_tag = None;

        let cleared = self.inner.cache.clear();
        info!(cleared, "Local cache reset");
        cleared
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.inner.lock_state();
        let last_synced_at = self.inner.cache.last_synced_at();

        SyncStatus {
            phase: self.phase(),
            backend: self.backend(),
            last_synced_at,
            outdated: self.inner.staleness.is_outdated(last_synced_at, Utc::now()),
            write_pending: self.inner.outbound.is_pending(),
            subscribed: state.subscription.as_ref().is_some_and(SubscriptionHandle::is_active),
            last_write: state.last_write,
            last_write_at: state.last_write_at,
        }
    }

    /// Cancel the pending write, detach, and stop. Call `flush` first to
    /// keep a pending write.
    pub async fn shutdown(&self) {
        let previous = self.inner.phase.send_replace(SyncPhase::Stopped);
        if previous == SyncPhase::Stopped {
            return;
        }

        if self.inner.outbound.cancel() {
            warn!("Pending remote write dropped at shutdown");
        }
        self.inner.detach().await;
        info!("Sync coordinator stopped");
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    fn is_subscribed(&self) -> bool {
        self.lock_state()
            .subscription
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
    }

    async fn hydrate_from_subscription(&self) -> Hydration {
        let Some(mut rx) = self.attach().await else {
            warn!("Push backend returned no subscription, falling back to a one-shot load");
            return self.hydrate_from_load().await;
        };

        let hydration = match tokio::time::timeout(self.settings.initial_sync_timeout, rx.recv()).await {
            Ok(Some(change)) => {
                self.apply_change(change);
                Hydration::Remote
            }
            Ok(None) => {
                warn!("Subscription closed before the first change, keeping cache");
                Hydration::Cached
            }
            Err(_) => {
                warn!(timeout = ?self.settings.initial_sync_timeout, "No initial data from remote, keeping cache");
                Hydration::Cached
            }
        };

        self.spawn_pump(rx);
        hydration
    }

    async fn hydrate_from_load(&self) -> Hydration {
        match self.remote.load().await {
            Ok(snapshot) => {
                self.apply_change(RemoteChange::new(snapshot));
                Hydration::Remote
            }
            Err(e) => {
                warn!(error = %e, "Initial load failed, keeping cache");
                Hydration::Cached
            }
        }
    }

    /// Replace the cache with an inbound change. The echo of our own last
    /// write is skipped only while a newer local edit is waiting to go out.
    fn apply_change(&self, change: RemoteChange) {
        let own_echo = {
            let state = self.lock_state();
            change.sync_tag().is_some() && change.sync_tag() == state.last_written_tag.as_deref()
        };

        if own_echo && self.newer_edit_pending() {
            debug!(tag = ?change.sync_tag(), "Ignoring echo of our own write, newer edit pending");
            self.cache.mark_synced_now();
            return;
        }

        let snapshot = change.into_snapshot();
        if self.cache.write(&snapshot) {
            self.cache.mark_synced_now();
            info!(items = snapshot.item_count(), "Applied remote change");
        }
    }

    fn newer_edit_pending(&self) -> bool {
        self.outbound.is_pending() || self.queued_writes.load(Ordering::SeqCst) > 0
    }

    async fn attach(&self) -> Option<mpsc::Receiver<RemoteChange>> {
        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let handle = self.remote.subscribe(tx).await?;

        let previous = self.lock_state().subscription.replace(handle);
        if previous.is_some() {
            self.remote.unsubscribe(previous).await;
        }

        Some(rx)
    }

    fn spawn_pump(&self, mut rx: mpsc::Receiver<RemoteChange>) {
        let weak = self.this.clone();
        let pump = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match inner.phase() {
                    // Writing only overlaps a live subscription right after re-attaching
                    SyncPhase::Listening | SyncPhase::Writing => inner.apply_change(change),
                    phase => debug!(phase = %phase, "Dropping remote change outside listening phase"),
                }
            }
        });

        if let Some(previous) = self.lock_state().pump.replace(pump) {
            previous.abort();
        }
    }

    async fn detach(&self) {
        let (subscription, pump) = {
            let mut state = self.lock_state();
            (state.subscription.take(), state.pump.take())
        };

        if let Some(pump) = pump {
            pump.abort();
        }
        self.remote.unsubscribe(subscription).await;
    }

    /// Claim the `Writing` phase, waiting out an initial sync. Returns the
    /// phase to restore afterwards, or `None` once stopped.
    async fn begin_write(&self) -> Option<SyncPhase> {
        let mut phases = self.phase.subscribe();
        loop {
            if phases
                .wait_for(|phase| *phase != SyncPhase::SyncingInitial)
                .await
                .is_err()
            {
                return None;
            }

            let mut prior = SyncPhase::Stopped;
            self.phase.send_if_modified(|phase| {
                prior = *phase;
                match *phase {
                    SyncPhase::Listening | SyncPhase::Uninitialized => {
                        *phase = SyncPhase::Writing;
                        true
                    }
                    _ => false,
                }
            });

            match prior {
                SyncPhase::Listening | SyncPhase::Uninitialized => return Some(prior),
                SyncPhase::Stopped => return None,
                // init started between the wait and the claim
                _ => continue,
            }
        }
    }

    async fn write_through(&self, mut snapshot: ContentSnapshot) -> WriteOutcome {
        let queued = QueuedWrite::new(&self.queued_writes);
        let _write = self.write_lock.lock().await;

        let Some(prior) = self.begin_write().await else {
            warn!("Coordinator stopped, dropping remote write");
            return self.record_outcome(WriteOutcome::Cancelled);
        };

        self.detach().await;

        let tag = Uuid::new_v4().to_string();
        snapshot.sync_tag = Some(tag.clone());
        self.lock_state().last_written_tag = Some(tag.clone());
        drop(queued);

        info!(tag = %tag, items = snapshot.item_count(), "Writing snapshot to remote");
        let result = match self.settings.save_timeout {
            Some(limit) => tokio::time::timeout(limit, self.remote.save(&snapshot))
                .await
                .unwrap_or(Err(RemoteError::Timeout(limit))),
            None => self.remote.save(&snapshot).await,
        };

        let outcome = match result {
            Ok(()) => {
                self.cache.mark_synced_now();
                WriteOutcome::Saved
            }
            Err(RemoteError::Unsupported { backend, operation }) => {
                warn!(backend = %backend, operation, "Remote is read-only, change kept locally");
                WriteOutcome::Unsupported
            }
            Err(RemoteError::Timeout(limit)) => {
                warn!(timeout = ?limit, "Remote write timed out");
                WriteOutcome::TimedOut
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Remote write failed, change kept locally");
                WriteOutcome::Failed
            }
        };
        self.record_outcome(outcome);

        let resubscribe = prior == SyncPhase::Listening && self.remote.kind() == BackendKind::Push;
        if resubscribe {
            tokio::time::sleep(self.settings.grace_delay).await;
        }

        if self.phase() != SyncPhase::Writing {
            debug!(phase = %self.phase(), "Phase changed during write, not re-attaching");
            return outcome;
        }

        if resubscribe {
            match self.attach().await {
                Some(rx) => self.spawn_pump(rx),
                None => warn!("Could not re-attach subscription after write"),
            }
        }

        self.phase.send_if_modified(|phase| {
            if *phase == SyncPhase::Writing {
                *phase = prior;
                true
            } else {
                false
            }
        });

        debug!(outcome = ?outcome, "Remote write finished");
        outcome
    }

    fn record_outcome(&self, outcome: WriteOutcome) -> WriteOutcome {
        let mut state = self.lock_state();
        state.last_write = Some(outcome);
        state.last_write_at = Some(Utc::now());
        outcome
    }
}

struct QueuedWrite<'a>(&'a AtomicUsize);

impl<'a> QueuedWrite<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
        // The subscription handle detaches itself when dropped
    }
}
