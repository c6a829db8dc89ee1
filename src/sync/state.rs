// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::remote::BackendKind;
use crate::sync::staleness::DEFAULT_STALE_AFTER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Uninitialized,
    SyncingInitial,
    Listening,
    /// An outbound save is in flight and the subscription is detached
    Writing,
    Stopped,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Uninitialized => "uninitialized",
            SyncPhase::SyncingInitial => "syncing_initial",
            SyncPhase::Listening => "listening",
            SyncPhase::Writing => "writing",
            SyncPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of one outbound write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Saved,
    Failed,
    TimedOut,
    /// The backend is read-only
    Unsupported,
    /// Dropped because the coordinator was stopped
    Cancelled,
}

/// Where `init` got the cache contents from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hydration {
    Remote,
    /// The remote was unreachable; the existing cache was kept
    Cached,
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteReport {
    /// Whether the local cache accepted the snapshot
    pub persisted: bool,
    /// Outcome of the remote write, `None` if nothing was sent
    pub remote: Option<WriteOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub backend: BackendKind,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub outdated: bool,
    pub write_pending: bool,
    pub subscribed: bool,
    pub last_write: Option<WriteOutcome>,
    pub last_write_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
    pub grace_delay: Duration,
    pub save_timeout: Option<Duration>,
    pub initial_sync_timeout: Duration,
    pub stale_after: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            grace_delay: Duration::from_millis(500),
            save_timeout: None,
            initial_sync_timeout: Duration::from_secs(10),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}
