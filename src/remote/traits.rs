// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::content::ContentSnapshot;
use crate::remote::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Live change notifications over a standing subscription
    Push,
    /// One-shot fetch only
    Pull,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Push => f.write_str("push"),
            BackendKind::Pull => f.write_str("pull"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "push" | "firebase" => Ok(BackendKind::Push),
            "pull" | "static" | "github" => Ok(BackendKind::Pull),
            other => Err(anyhow::anyhow!("Unknown backend kind: {} (expected push or pull)", other)),
        }
    }
}

/// One notification from a push subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteChange {
    /// `None` when the remote document does not exist
    pub snapshot: Option<ContentSnapshot>,
}

impl RemoteChange {
    pub fn new(snapshot: Option<ContentSnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn sync_tag(&self) -> Option<&str> {
        self.snapshot.as_ref()?.sync_tag.as_deref()
    }

    pub fn into_snapshot(self) -> ContentSnapshot {
        self.snapshot.unwrap_or_default()
    }
}

/// Owner's handle on a standing subscription.
///
/// Detaching is idempotent and also happens on drop, so a handle that goes
/// out of scope never leaves a listener behind.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    active: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl SubscriptionHandle {
    /// `active` is shared with the delivering side, which must stop sending
    /// once it reads `false`.
    pub fn new(active: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            active,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn detach(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Fetch the remote document once; `Ok(None)` when it does not exist
    async fn load(&self) -> Result<Option<ContentSnapshot>, RemoteError>;

    /// Fetch the remote document, substituting the empty snapshot for any failure
    async fn load_or_default(&self) -> ContentSnapshot {
        match self.load().await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, backend = %self.kind(), "Remote load failed, using empty snapshot");
                ContentSnapshot::default()
            }
        }
    }

    /// Overwrite the whole remote document
    async fn save(&self, snapshot: &ContentSnapshot) -> Result<(), RemoteError>;

    /// Start delivering every remote change (including our own writes) into
    /// `sink`. Returns `None` for backends without live push.
    async fn subscribe(&self, sink: mpsc::Sender<RemoteChange>) -> Option<SubscriptionHandle>;

    /// Stop a subscription; safe to call with `None` or a detached handle
    async fn unsubscribe(&self, handle: Option<SubscriptionHandle>) {
        if let Some(mut handle) = handle {
            let was_active = handle.is_active();
            handle.detach();
            debug!(subscription = %handle.id(), was_active, "Detached remote subscription");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("push".parse::<BackendKind>().unwrap(), BackendKind::Push);
        assert_eq!("Firebase".parse::<BackendKind>().unwrap(), BackendKind::Push);
        assert_eq!("pull".parse::<BackendKind>().unwrap(), BackendKind::Pull);
        assert_eq!("github".parse::<BackendKind>().unwrap(), BackendKind::Pull);
        assert!("ftp".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_remote_change_defaults() {
        let change = RemoteChange::new(None);
        assert_eq!(change.sync_tag(), None);
        assert_eq!(change.into_snapshot(), ContentSnapshot::default());
    }

    #[test]
    fn test_handle_detach_is_idempotent() {
        let active = Arc::new(AtomicBool::new(true));
        let mut handle = SubscriptionHandle::new(active.clone(), None);

        assert!(handle.is_active());
        handle.detach();
        handle.detach();
        assert!(!handle.is_active());
        assert!(!active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handle_detaches_on_drop() {
        let active = Arc::new(AtomicBool::new(true));
        drop(SubscriptionHandle::new(active.clone(), None));
        assert!(!active.load(Ordering::SeqCst));
    }
}
