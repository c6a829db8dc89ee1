// SPDX-License-Identifier: GPL-3.0-only
pub mod error;
pub mod firebase;
pub mod sse;
pub mod static_file;
pub mod traits;

pub use error::RemoteError;
pub use firebase::FirebaseBackend;
pub use static_file::StaticFileBackend;
pub use traits::{BackendKind, RemoteChange, RemoteStore, SubscriptionHandle};

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Build the remote adapter selected by `backend`
pub fn build_remote(config: &Config) -> anyhow::Result<Arc<dyn RemoteStore>> {
    match config.backend {
        BackendKind::Push => {
            let url = config
                .database_url
                .as_deref()
                .context("database_url is required for the push backend")?;
            let mut backend = FirebaseBackend::new(url, &config.database_path, config.database_auth.clone())?;
            if let Some(secs) = config.save_timeout_secs {
                // Loads and saves share the bound; the stream itself is never timed out
                backend = backend.with_request_timeout(Duration::from_secs(secs));
            }
            Ok(Arc::new(backend))
        }
        BackendKind::Pull => {
            let url = config
                .static_content_url
                .as_deref()
                .context("static_content_url is required for the pull backend")?;
            Ok(Arc::new(StaticFileBackend::new(url)?))
        }
    }
}
