// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::content::ContentSnapshot;
use crate::remote::error::RemoteError;
use crate::remote::traits::{BackendKind, RemoteChange, RemoteStore, SubscriptionHandle};
use crate::utils::validate_remote_url;

/// Pull backend: a JSON file served over HTTP, typically straight from a
/// repository (`raw.githubusercontent.com/...`). Read-only.
#[derive(Debug, Clone)]
pub struct StaticFileBackend {
    client: Client,
    url: Url,
}

impl StaticFileBackend {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let url = validate_remote_url(url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("storefront-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RemoteStore for StaticFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pull
    }

    async fn load(&self) -> Result<Option<ContentSnapshot>, RemoteError> {
        info!(url = %self.url, "Fetching static content");

        // Raw file hosts cache aggressively
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                warn!(url = %self.url, "Static content file not found");
                return Err(RemoteError::NotFound);
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                warn!(status = %status, "Static content fetch failed");
                return Err(RemoteError::status(status, text));
            }
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, url = %self.url, "Static content is not JSON");
            RemoteError::Json(e)
        })?;
        let snapshot = ContentSnapshot::from_value_lossy(value);
        debug!(items = snapshot.item_count(), "Fetched static content");

        Ok(Some(snapshot))
    }

    async fn save(&self, _snapshot: &ContentSnapshot) -> Result<(), RemoteError> {
        Err(RemoteError::Unsupported {
            backend: BackendKind::Pull,
            operation: "save",
        })
    }

    async fn subscribe(&self, _sink: mpsc::Sender<RemoteChange>) -> Option<SubscriptionHandle> {
        None
    }
}
