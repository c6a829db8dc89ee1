// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::content::ContentSnapshot;
use crate::remote::error::RemoteError;
use crate::remote::sse::{SseDecoder, SseEvent};
use crate::remote::traits::{BackendKind, RemoteChange, RemoteStore, SubscriptionHandle};
use crate::utils::{normalize_database_path, validate_remote_url};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Push backend over the Realtime Database REST API.
///
/// One document lives at `<database_url>/<path>.json`. Loads and saves are
/// plain `GET`/`PUT`; the subscription is the streaming variant of `GET`.
#[derive(Debug, Clone)]
pub struct FirebaseBackend {
    client: Client,
    document_url: Url,
    auth: Option<String>,
    request_timeout: Duration,
    reconnect_initial: Duration,
    reconnect_max: Duration,
}

/// Why a single streaming connection ended
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    /// Server closed the body; reconnect
    Closed,
    /// `cancel` or `auth_revoked`; reconnecting would fail the same way
    Revoked(String),
    /// The handle was detached or the receiver went away
    Detached,
}

#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

impl FirebaseBackend {
    pub fn new(database_url: &str, path: &str, auth: Option<String>) -> anyhow::Result<Self> {
        let mut document_url = validate_remote_url(database_url)?;
        let path = normalize_database_path(path)?;
        let base_path = document_url.path().trim_end_matches('/').to_string();
        document_url.set_path(&format!("{}/{}.json", base_path, path));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("storefront-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            document_url,
            auth: auth.filter(|a| !a.is_empty()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_initial: DEFAULT_RECONNECT_INITIAL,
            reconnect_max: DEFAULT_RECONNECT_MAX,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial = initial;
        self.reconnect_max = max.max(initial);
        self
    }

    pub fn document_url(&self) -> &Url {
        &self.document_url
    }

    fn build_request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, self.document_url.clone());

        if let Some(ref auth) = self.auth {
            request = request.query(&[("auth", auth)]);
        }

        request
    }

    async fn run_stream(self, sink: mpsc::Sender<RemoteChange>, active: Arc<AtomicBool>) {
        let mut backoff = self.reconnect_initial;

        while active.load(Ordering::SeqCst) {
            match self.stream_once(&sink, &active).await {
                Ok((StreamEnd::Detached, _)) => break,
                Ok((StreamEnd::Revoked(reason), _)) => {
                    error!(reason = %reason, url = %self.document_url, "Remote stream revoked, not reconnecting");
                    break;
                }
                Ok((StreamEnd::Closed, delivered)) => {
                    if delivered > 0 {
                        backoff = self.reconnect_initial;
                    }
                    info!(delivered, "Remote stream closed");
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "Remote stream failed");
                }
            }

            if !active.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.reconnect_max);
        }

        debug!(url = %self.document_url, "Remote stream task finished");
    }

    /// One streaming connection. Returns how it ended and how many changes
    /// were delivered.
    async fn stream_once(
        &self,
        sink: &mpsc::Sender<RemoteChange>,
        active: &AtomicBool,
    ) -> Result<(StreamEnd, usize), RemoteError> {
        let response = self
            .build_request(reqwest::Method::GET)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::status(status, text));
        }

        info!(url = %self.document_url, "Remote stream connected");

        // Every connection starts with a full `put`, so the mirror is rebuilt each time
        let mut mirror = Value::Null;
        let mut decoder = SseDecoder::new();
        let mut delivered = 0;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                if !active.load(Ordering::SeqCst) {
                    return Ok((StreamEnd::Detached, delivered));
                }

                match apply_event(&mut mirror, &event) {
                    EventOutcome::Changed => {
                        let snapshot = (!mirror.is_null())
                            .then(|| ContentSnapshot::from_value_lossy(mirror.clone()));
                        if sink.send(RemoteChange::new(snapshot)).await.is_err() {
                            return Ok((StreamEnd::Detached, delivered));
                        }
                        delivered += 1;
                    }
                    EventOutcome::Ignored => {}
                    EventOutcome::Revoked => {
                        return Ok((StreamEnd::Revoked(event.event), delivered));
                    }
                }
            }
        }

        Ok((StreamEnd::Closed, delivered))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EventOutcome {
    Changed,
    Ignored,
    Revoked,
}

fn apply_event(mirror: &mut Value, event: &SseEvent) -> EventOutcome {
    match event.event.as_str() {
        "put" | "patch" => {}
        "keep-alive" => return EventOutcome::Ignored,
        "cancel" | "auth_revoked" => return EventOutcome::Revoked,
        other => {
            debug!(event = %other, "Ignoring unknown stream event");
            return EventOutcome::Ignored;
        }
    }

    let payload: StreamPayload = match serde_json::from_str(&event.data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, event = %event.event, "Malformed stream payload");
            return EventOutcome::Ignored;
        }
    };

    if event.event == "patch" && !payload.data.is_object() {
        warn!(path = %payload.path, "Patch payload is not an object");
        return EventOutcome::Ignored;
    }

    let segments: Vec<&str> = payload.path.split('/').filter(|s| !s.is_empty()).collect();
    let current = std::mem::take(mirror);

    *mirror = match payload.data {
        Value::Object(children) if event.event == "patch" => {
            children.into_iter().fold(current, |node, (key, value)| {
                let path: Vec<&str> = segments.iter().copied().chain([key.as_str()]).collect();
                replace_at(node, &path, value)
            })
        }
        data => replace_at(current, &segments, data),
    };

    EventOutcome::Changed
}

/// Replace the subtree of `node` at `segments` with `data`. A `null` value
/// deletes the key, and containers left empty collapse to `null` the way the
/// database stores them. Arrays are turned into index-keyed objects once a
/// child is addressed.
fn replace_at(node: Value, segments: &[&str], data: Value) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return data;
    };

    let mut children: Map<String, Value> = match node {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    };

    let child = children.remove(*head).unwrap_or(Value::Null);
    let child = replace_at(child, rest, data);
    if !child.is_null() {
        children.insert(head.to_string(), child);
    }

    if children.is_empty() {
        Value::Null
    } else {
        Value::Object(children)
    }
}

#[async_trait]
impl RemoteStore for FirebaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Push
    }

    async fn load(&self) -> Result<Option<ContentSnapshot>, RemoteError> {
        debug!(url = %self.document_url, "Loading remote document");

        let response = self
            .build_request(reqwest::Method::GET)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "Remote load failed");
            return Err(RemoteError::status(status, text));
        }

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Remote document is not JSON");
            RemoteError::Json(e)
        })?;

        if value.is_null() {
            info!("Remote document does not exist yet");
            return Ok(None);
        }

        Ok(Some(ContentSnapshot::from_value_lossy(value)))
    }

    async fn save(&self, snapshot: &ContentSnapshot) -> Result<(), RemoteError> {
        info!(items = snapshot.item_count(), tag = ?snapshot.sync_tag, "Saving remote document");

        let response = self
            .build_request(reqwest::Method::PUT)
            .query(&[("print", "silent")])
            .timeout(self.request_timeout)
            .json(snapshot)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Remote save failed");
            return Err(RemoteError::status(status, text));
        }

        Ok(())
    }

    async fn subscribe(&self, sink: mpsc::Sender<RemoteChange>) -> Option<SubscriptionHandle> {
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(self.clone().run_stream(sink, active.clone()));

        let handle = SubscriptionHandle::new(active, Some(task.abort_handle()));
        debug!(subscription = %handle.id(), "Subscribed to remote document");
        Some(handle)
    }
}
