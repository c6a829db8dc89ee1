// SPDX-License-Identifier: GPL-3.0-only
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::{ApiHandlers, ApiResponse, ApiResult, ItemChange, SyncResult};
use crate::content::{ContentSnapshot, Item};
use crate::sync::{SyncCoordinator, SyncStatus, WriteOutcome, WriteReport};

type Handlers = State<Arc<ApiHandlers>>;

pub struct HttpServer {
    handlers: ApiHandlers,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(coordinator: SyncCoordinator, addr: SocketAddr) -> Self {
        Self {
            handlers: ApiHandlers::new(coordinator),
            addr,
        }
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let app = router(Arc::new(self.handlers));

        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

        Ok(())
    }
}

pub fn router(handlers: Arc<ApiHandlers>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/content", get(get_content_handler).put(replace_content_handler))
        .route("/api/status", get(status_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/flush", post(flush_handler))
        .route("/api/import", post(import_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/items/:collection", put(upsert_item_handler))
        .route("/api/items/:collection/:id", delete(delete_item_handler))
        .route("/api/shop/:id/archive", post(archive_handler))
        .route("/api/archive/:id/unarchive", post(unarchive_handler))
        .with_state(handlers)
}

async fn health_handler() -> Json<ApiResponse<&'static str>> {
    ApiHandlers::health().await
}

async fn get_content_handler(State(handlers): Handlers) -> Json<ApiResponse<ContentSnapshot>> {
    handlers.get_content().await
}

async fn replace_content_handler(
    State(handlers): Handlers,
    Json(snapshot): Json<ContentSnapshot>,
) -> Json<ApiResponse<WriteReport>> {
    handlers.replace_content(Json(snapshot)).await
}

async fn status_handler(State(handlers): Handlers) -> Json<ApiResponse<SyncStatus>> {
    handlers.status().await
}

async fn sync_handler(State(handlers): Handlers) -> Json<ApiResponse<SyncResult>> {
    handlers.force_sync().await
}

async fn flush_handler(State(handlers): Handlers) -> Json<ApiResponse<Option<WriteOutcome>>> {
    handlers.flush().await
}

async fn import_handler(
    State(handlers): Handlers,
    Json(snapshot): Json<ContentSnapshot>,
) -> Json<ApiResponse<WriteReport>> {
    handlers.import(Json(snapshot)).await
}

async fn reset_handler(State(handlers): Handlers) -> ApiResult<()> {
    handlers.reset().await
}

async fn upsert_item_handler(
    State(handlers): Handlers,
    Path(collection): Path<String>,
    Json(item): Json<Item>,
) -> ApiResult<ItemChange> {
    handlers.upsert_item(&collection, Json(item)).await
}

async fn delete_item_handler(
    State(handlers): Handlers,
    Path((collection, id)): Path<(String, u64)>,
) -> ApiResult<Item> {
    handlers.delete_item(&collection, id).await
}

async fn archive_handler(State(handlers): Handlers, Path(id): Path<u64>) -> ApiResult<()> {
    handlers.archive_item(id).await
}

async fn unarchive_handler(State(handlers): Handlers, Path(id): Path<u64>) -> ApiResult<()> {
    handlers.unarchive_item(id).await
}
