// SPDX-License-Identifier: GPL-3.0-only
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::content::{Collection, ContentSnapshot, Item, Upsert};
use crate::sync::{SyncCoordinator, SyncStatus, WriteOutcome, WriteReport};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn failure(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::<()>::error(message.into())))
}

fn parse_collection(raw: &str) -> Result<Collection, ApiError> {
    raw.parse()
        .map_err(|e: anyhow::Error| failure(StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Debug, Serialize)]
pub struct ItemChange {
    pub change: Upsert,
    pub item: Item,
    pub persisted: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncResult {
    pub synced: bool,
    pub status: SyncStatus,
}

pub struct ApiHandlers {
    coordinator: SyncCoordinator,
    /// Serializes read-modify-write edits of the cached snapshot
    edit_lock: Mutex<()>,
}

impl ApiHandlers {
    pub fn new(coordinator: SyncCoordinator) -> Self {
        Self {
            coordinator,
            edit_lock: Mutex::new(()),
        }
    }

    /// Load, edit and save the snapshot as one step. Returns the closure's
    /// result and whether the cache accepted the save; nothing is saved when
    /// the closure fails.
    fn edit<R>(
        &self,
        f: impl FnOnce(&mut ContentSnapshot) -> Result<R, ApiError>,
    ) -> Result<(R, bool), ApiError> {
        let _guard = self.edit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = self.coordinator.load();
        let result = f(&mut snapshot)?;
        let persisted = self.coordinator.save(snapshot);
        Ok((result, persisted))
    }
}

impl ApiHandlers {
    pub async fn health() -> Json<ApiResponse<&'static str>> {
        Json(ApiResponse::success("ok"))
    }

    pub async fn get_content(&self) -> Json<ApiResponse<ContentSnapshot>> {
        Json(ApiResponse::success(self.coordinator.load()))
    }

    pub async fn replace_content(&self, Json(snapshot): Json<ContentSnapshot>) -> Json<ApiResponse<WriteReport>> {
        let persisted = {
            let _guard = self.edit_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.coordinator.save(snapshot)
        };
        Json(ApiResponse::success(WriteReport { persisted, remote: None }))
    }

    pub async fn status(&self) -> Json<ApiResponse<SyncStatus>> {
        Json(ApiResponse::success(self.coordinator.status()))
    }

    pub async fn force_sync(&self) -> Json<ApiResponse<SyncResult>> {
        let synced = self.coordinator.force_sync().await;
        if !synced {
            warn!("Manual sync failed, serving cached data");
        }
        Json(ApiResponse::success(SyncResult {
            synced,
            status: self.coordinator.status(),
        }))
    }

    pub async fn flush(&self) -> Json<ApiResponse<Option<WriteOutcome>>> {
        Json(ApiResponse::success(self.coordinator.flush().await))
    }

    pub async fn import(&self, Json(snapshot): Json<ContentSnapshot>) -> Json<ApiResponse<WriteReport>> {
        info!(items = snapshot.item_count(), "Import request received");
        Json(ApiResponse::success(self.coordinator.import_snapshot(snapshot).await))
    }

    pub async fn reset(&self) -> ApiResult<()> {
        let cleared = {
            let _guard = self.edit_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.coordinator.reset()
        };

        if cleared {
            Ok(Json(ApiResponse::success(())))
        } else {
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear local cache"))
        }
    }

    pub async fn upsert_item(&self, collection: &str, Json(item): Json<Item>) -> ApiResult<ItemChange> {
        let collection = parse_collection(collection)?;

        let ((change, item), persisted) = self.edit(|snapshot| {
            let id = item.id;
            let change = snapshot.upsert_item(collection, item, Utc::now());
            // A zero id was replaced by a fresh one, which is the last entry
            let stored = match id {
                0 => snapshot.items(collection).last(),
                id => snapshot.find_item(collection, id),
            };
            stored
                .cloned()
                .map(|item| (change, item))
                .ok_or_else(|| failure(StatusCode::INTERNAL_SERVER_ERROR, "Item vanished after upsert"))
        })?;

        info!(collection = %collection, item_id = item.id, change = ?change, "Item saved");
        Ok(Json(ApiResponse::success(ItemChange { change, item, persisted })))
    }

    pub async fn delete_item(&self, collection: &str, id: u64) -> ApiResult<Item> {
        let collection = parse_collection(collection)?;

        let (item, _) = self.edit(|snapshot| {
            snapshot
                .remove_item(collection, id)
                .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("No item {} in {}", id, collection)))
        })?;

        info!(collection = %collection, item_id = id, "Item deleted");
        Ok(Json(ApiResponse::success(item)))
    }

    pub async fn archive_item(&self, id: u64) -> ApiResult<()> {
        self.edit(|snapshot| {
            snapshot
                .archive_shop_item(id, Utc::now())
                .then_some(())
                .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("No shop item {}", id)))
        })?;

        Ok(Json(ApiResponse::success(())))
    }

    pub async fn unarchive_item(&self, id: u64) -> ApiResult<()> {
        self.edit(|snapshot| {
            snapshot
                .unarchive_item(id)
                .then_some(())
                .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("No archived item {}", id)))
        })?;

        Ok(Json(ApiResponse::success(())))
    }
}
