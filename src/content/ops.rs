// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::content::models::{Collection, ContentSnapshot, Item};

/// Whether an upsert replaced an existing entry or appended a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upsert {
    Inserted,
    Updated,
}

impl ContentSnapshot {
    pub fn find_item(&self, collection: Collection, id: u64) -> Option<&Item> {
        self.items(collection).iter().find(|item| item.id == id)
    }

    /// Insert or replace an item matched by id. An update keeps the original
    /// `createdAt`; both paths refresh `updatedAt`.
    pub fn upsert_item(&mut self, collection: Collection, mut item: Item, now: DateTime<Utc>) -> Upsert {
        item.updated_at = Some(now);

        let items = self.items_mut(collection);
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => {
                item.created_at = existing.created_at.or(item.created_at);
                item.normalize(now);
                *existing = item;
                debug!(collection = %collection, "Updated item");
                Upsert::Updated
            }
            None => {
                if item.id == 0 {
                    item.id = now.timestamp_millis().max(0) as u64;
                }
                item.normalize(now);
                items.push(item);
                debug!(collection = %collection, "Inserted item");
                Upsert::Inserted
            }
        }
    }

    pub fn remove_item(&mut self, collection: Collection, id: u64) -> Option<Item> {
        let items = self.items_mut(collection);
        let position = items.iter().position(|item| item.id == id)?;
        Some(items.remove(position))
    }

    /// Move a shop item into the archive, stamping `archivedAt`.
    pub fn archive_shop_item(&mut self, id: u64, now: DateTime<Utc>) -> bool {
        let Some(mut item) = self.remove_item(Collection::Shop, id) else {
            return false;
        };

        item.archived_at = Some(now);
        self.archive.push(item);
        info!(item_id = id, "Archived shop item");
        true
    }

    /// Return an archived item to the shop, clearing `archivedAt`.
    pub fn unarchive_item(&mut self, id: u64) -> bool {
        let Some(mut item) = self.remove_item(Collection::Archive, id) else {
            return false;
        };

        item.archived_at = None;
        self.shop.push(item);
        info!(item_id = id, "Unarchived item");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn shop_item(id: u64, name: &str) -> Item {
        Item {
            id,
            name: Some(name.to_string()),
            price: Some(20.0),
            images: vec![format!("{}.png", name)],
            ..Item::default()
        }
    }

    #[test]
    fn test_upsert_inserts_new_item() {
        let mut snapshot = ContentSnapshot::default();
        let result = snapshot.upsert_item(Collection::Shop, shop_item(1, "tee"), at(10));

        assert_eq!(result, Upsert::Inserted);
        assert_eq!(snapshot.shop.len(), 1);
        assert_eq!(snapshot.shop[0].image.as_deref(), Some("tee.png"));
        assert_eq!(snapshot.shop[0].created_at, Some(at(10)));
    }

    #[test]
    fn test_upsert_assigns_timestamp_id() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.upsert_item(Collection::Gallery, Item::default(), at(10));
        assert_eq!(snapshot.gallery[0].id, at(10).timestamp_millis() as u64);
    }

    #[test]
    fn test_upsert_updates_and_keeps_created_at() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.upsert_item(Collection::Shop, shop_item(1, "tee"), at(10));

        let mut edited = shop_item(1, "tee-v2");
        edited.created_at = None;
        let result = snapshot.upsert_item(Collection::Shop, edited, at(11));

        assert_eq!(result, Upsert::Updated);
        assert_eq!(snapshot.shop.len(), 1);
        assert_eq!(snapshot.shop[0].display_name(), "tee-v2");
        assert_eq!(snapshot.shop[0].created_at, Some(at(10)));
        assert_eq!(snapshot.shop[0].updated_at, Some(at(11)));
    }

    #[test]
    fn test_remove_item() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.upsert_item(Collection::Shop, shop_item(1, "a"), at(10));
        snapshot.upsert_item(Collection::Shop, shop_item(2, "b"), at(10));

        let removed = snapshot.remove_item(Collection::Shop, 1).unwrap();
        assert_eq!(removed.display_name(), "a");
        assert_eq!(snapshot.shop.len(), 1);
        assert!(snapshot.remove_item(Collection::Shop, 1).is_none());
    }

    #[test]
    fn test_archive_and_unarchive() {
        let mut snapshot = ContentSnapshot::default();
        snapshot.upsert_item(Collection::Shop, shop_item(7, "hoodie"), at(10));

        assert!(snapshot.archive_shop_item(7, at(12)));
        assert!(snapshot.shop.is_empty());
        assert_eq!(snapshot.archive[0].archived_at, Some(at(12)));
        assert!(snapshot.find_item(Collection::Archive, 7).is_some());

        assert!(snapshot.unarchive_item(7));
        assert!(snapshot.archive.is_empty());
        assert_eq!(snapshot.shop[0].archived_at, None);
        assert_eq!(snapshot.shop[0].created_at, Some(at(10)));
    }

    #[test]
    fn test_archive_missing_item() {
        let mut snapshot = ContentSnapshot::default();
        assert!(!snapshot.archive_shop_item(42, at(10)));
        assert!(!snapshot.unarchive_item(42));
    }
}
