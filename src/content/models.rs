// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::content::decode::{collection, lenient_timestamp, numeric_id};

/// The full synchronized document: every list the storefront renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    #[serde(default, deserialize_with = "collection")]
    pub shop: Vec<Item>,

    #[serde(default, deserialize_with = "collection")]
    pub archive: Vec<Item>,

    #[serde(default, deserialize_with = "collection")]
    pub gallery: Vec<Item>,

    #[serde(default, deserialize_with = "collection", skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,

    #[serde(default, deserialize_with = "collection", skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<Order>,

    /// Write tag of the session that last pushed this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_tag: Option<String>,

    /// Top-level keys this build does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default, deserialize_with = "numeric_id")]
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Ordered image list: data URLs or remote URLs
    #[serde(default, deserialize_with = "collection", skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Mirror of `images[0]` for readers that predate multi-image items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teepublic_link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tees_link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_by: Option<String>,

    /// Units on hand; `None` means stock is not tracked for this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default, deserialize_with = "numeric_id")]
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default, deserialize_with = "numeric_id")]
    pub id: u64,

    #[serde(default, deserialize_with = "collection")]
    pub items: Vec<OrderLine>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Customer and payment fields, owned by the checkout flow
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(default, deserialize_with = "numeric_id")]
    pub product_id: u64,

    #[serde(default)]
    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// The three item lists an admin can edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Shop,
    Archive,
    Gallery,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Shop => "shop",
            Collection::Archive => "archive",
            Collection::Gallery => "gallery",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shop" => Ok(Collection::Shop),
            "archive" => Ok(Collection::Archive),
            "gallery" => Ok(Collection::Gallery),
            other => Err(anyhow::anyhow!("Unknown collection: {}", other)),
        }
    }
}

impl ContentSnapshot {
    /// Decode a remote or cached JSON tree. `null` and undecodable payloads
    /// fall back to the empty shape.
    pub fn from_value_lossy(value: Value) -> Self {
        if value.is_null() {
            return Self::default();
        }

        match serde_json::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Content payload did not decode, using empty snapshot");
                Self::default()
            }
        }
    }

    pub fn from_json_lossy(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value_lossy(value),
            Err(e) => {
                warn!(error = %e, "Content JSON is corrupt, using empty snapshot");
                Self::default()
            }
        }
    }

    pub fn items(&self, collection: Collection) -> &[Item] {
        match collection {
            Collection::Shop => &self.shop,
            Collection::Archive => &self.archive,
            Collection::Gallery => &self.gallery,
        }
    }

    pub fn items_mut(&mut self, collection: Collection) -> &mut Vec<Item> {
        match collection {
            Collection::Shop => &mut self.shop,
            Collection::Archive => &mut self.archive,
            Collection::Gallery => &mut self.gallery,
        }
    }

    pub fn item_count(&self) -> usize {
        self.shop.len() + self.archive.len() + self.gallery.len()
    }

    /// Apply the write-time invariants to every item.
    pub fn normalize(&mut self, now: DateTime<Utc>) {
        for item in self
            .shop
            .iter_mut()
            .chain(self.archive.iter_mut())
            .chain(self.gallery.iter_mut())
        {
            item.normalize(now);
        }
    }

    pub fn normalized(mut self, now: DateTime<Utc>) -> Self {
        self.normalize(now);
        self
    }
}

impl Item {
    pub fn new(id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Keep `image` equal to `images[0]` and fill missing lifecycle stamps.
    pub fn normalize(&mut self, now: DateTime<Utc>) {
        if self.images.is_empty() {
            if let Some(image) = self.image.as_ref().filter(|s| !s.is_empty()) {
                self.images = vec![image.clone()];
            }
        } else {
            self.image = self.images.first().cloned();
        }

        self.created_at.get_or_insert(now);
        self.updated_at.get_or_insert(now);
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or_default()
    }
}
