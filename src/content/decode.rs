// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionShape<T> {
    List(Vec<Option<T>>),
    Keyed(BTreeMap<String, Option<T>>),
}

/// Decode a list that Firebase may hand back as `null`, a sparse array with
/// `null` holes, or an object keyed by array index.
pub fn collection<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let shape: Option<CollectionShape<T>> = Option::deserialize(deserializer)?;

    Ok(match shape {
        None => Vec::new(),
        Some(CollectionShape::List(items)) => items.into_iter().flatten().collect(),
        Some(CollectionShape::Keyed(entries)) => {
            let mut entries: Vec<(String, Option<T>)> = entries.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| {
                match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => a.cmp(b),
                }
            });
            entries.into_iter().filter_map(|(_, item)| item).collect()
        }
    })
}

/// Numeric identifiers are `Date.now()` values; older records sometimes carry
/// them as strings or floats.
pub fn numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Accepts RFC 3339 strings and millisecond epoch numbers; anything else
/// decodes as absent rather than failing the whole snapshot.
pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "collection")]
        items: Vec<u32>,
        #[serde(default, deserialize_with = "numeric_id")]
        id: u64,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_collection_null_and_missing() {
        let holder: Holder = serde_json::from_str(r#"{"items": null}"#).unwrap();
        assert!(holder.items.is_empty());

        let holder: Holder = serde_json::from_str("{}").unwrap();
        assert!(holder.items.is_empty());
    }

    #[test]
    fn test_collection_sparse_array() {
        let holder: Holder = serde_json::from_str(r#"{"items": [null, 4, null, 7]}"#).unwrap();
        assert_eq!(holder.items, vec![4, 7]);
    }

    #[test]
    fn test_collection_keyed_by_index() {
        let holder: Holder =
            serde_json::from_str(r#"{"items": {"10": 3, "2": 1, "3": 2}}"#).unwrap();
        assert_eq!(holder.items, vec![1, 2, 3]);
    }

    #[test]
    fn test_numeric_id_variants() {
        let holder: Holder = serde_json::from_str(r#"{"id": 1700000000000}"#).unwrap();
        assert_eq!(holder.id, 1_700_000_000_000);

        let holder: Holder = serde_json::from_str(r#"{"id": "1700000000001"}"#).unwrap();
        assert_eq!(holder.id, 1_700_000_000_001);

        let holder: Holder = serde_json::from_str(r#"{"id": 12.0}"#).unwrap();
        assert_eq!(holder.id, 12);

        let holder: Holder = serde_json::from_str(r#"{"id": true}"#).unwrap();
        assert_eq!(holder.id, 0);
    }

    #[test]
    fn test_lenient_timestamp() {
        let holder: Holder = serde_json::from_str(r#"{"at": "2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(holder.at.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let holder: Holder = serde_json::from_str(r#"{"at": 0}"#).unwrap();
        assert_eq!(holder.at.unwrap().timestamp(), 0);

        let holder: Holder = serde_json::from_str(r#"{"at": "unknown"}"#).unwrap();
        assert!(holder.at.is_none());
    }
}
