// SPDX-License-Identifier: GPL-3.0-only

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage quota exceeded: {required} bytes required, {quota} bytes allowed")]
    QuotaExceeded { required: u64, quota: u64 },

    #[error("Invalid storage key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
}

/// Durable string key-value storage backing the local cache.
///
/// Calls are synchronous: a `set` that returns `Ok` is visible to the next
/// `get` from any caller.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
