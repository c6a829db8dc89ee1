// SPDX-License-Identifier: GPL-3.0-only
pub mod traits;
pub mod file;
pub mod memory;
pub mod local;

pub use traits::{KeyValueStore, StorageError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use local::LocalCache;
