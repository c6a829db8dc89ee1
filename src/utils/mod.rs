// SPDX-License-Identifier: GPL-3.0-only
pub mod path_sanitizer;
pub mod url_validator;

pub use path_sanitizer::{normalize_database_path, validate_storage_key};
pub use url_validator::validate_remote_url;
