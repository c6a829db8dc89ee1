// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Maximum length of a local storage key
const MAX_KEY_LENGTH: usize = 128;

/// Maximum length of a database path (Firebase limits keys to 768 bytes)
const MAX_DATABASE_PATH_LENGTH: usize = 768;

/// Validate a local storage key before it becomes a file name
///
/// Keys map one-to-one onto files in the data directory, so only
/// alphanumerics, dash, underscore and dot are allowed, and a key may not
/// start with a dot or dash.
pub fn validate_storage_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(anyhow::anyhow!("Storage key cannot be empty"));
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(anyhow::anyhow!(
            "Storage key too long (max {} characters)",
            MAX_KEY_LENGTH
        ));
    }

    if key.starts_with('.') || key.starts_with('-') {
        return Err(anyhow::anyhow!("Storage key cannot start with '.' or '-'"));
    }

    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.'))
    {
        return Err(anyhow::anyhow!("Storage key contains invalid character {:?}", bad));
    }

    Ok(())
}

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Realtime Database keys cannot contain . $ # [ ] / or ASCII control characters
        Regex::new(r"^[^.$#\[\]/\x00-\x1F\x7F]+$").expect("static regex is valid")
    })
}

/// Normalize a Realtime Database document path such as `/content/`
///
/// Leading and trailing slashes are dropped and empty segments collapsed.
/// Returns the cleaned path, or an error if a segment uses a character the
/// database rejects.
pub fn normalize_database_path(path: &str) -> Result<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return Err(anyhow::anyhow!("Database path cannot be empty"));
    }

    for segment in &segments {
        if !segment_pattern().is_match(segment) {
            return Err(anyhow::anyhow!(
                "Database path segment {:?} contains a forbidden character",
                segment
            ));
        }
    }

    let normalized = segments.join("/");
    if normalized.len() > MAX_DATABASE_PATH_LENGTH {
        return Err(anyhow::anyhow!(
            "Database path too long (max {} bytes)",
            MAX_DATABASE_PATH_LENGTH
        ));
    }

    Ok(normalized)
}
