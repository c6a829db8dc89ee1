// SPDX-License-Identifier: GPL-3.0-only
use anyhow::{Context, Result};
use url::Url;

/// Maximum allowed URL length
const MAX_URL_LENGTH: usize = 2048;

/// Validate a remote store URL from configuration
///
/// Checks:
/// - Only allows http/https schemes
/// - Requires a host
/// - Rejects embedded credentials (auth tokens belong in `database_auth`)
/// - Validates URL length
///
/// Loopback hosts are allowed so a local database emulator can be used.
pub fn validate_remote_url(url_str: &str) -> Result<Url> {
    if url_str.len() > MAX_URL_LENGTH {
        return Err(anyhow::anyhow!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH));
    }

    let url = Url::parse(url_str).context("Invalid URL format")?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(anyhow::anyhow!(
                "Invalid URL scheme: {} (only http and https are allowed)",
                scheme
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow::anyhow!("URL must have a host"));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(anyhow::anyhow!("URL must not embed credentials"));
    }

    Ok(url)
}
