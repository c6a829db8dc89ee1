// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::remote::BackendKind;
use crate::sync::SyncSettings;
use crate::utils::{normalize_database_path, validate_remote_url, validate_storage_key};

const ENV_PREFIX: &str = "STOREFRONT_SYNC_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the local cache files
    pub data_dir: PathBuf,

    /// Prefix of the local storage keys (`<namespace>_admin_data`)
    pub cache_namespace: String,

    /// Byte quota for the local cache; unlimited when unset
    pub storage_quota_bytes: Option<u64>,

    /// Which remote adapter to use: "push" or "pull"
    pub backend: BackendKind,

    /// Realtime Database root URL (push backend)
    pub database_url: Option<String>,

    /// Document path inside the database
    pub database_path: String,

    /// Database secret or ID token sent as `?auth=`
    pub database_auth: Option<String>,

    /// URL of the published content file (pull backend)
    pub static_content_url: Option<String>,

    /// Debounce window for outbound writes
    pub debounce_ms: u64,

    /// Wait after an outbound write before listening again
    pub grace_delay_ms: u64,

    /// Upper bound on one remote save; unbounded when unset
    pub save_timeout_secs: Option<u64>,

    /// How long `init` waits for the first remote change
    pub initial_sync_timeout_secs: u64,

    /// Cache age after which it counts as outdated
    pub stale_after_secs: u64,

    /// How often the daemon checks for staleness
    pub staleness_check_secs: u64,

    /// Local API bind address (e.g., "127.0.0.1:8080")
    pub local_api_bind: SocketAddr,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var(format!("{}CONFIG", ENV_PREFIX))
            .unwrap_or_else(|_| "config.toml".to_string());

        let mut config: Config = if std::path::Path::new(&config_path).exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path))?;
            toml::from_str(&contents).with_context(|| format!("Failed to parse {}", config_path))?
        } else {
            // Use default configuration
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Some(val) = env_var("CACHE_NAMESPACE") {
            self.cache_namespace = val;
        }
        if let Some(val) = env_var("STORAGE_QUOTA_BYTES") {
            self.storage_quota_bytes = Some(val.parse()?);
        }
        if let Some(val) = env_var("BACKEND") {
            self.backend = val.parse()?;
        }
        if let Some(val) = env_var("DATABASE_URL") {
            self.database_url = Some(val);
        }
        if let Some(val) = env_var("DATABASE_PATH") {
            self.database_path = val;
        }
        if let Some(val) = env_var("DATABASE_AUTH") {
            self.database_auth = Some(val);
        }
        if let Some(val) = env_var("STATIC_CONTENT_URL") {
            self.static_content_url = Some(val);
        }
        if let Some(val) = env_var("DEBOUNCE_MS") {
            self.debounce_ms = val.parse()?;
        }
        if let Some(val) = env_var("GRACE_DELAY_MS") {
            self.grace_delay_ms = val.parse()?;
        }
        if let Some(val) = env_var("SAVE_TIMEOUT_SECS") {
            self.save_timeout_secs = Some(val.parse()?);
        }
        if let Some(val) = env_var("INITIAL_SYNC_TIMEOUT_SECS") {
            self.initial_sync_timeout_secs = val.parse()?;
        }
        if let Some(val) = env_var("STALE_AFTER_SECS") {
            self.stale_after_secs = val.parse()?;
        }
        if let Some(val) = env_var("STALENESS_CHECK_SECS") {
            self.staleness_check_secs = val.parse()?;
        }
        if let Some(val) = env_var("LOCAL_API_BIND") {
            self.local_api_bind = SocketAddr::from_str(&val)?;
        }
        if let Some(val) = env_var("LOG_LEVEL") {
            self.log_level = val;
        }
        if let Some(val) = env_var("LOG_JSON") {
            self.log_json = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Check that the selected backend has what it needs
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_storage_key(&format!("{}_admin_data", self.cache_namespace))
            .context("Invalid cache_namespace")?;

        match self.backend {
            BackendKind::Push => {
                let url = self
                    .database_url
                    .as_deref()
                    .context("database_url is required when backend = \"push\"")?;
                validate_remote_url(url).context("Invalid database_url")?;
                normalize_database_path(&self.database_path).context("Invalid database_path")?;
            }
            BackendKind::Pull => {
                let url = self
                    .static_content_url
                    .as_deref()
                    .context("static_content_url is required when backend = \"pull\"")?;
                validate_remote_url(url).context("Invalid static_content_url")?;
            }
        }

        if self.staleness_check_secs == 0 {
            return Err(anyhow::anyhow!("staleness_check_secs must be greater than zero"));
        }

        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            grace_delay: Duration::from_millis(self.grace_delay_ms),
            save_timeout: self.save_timeout_secs.map(Duration::from_secs),
            initial_sync_timeout: Duration::from_secs(self.initial_sync_timeout_secs),
            stale_after: Duration::from_secs(self.stale_after_secs),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_namespace: String::from("storefront"),
            storage_quota_bytes: Some(5 * 1024 * 1024), // browser localStorage budget
            backend: BackendKind::Push,
            database_url: None,
            database_path: String::from("content"),
            database_auth: None,
            static_content_url: None,
            debounce_ms: 2000,
            grace_delay_ms: 500,
            save_timeout_secs: None,
            initial_sync_timeout_secs: 10,
            stale_after_secs: 3600, // 1 hour
            staleness_check_secs: 300, // 5 minutes
            local_api_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: String::from("info"),
            log_json: false,
        }
    }
}
