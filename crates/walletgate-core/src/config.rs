//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, tenant, idle timeout and the last used
//! username. Environment variables override the file.
//!
//! Configuration is stored at `~/.config/walletgate/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::CREDENTIAL_TTL_DAYS;
use crate::session::TenantKey;

/// Application name used for config directory paths
const APP_NAME: &str = "walletgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default backend base URL
const DEFAULT_API_BASE_URL: &str = "https://api.walletgate.app/v1";

/// Default idle timeout before an authenticated session is ended
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5 * 60;

const ENV_API_URL: &str = "WALLETGATE_API_URL";
const ENV_TENANT_URL: &str = "WALLETGATE_TENANT_URL";
const ENV_IDLE_TIMEOUT: &str = "WALLETGATE_IDLE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// URL the app was opened from; the tenant is resolved from it
    pub tenant_url: Option<String>,
    /// Explicit tenant identifier, takes precedence over `tenant_url`
    pub tenant: Option<String>,
    pub idle_timeout_secs: u64,
    pub credential_ttl_days: i64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            tenant_url: None,
            tenant: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            credential_ttl_days: CREDENTIAL_TTL_DAYS,
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when missing) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(url) = lookup(ENV_TENANT_URL).filter(|v| !v.trim().is_empty()) {
            self.tenant_url = Some(url.trim().to_string());
        }
        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.idle_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_IDLE_TIMEOUT),
            }
        }
    }

    /// Resolve the tenant: explicit identifier first, then the tenant URL.
    pub fn tenant_key(&self) -> Option<TenantKey> {
        if let Some(key) = self.tenant.as_deref().and_then(TenantKey::new) {
            return Some(key);
        }
        let url = self.tenant_url.as_deref()?;
        match TenantKey::from_url_str(url) {
            Ok(key) => key,
            Err(e) => {
                warn!(url, error = %e, "Could not resolve tenant from URL");
                None
            }
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs.max(1)),
            credential_ttl: chrono::Duration::days(self.credential_ttl_days.max(1)),
            tenant: self.tenant_key(),
        }
    }
}

/// Settings the session manager runs with.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub credential_ttl: chrono::Duration,
    pub tenant: Option<TenantKey>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            credential_ttl: chrono::Duration::days(CREDENTIAL_TTL_DAYS),
            tenant: None,
        }
    }
}
