//! Tenant configuration models.
//!
//! Unknown fields are kept so branding or feature flags added on the
//! backend survive a round trip through the local cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: HashMap<String, Value>,
}

impl Organization {
    /// Application id sent to the backend with every request.
    /// Falls back to the organization id when no dedicated app id is set.
    pub fn effective_app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub idle_timeout_minutes: Option<u64>,
    #[serde(default)]
    pub pin_login_enabled: Option<bool>,
    #[serde(default)]
    pub support_email: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: HashMap<String, Value>,
}

impl AppSettings {
    /// PIN login is on unless the tenant explicitly disables it.
    pub fn allows_pin_login(&self) -> bool {
        self.pin_login_enabled.unwrap_or(true)
    }
}
