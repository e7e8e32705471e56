use serde::Serialize;

use crate::models::{AppSettings, Organization, UserProfile};

/// Initialization progress. Authentication is tracked separately by `user`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// Everything a UI needs to render the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user: Option<UserProfile>,
    pub organization: Option<Organization>,
    pub app_settings: Option<AppSettings>,
    pub wallet_balance: f64,
    /// Set when initialization had no cache and the backend refresh failed
    pub init_error: Option<String>,
    pub has_stored_credentials: bool,
    pub pin_login_available: bool,
    pub should_show_pin_setup: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.phase != SessionPhase::Ready
    }

    pub fn is_app_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }
}

/// Result of a login attempt that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated { offer_pin_setup: bool },
    /// The backend answered with a structured rejection
    Rejected { message: String },
    /// Username or password was empty; nothing was sent
    MissingCredentials,
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_loading_and_signed_out() {
        let snapshot = SessionSnapshot::default();
        assert!(snapshot.is_loading());
        assert!(!snapshot.is_app_ready());
        assert!(!snapshot.is_authenticated());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = SessionSnapshot {
            phase: SessionPhase::Ready,
            wallet_balance: 12.5,
            ..SessionSnapshot::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"], "ready");
        assert_eq!(json["walletBalance"], 12.5);
        assert_eq!(json["pinLoginAvailable"], false);
    }
}
