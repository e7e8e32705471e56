//! Authenticated-session lifecycle.
//!
//! This module provides `AuthSessionManager`, which owns initialization,
//! login, logout, profile refresh, the PIN-unlock shortcut and idle
//! logout, together with:
//! - `SessionSnapshot`: the read-only view published to UI callers
//! - `SessionError`: user-presentable failures
//! - `TenantKey`: tenant resolution from the launch URL
//! - `SessionUi`: the prompts and navigation the manager drives

pub mod error;
pub mod manager;
pub mod state;
pub mod tenant;
pub mod ui;

pub use error::SessionError;
pub use manager::AuthSessionManager;
pub use state::{LoginOutcome, SessionPhase, SessionSnapshot};
pub use tenant::TenantKey;
pub use ui::{HeadlessUi, SessionUi};
