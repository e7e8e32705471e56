//! walletgate-core - session and idle-timeout security core for the
//! walletgate client.
//!
//! The crate is split into:
//! - `api`: backend gateway trait and its HTTP implementation
//! - `auth`: credential encryption, PIN hashing and keychain access
//! - `store`: key-value persistence for session state
//! - `idle`: the inactivity watchdog
//! - `session`: the authenticated-session state machine
//!
//! Front ends construct one `AuthSessionManager`, feed input events into
//! its idle timer and render its `SessionSnapshot`.

pub mod api;
pub mod auth;
pub mod config;
pub mod idle;
pub mod models;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiGateway, HttpApiGateway};
pub use config::{Config, SessionConfig};
pub use idle::{ActivityKind, AppLifecycle, HostEvent, IdleTimer};
pub use session::{AuthSessionManager, LoginOutcome, SessionError, SessionSnapshot};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
