//! Data models for the walletgate session core.
//!
//! This module contains the wire and domain types the session manager
//! reads from the backend and keeps in its snapshot:
//!
//! - `UserProfile`, `Wallet`: authenticated identity and currency balances
//! - `Organization`, `AppSettings`: tenant configuration cached across launches

pub mod organization;
pub mod user;

pub use organization::{AppSettings, Organization};
pub use user::{UserProfile, Wallet};
