//! Backend access for the session core.
//!
//! This module provides the `ApiGateway` trait the session manager calls,
//! and `HttpApiGateway`, its `reqwest` implementation. Responses use a
//! `{status, message, data}` envelope; HTTP failures map to `ApiError`.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::HttpApiGateway;
pub use error::ApiError;
pub use gateway::{ApiEnvelope, ApiGateway, LoginData};
