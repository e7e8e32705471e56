//! The backend contract the session manager depends on.
//!
//! `HttpApiGateway` is the production implementation. Tests and embedders
//! can provide their own as long as they honor the token ownership rules:
//! the gateway owns the bearer token, the manager only reads it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::models::{AppSettings, Organization, UserProfile};

/// Structured backend response.
///
/// `status == false` is a business-level rejection (for example invalid
/// credentials) and is not an error at the transport level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// The payload of a successful response, or the backend's message.
    pub fn into_result(self) -> Result<T, String> {
        match (self.status, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(self
                .message
                .unwrap_or_else(|| "Response contained no data".to_string())),
            (false, _) => Err(self
                .message
                .unwrap_or_else(|| "Request was rejected".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginData {
    pub profile: UserProfile,
    pub token: String,
}

/// Authenticated backend client.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// Prepare the client, restoring any persisted bearer token.
    async fn initialize(&self) -> Result<(), ApiError>;

    /// Exchange credentials for a profile and bearer token.
    async fn login(&self, username: &str, password: &str)
        -> Result<ApiEnvelope<LoginData>, ApiError>;

    /// Fetch the current user's profile with the held token.
    async fn get_profile(&self) -> Result<ApiEnvelope<UserProfile>, ApiError>;

    /// Look up a tenant by its resolved identifier.
    async fn get_organization(&self, identifier: &str)
        -> Result<ApiEnvelope<Organization>, ApiError>;

    async fn get_app_settings(&self) -> Result<ApiEnvelope<AppSettings>, ApiError>;

    /// End the server-side session and drop the held token.
    async fn logout(&self) -> Result<(), ApiError>;

    /// The bearer token currently held, if any.
    fn token(&self) -> Option<String>;

    fn set_app_id(&self, app_id: &str);
}
