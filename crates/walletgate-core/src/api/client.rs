//! HTTP implementation of the `ApiGateway` contract.
//!
//! Requests carry the bearer token once logged in and an `X-App-Id`
//! header once the tenant is known. GET requests retry on 429 with
//! exponential backoff.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::gateway::{ApiEnvelope, ApiGateway, LoginData};
use super::ApiError;
use crate::auth::Keychain;
use crate::models::{AppSettings, Organization, UserProfile};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Header carrying the tenant application id
const APP_ID_HEADER: &str = "X-App-Id";

/// API client for the wallet backend.
pub struct HttpApiGateway {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    app_id: RwLock<Option<String>>,
    keychain: Option<Keychain>,
    initial_backoff_ms: u64,
}

impl HttpApiGateway {
    /// Create a client without token persistence.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            app_id: RwLock::new(None),
            keychain: None,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        })
    }

    /// Persist the bearer token in the OS keychain across launches.
    pub fn with_keychain(mut self, keychain: Keychain) -> Self {
        self.keychain = Some(keychain);
        self
    }

    #[cfg(test)]
    fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.initial_backoff_ms = backoff_ms;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request.header(header::ACCEPT, "application/json");
        if let Ok(guard) = self.token.read() {
            if let Some(ref token) = *guard {
                request = request.bearer_auth(token);
            }
        }
        if let Ok(guard) = self.app_id.read() {
            if let Some(ref app_id) = *guard {
                request = request.header(APP_ID_HEADER, app_id);
            }
        }
        request
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = self.initial_backoff_ms;

        loop {
            let response = self.authorize(self.client.get(&url)).send().await?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let response = Self::check_response(response).await?;
            return response.json().await.map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
            });
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl ApiGateway for HttpApiGateway {
    async fn initialize(&self) -> Result<(), ApiError> {
        let Some(ref keychain) = self.keychain else {
            return Ok(());
        };
        match keychain.load_token() {
            Ok(Some(token)) => {
                debug!("Restored bearer token from keychain");
                self.set_token(Some(token));
            }
            Ok(None) => debug!("No stored bearer token"),
            Err(e) => warn!(error = %e, "Failed to read bearer token from keychain"),
        }
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<ApiEnvelope<LoginData>, ApiError> {
        let body = serde_json::json!({
            "username": username,
            "password": password,
        });
        let envelope: ApiEnvelope<LoginData> = self.post("/auth/login", &body).await?;

        if let (true, Some(data)) = (envelope.status, envelope.data.as_ref()) {
            self.set_token(Some(data.token.clone()));
            if let Some(ref keychain) = self.keychain {
                if let Err(e) = keychain.store_token(&data.token) {
                    warn!(error = %e, "Failed to persist bearer token");
                }
            }
            info!("Authenticated with backend");
        }
        Ok(envelope)
    }

    async fn get_profile(&self) -> Result<ApiEnvelope<UserProfile>, ApiError> {
        self.get("/auth/profile").await
    }

    async fn get_organization(&self, identifier: &str) -> Result<ApiEnvelope<Organization>, ApiError> {
        let encoded: String = url::form_urlencoded::byte_serialize(identifier.as_bytes()).collect();
        self.get(&format!("/organizations/{}", encoded)).await
    }

    async fn get_app_settings(&self) -> Result<ApiEnvelope<AppSettings>, ApiError> {
        self.get("/settings").await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        // Drop the token locally first so a failed call cannot leave it behind
        let token = self.token.write().ok().and_then(|mut guard| guard.take());
        if let Some(ref keychain) = self.keychain {
            if let Err(e) = keychain.delete_token() {
                warn!(error = %e, "Failed to delete bearer token from keychain");
            }
        }

        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.url("/auth/logout"))
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    fn set_app_id(&self, app_id: &str) {
        if let Ok(mut guard) = self.app_id.write() {
            *guard = Some(app_id.to_string());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_OK: &str = r#"{
        "status": true,
        "data": {
            "token": "tok-123",
            "profile": {
                "id": "u1",
                "username": "ada",
                "wallets": [{"id": "w1", "balance": "2500.00", "isDefault": true}]
            }
        }
    }"#;

    #[tokio::test]
    async fn test_login_stores_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/login")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "username": "ada",
                "password": "hunter2"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LOGIN_OK)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        let envelope = gateway.login("ada", "hunter2").await.unwrap();

        assert!(envelope.status);
        assert_eq!(envelope.data.unwrap().profile.primary_balance(), 2500.0);
        assert_eq!(gateway.token().as_deref(), Some("tok-123"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_rejection_keeps_no_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(r#"{"status": false, "message": "Invalid credentials"}"#)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        let envelope = gateway.login("ada", "wrong").await.unwrap();

        assert!(!envelope.status);
        assert!(gateway.token().is_none());
    }

    #[tokio::test]
    async fn test_login_401_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        assert_eq!(gateway.login("ada", "x").await.unwrap_err(), ApiError::Unauthorized);
    }

    #[tokio::test]
    async fn test_authenticated_requests_carry_headers() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(LOGIN_OK)
            .create_async()
            .await;
        let profile = server
            .mock("GET", "/auth/profile")
            .match_header("authorization", "Bearer tok-123")
            .match_header("x-app-id", "acme-app")
            .with_status(200)
            .with_body(r#"{"status": true, "data": {"id": "u1", "username": "ada"}}"#)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        gateway.login("ada", "hunter2").await.unwrap();
        gateway.set_app_id("acme-app");

        let envelope = gateway.get_profile().await.unwrap();
        assert_eq!(envelope.data.unwrap().username, "ada");
        profile.assert_async().await;
    }

    #[tokio::test]
    async fn test_organization_identifier_is_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/organizations/acme%2Fpay")
            .with_status(200)
            .with_body(r#"{"status": true, "data": {"id": "1", "name": "Acme"}}"#)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        let org = gateway.get_organization("acme/pay").await.unwrap();
        assert_eq!(org.data.unwrap().name, "Acme");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limited_get_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/settings")
            .with_status(429)
            .expect((MAX_RATE_LIMIT_RETRIES + 1) as usize)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap().with_backoff_ms(1);
        assert_eq!(gateway.get_app_settings().await.unwrap_err(), ApiError::RateLimited);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/settings")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        assert!(matches!(
            gateway.get_app_settings().await.unwrap_err(),
            ApiError::ServerError(body) if body == "maintenance"
        ));
    }

    #[tokio::test]
    async fn test_logout_clears_token_even_when_call_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(LOGIN_OK)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/logout")
            .with_status(500)
            .create_async()
            .await;

        let gateway = HttpApiGateway::new(server.url()).unwrap();
        gateway.login("ada", "hunter2").await.unwrap();
        assert!(gateway.logout().await.is_err());
        assert!(gateway.token().is_none());
    }

    #[tokio::test]
    async fn test_logout_without_token_skips_network() {
        let gateway = HttpApiGateway::new("http://127.0.0.1:9").unwrap();
        gateway.logout().await.unwrap();
    }
}
