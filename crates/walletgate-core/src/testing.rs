//! In-process fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::{ApiEnvelope, ApiError, ApiGateway, LoginData};
use crate::models::{AppSettings, Organization, UserProfile, Wallet};
use crate::session::SessionUi;

pub fn profile(username: &str, balance: f64) -> UserProfile {
    UserProfile {
        id: format!("u-{}", username),
        username: username.to_string(),
        first_name: Some("Ada".to_string()),
        last_name: None,
        email: None,
        phone: None,
        wallets: vec![
            Wallet {
                id: "w-savings".to_string(),
                currency: Some("NGN".to_string()),
                balance: 12.0,
                is_default: false,
            },
            Wallet {
                id: "w-main".to_string(),
                currency: Some("NGN".to_string()),
                balance,
                is_default: true,
            },
        ],
    }
}

pub fn organization(id: &str) -> Organization {
    Organization {
        id: id.to_string(),
        name: "Acme Pay".to_string(),
        identifier: Some("acme".to_string()),
        app_id: Some(format!("{}-app", id)),
        logo_url: None,
        primary_color: None,
        extra: HashMap::new(),
    }
}

pub fn settings() -> AppSettings {
    AppSettings {
        currency: Some("NGN".to_string()),
        ..Default::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Scriptable `ApiGateway`. Every call is recorded by name; individual
/// calls can be held until the test releases them.
pub struct FakeGateway {
    login: Mutex<Result<ApiEnvelope<LoginData>, ApiError>>,
    profile: Mutex<Result<ApiEnvelope<UserProfile>, ApiError>>,
    organization: Mutex<Result<ApiEnvelope<Organization>, ApiError>>,
    settings: Mutex<Result<ApiEnvelope<AppSettings>, ApiError>>,
    logout: Mutex<Result<(), ApiError>>,
    token: Mutex<Option<String>>,
    app_id: Mutex<Option<String>>,
    calls: Mutex<Vec<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            login: Mutex::new(Ok(ApiEnvelope::ok(LoginData {
                profile: profile("ada", 250.5),
                token: "token-1".to_string(),
            }))),
            profile: Mutex::new(Ok(ApiEnvelope::ok(profile("ada", 300.0)))),
            organization: Mutex::new(Ok(ApiEnvelope::ok(organization("org-1")))),
            settings: Mutex::new(Ok(ApiEnvelope::ok(settings()))),
            logout: Mutex::new(Ok(())),
            token: Mutex::new(None),
            app_id: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_login(&self, response: Result<ApiEnvelope<LoginData>, ApiError>) {
        *lock(&self.login) = response;
    }

    pub fn set_profile(&self, response: Result<ApiEnvelope<UserProfile>, ApiError>) {
        *lock(&self.profile) = response;
    }

    pub fn set_organization(&self, response: Result<ApiEnvelope<Organization>, ApiError>) {
        *lock(&self.organization) = response;
    }

    pub fn set_logout(&self, response: Result<(), ApiError>) {
        *lock(&self.logout) = response;
    }

    pub fn set_token(&self, token: Option<&str>) {
        *lock(&self.token) = token.map(str::to_string);
    }

    pub fn app_id(&self) -> Option<String> {
        lock(&self.app_id).clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == name).count()
    }

    /// Make the named call wait until the returned `Notify` is signalled.
    pub fn hold(&self, name: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.gates).insert(name, gate.clone());
        gate
    }

    async fn enter(&self, name: &'static str) {
        lock(&self.calls).push(name);
        let gate = lock(&self.gates).get(name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl ApiGateway for FakeGateway {
    async fn initialize(&self) -> Result<(), ApiError> {
        self.enter("initialize").await;
        Ok(())
    }

    async fn login(&self, _username: &str, _password: &str) -> Result<ApiEnvelope<LoginData>, ApiError> {
        self.enter("login").await;
        let response = lock(&self.login).clone();
        if let Ok(ApiEnvelope { data: Some(ref data), status: true, .. }) = response {
            self.set_token(Some(&data.token));
        }
        response
    }

    async fn get_profile(&self) -> Result<ApiEnvelope<UserProfile>, ApiError> {
        self.enter("get_profile").await;
        lock(&self.profile).clone()
    }

    async fn get_organization(&self, _identifier: &str) -> Result<ApiEnvelope<Organization>, ApiError> {
        self.enter("get_organization").await;
        lock(&self.organization).clone()
    }

    async fn get_app_settings(&self) -> Result<ApiEnvelope<AppSettings>, ApiError> {
        self.enter("get_app_settings").await;
        lock(&self.settings).clone()
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.set_token(None);
        self.enter("logout").await;
        lock(&self.logout).clone()
    }

    fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    fn set_app_id(&self, app_id: &str) {
        *lock(&self.app_id) = Some(app_id.to_string());
    }
}

/// `SessionUi` that counts what it was asked to do.
#[derive(Default)]
pub struct RecordingUi {
    pub expired_prompts: AtomicUsize,
    pub redirects: AtomicUsize,
}

impl RecordingUi {
    pub fn expired_prompts(&self) -> usize {
        self.expired_prompts.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionUi for RecordingUi {
    async fn session_expired(&self) {
        self.expired_prompts.fetch_add(1, Ordering::SeqCst);
    }

    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
