//! The authenticated-session state machine.
//!
//! `AuthSessionManager` is the single source of truth for whether a live
//! session exists. In-memory state is published through a `watch` channel
//! and only ever modified synchronously, so no reader sees a half-applied
//! operation:
//!
//! - logout clears memory before any I/O
//! - login, profile refresh and balance updates write memory as the last
//!   step, after the persisted write has resolved
//! - wallet writers serialize through one async lock
//! - a session epoch, bumped at login and logout, keeps a late profile
//!   refresh from resurrecting a session that was just ended

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use super::state::{LoginOutcome, SessionPhase, SessionSnapshot};
use super::ui::SessionUi;
use crate::api::ApiGateway;
use crate::auth::{CredentialCipher, CredentialVault, PinHasher};
use crate::config::SessionConfig;
use crate::idle::{idle_callback, IdleTimer};
use crate::models::{AppSettings, Organization, UserProfile};
use crate::store::{keys, SessionStore, SessionStoreExt};

/// Consecutive wrong PINs before PIN login is disabled.
const MAX_PIN_ATTEMPTS: u32 = 5;

/// Credentials from the last password login, kept only until the user
/// accepts or dismisses the PIN setup offer.
#[derive(Clone)]
struct PendingCredentials {
    username: String,
    password: String,
}

pub struct AuthSessionManager {
    gateway: Arc<dyn ApiGateway>,
    store: Arc<dyn SessionStore>,
    vault: CredentialVault,
    ui: Arc<dyn SessionUi>,
    config: SessionConfig,
    state: watch::Sender<SessionSnapshot>,
    idle: IdleTimer,
    epoch: AtomicU64,
    wallet_lock: tokio::sync::Mutex<()>,
    pending_pin: Mutex<Option<PendingCredentials>>,
    background_refresh: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<AuthSessionManager>,
}

impl AuthSessionManager {
    /// Build the manager. The idle timer holds a weak reference back to it
    /// and logs out when it fires.
    pub fn new(
        gateway: Arc<dyn ApiGateway>,
        store: Arc<dyn SessionStore>,
        cipher: CredentialCipher,
        ui: Arc<dyn SessionUi>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_idle = {
                let weak = weak.clone();
                idle_callback(move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            info!("Session idle, logging out");
                            manager.logout().await;
                        }
                    }
                })
            };

            let (state, _) = watch::channel(SessionSnapshot::default());
            let vault = CredentialVault::new(store.clone(), cipher, config.credential_ttl);

            Self {
                gateway,
                store,
                vault,
                ui,
                idle: IdleTimer::new(config.idle_timeout, on_idle),
                config,
                state,
                epoch: AtomicU64::new(0),
                wallet_lock: tokio::sync::Mutex::new(()),
                pending_pin: Mutex::new(None),
                background_refresh: Mutex::new(None),
                self_ref: weak.clone(),
            }
        })
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receive a new snapshot every time session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn wallet_balance(&self) -> f64 {
        self.state.borrow().wallet_balance
    }

    /// The idle timer, for hosts to feed activity and lifecycle events into.
    pub fn idle_timer(&self) -> &IdleTimer {
        &self.idle
    }

    fn update(&self, modify: impl FnOnce(&mut SessionSnapshot)) {
        self.state.send_modify(modify);
    }

    fn set_pending(&self, pending: Option<PendingCredentials>) {
        *self.pending_pin.lock().unwrap_or_else(|p| p.into_inner()) = pending;
    }

    fn pending(&self) -> Option<PendingCredentials> {
        self.pending_pin.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Arm the idle timer for an authenticated session.
    fn touch(&self) {
        self.idle.set_enabled(true);
        self.idle.reset();
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Bring the manager to `Ready`, serving cached tenant data immediately
    /// when available. Never fails; a failed synchronous refresh is reported
    /// through `init_error`.
    pub async fn initialize(&self) {
        info!("Initializing session");
        self.update(|s| {
            s.phase = SessionPhase::Initializing;
            s.init_error = None;
        });

        if let Err(e) = self.gateway.initialize().await {
            warn!(error = %e, "Failed to prepare API gateway");
        }

        let organization = match self.store.load_organization().await {
            Ok(cached) => cached.map(|c| {
                debug!(age = %c.age_display(), "Loaded cached organization");
                c.data
            }),
            Err(e) => {
                warn!(error = %e, "Failed to load cached organization");
                None
            }
        };
        let settings = match self.store.load_app_settings().await {
            Ok(cached) => cached.map(|c| c.data),
            Err(e) => {
                warn!(error = %e, "Failed to load cached settings");
                None
            }
        };
        let balance = match self.store.load_wallet_balance().await {
            Ok(balance) => balance.unwrap_or(0.0),
            Err(e) => {
                warn!(error = %e, "Failed to load cached wallet balance");
                0.0
            }
        };

        if let Some(ref org) = organization {
            self.gateway.set_app_id(org.effective_app_id());
        }
        if let Some(ref settings) = settings {
            self.apply_settings(settings);
        }
        let has_cache = organization.is_some() && settings.is_some();
        self.update(|s| {
            s.organization = organization;
            s.app_settings = settings;
            s.wallet_balance = balance;
        });

        self.refresh_pin_flags().await;

        if has_cache {
            self.mark_ready(None);
            self.spawn_background_refresh();
        } else {
            let init_error = match self.refresh_tenant().await {
                Ok(()) => None,
                Err(e) => {
                    error!(error = %e, "Initial tenant refresh failed");
                    Some(e.to_string())
                }
            };
            self.mark_ready(init_error);
        }

        self.restore_session().await;
    }

    fn mark_ready(&self, init_error: Option<String>) {
        self.update(|s| {
            s.phase = SessionPhase::Ready;
            s.init_error = init_error;
        });
        info!("Session ready");
    }

    fn spawn_background_refresh(&self) {
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            // Cached data stays authoritative when this fails
            if let Err(e) = manager.refresh_tenant().await {
                debug!(error = %e, "Background tenant refresh failed");
            }
        });
        let previous = self
            .background_refresh
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Wait for the background refresh started by `initialize`, if any.
    pub async fn background_refresh_finished(&self) {
        let handle = self
            .background_refresh
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Fetch organization and settings, persisting and publishing each.
    pub async fn refresh_tenant(&self) -> Result<(), SessionError> {
        let tenant = self.config.tenant.as_ref().ok_or(SessionError::TenantUnknown)?;

        let organization: Organization = self
            .gateway
            .get_organization(tenant.as_str())
            .await?
            .into_result()
            .map_err(SessionError::Rejected)?;
        self.gateway.set_app_id(organization.effective_app_id());
        if let Err(e) = self.store.save_organization(&organization).await {
            warn!(error = %e, "Failed to cache organization");
        }
        self.update(|s| s.organization = Some(organization));

        let settings: AppSettings = self
            .gateway
            .get_app_settings()
            .await?
            .into_result()
            .map_err(SessionError::Rejected)?;
        if let Err(e) = self.store.save_app_settings(&settings).await {
            warn!(error = %e, "Failed to cache settings");
        }
        self.apply_settings(&settings);
        self.update(|s| s.app_settings = Some(settings));

        debug!(tenant = %tenant, "Tenant refreshed");
        Ok(())
    }

    fn apply_settings(&self, settings: &AppSettings) {
        if let Some(minutes) = settings.idle_timeout_minutes.filter(|m| *m > 0) {
            self.idle.set_timeout(Duration::from_secs(minutes * 60));
        }
    }

    async fn refresh_pin_flags(&self) {
        let has_stored = match self.vault.has_credentials().await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Failed to look up stored credentials");
                false
            }
        };
        let pin_enabled = match self.vault.pin_enabled().await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(error = %e, "Failed to read PIN state");
                false
            }
        };
        self.update(|s| {
            let tenant_allows = s
                .app_settings
                .as_ref()
                .map(AppSettings::allows_pin_login)
                .unwrap_or(true);
            s.has_stored_credentials = has_stored;
            s.pin_login_available = has_stored && pin_enabled && tenant_allows;
        });
    }

    /// On relaunch the gateway may hold a token without a loaded user.
    /// Try one profile refresh; on failure send the user to login.
    pub async fn restore_session(&self) {
        if self.gateway.token().is_none() || self.is_authenticated() {
            return;
        }
        info!("Token present without profile, restoring session");
        match self.refresh_profile().await {
            Ok(_) => info!("Session restored"),
            // Already prompted, logged out and redirected
            Err(SessionError::SessionExpired) => {}
            Err(e) => {
                warn!(error = %e, "Failed to restore session");
                self.ui.redirect_to_login();
            }
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Exchange credentials for a session.
    ///
    /// Structured rejections come back as `LoginOutcome::Rejected`;
    /// transport and server faults as a classified `SessionError`.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        if username.is_empty() || password.is_empty() {
            return Ok(LoginOutcome::MissingCredentials);
        }

        let envelope = match self.gateway.login(username, password).await {
            Ok(envelope) => envelope,
            Err(e) => {
                let classified = SessionError::from_login_error(e);
                warn!(error = %classified, "Login failed");
                return Err(classified);
            }
        };
        let data = match envelope.into_result() {
            Ok(data) => data,
            Err(message) => {
                info!(username, "Login rejected");
                return Ok(LoginOutcome::Rejected { message });
            }
        };

        let has_stored = match self.vault.has_credentials().await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Failed to look up stored credentials");
                false
            }
        };
        let offer_pin_setup = !has_stored;
        let profile = data.profile;
        let balance = profile.primary_balance();

        {
            let _wallet = self.wallet_lock.lock().await;
            if let Err(e) = self.store.save_wallet_balance(balance).await {
                warn!(error = %e, "Failed to persist wallet balance");
            }
            self.set_pending(offer_pin_setup.then(|| PendingCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }));
            self.update(|s| {
                self.epoch.fetch_add(1, Ordering::SeqCst);
                s.user = Some(profile);
                s.wallet_balance = balance;
                s.has_stored_credentials = has_stored;
                s.should_show_pin_setup = offer_pin_setup;
            });
        }

        self.touch();
        info!(username, "Login successful");
        Ok(LoginOutcome::Authenticated { offer_pin_setup })
    }

    /// End the session. Local state is cleared first; every later step is
    /// best-effort, and the redirect always happens unless a newer login
    /// took over while the backend call was in flight.
    pub async fn logout(&self) {
        info!("Logging out");
        self.idle.set_enabled(false);
        self.set_pending(None);
        let mut epoch = 0;
        self.update(|s| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            s.user = None;
            s.wallet_balance = 0.0;
            s.should_show_pin_setup = false;
        });

        if let Err(e) = self.gateway.logout().await {
            warn!(error = %e, "Backend logout failed");
        }

        {
            // Logins bump the epoch under this lock, so it is stable below
            let _wallet = self.wallet_lock.lock().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                info!("Logout superseded by a newer session change");
                return;
            }

            for key in keys::SESSION_KEYS {
                if let Err(e) = self.store.remove_item(key).await {
                    warn!(key, error = %e, "Failed to remove session data");
                }
            }
            let failures = self.vault.clear_all().await;
            if failures > 0 {
                warn!(failures, "Some PIN records could not be removed");
            }

            // A balance update may have landed while the backend call ran
            self.update(|s| {
                s.wallet_balance = 0.0;
                s.has_stored_credentials = false;
                s.pin_login_available = false;
            });
        }

        self.ui.redirect_to_login();
    }

    /// Reload the user's profile and wallet with the held token.
    pub async fn refresh_profile(&self) -> Result<UserProfile, SessionError> {
        if self.gateway.token().is_none() {
            return Err(SessionError::NoToken);
        }
        let epoch = self.epoch.load(Ordering::SeqCst);

        let profile = match self.gateway.get_profile().await {
            Ok(envelope) => envelope.into_result().map_err(SessionError::Rejected)?,
            Err(e) if e.is_session_expired() => {
                warn!("Session expired during profile refresh");
                self.ui.session_expired().await;
                self.logout().await;
                return Err(SessionError::SessionExpired);
            }
            Err(e) => return Err(e.into()),
        };

        let balance = profile.primary_balance();
        let applied = {
            let _wallet = self.wallet_lock.lock().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                false
            } else {
                if let Err(e) = self.store.save_wallet_balance(balance).await {
                    warn!(error = %e, "Failed to persist wallet balance");
                }
                let user = profile.clone();
                self.state.send_if_modified(|s| {
                    // Checked under the state lock so a concurrent logout wins
                    if self.epoch.load(Ordering::SeqCst) != epoch {
                        return false;
                    }
                    s.user = Some(user);
                    s.wallet_balance = balance;
                    true
                })
            }
        };

        if !applied {
            debug!("Dropping stale profile refresh");
            return Err(SessionError::SessionEnded);
        }

        self.touch();
        Ok(profile)
    }

    /// Set the wallet balance in memory and storage as one unit.
    pub async fn update_wallet_balance(&self, balance: f64) -> Result<(), SessionError> {
        if !balance.is_finite() {
            return Err(SessionError::InvalidBalance(balance));
        }
        {
            let _wallet = self.wallet_lock.lock().await;
            self.store
                .save_wallet_balance(balance)
                .await
                .map_err(SessionError::Storage)?;
            self.update(|s| s.wallet_balance = balance);
        }
        self.idle.reset();
        Ok(())
    }

    // =========================================================================
    // PIN unlock
    // =========================================================================

    /// Protect the credentials of the last password login with a PIN.
    pub async fn setup_pin(&self, pin: &str) -> Result<(), SessionError> {
        if !PinHasher::is_valid_pin(pin) {
            return Err(SessionError::InvalidPin);
        }
        let pending = self.pending().ok_or(SessionError::NoPendingCredentials)?;

        self.vault
            .save(&pending.username, &pending.password)
            .await
            .map_err(SessionError::Storage)?;
        self.vault.enable_pin(pin).await.map_err(SessionError::Storage)?;

        self.set_pending(None);
        self.update(|s| {
            let tenant_allows = s
                .app_settings
                .as_ref()
                .map(AppSettings::allows_pin_login)
                .unwrap_or(true);
            s.has_stored_credentials = true;
            s.pin_login_available = tenant_allows;
            s.should_show_pin_setup = false;
        });
        self.idle.reset();
        info!(username = %pending.username, "PIN login enabled");
        Ok(())
    }

    /// Sign in with the stored credentials unlocked by `pin`.
    pub async fn login_with_pin(&self, pin: &str) -> Result<LoginOutcome, SessionError> {
        if !PinHasher::is_valid_pin(pin) {
            return Err(SessionError::InvalidPin);
        }
        if !self.state.borrow().pin_login_available {
            return Err(SessionError::PinUnavailable);
        }

        let Some(credentials) = self.vault.lookup().await.map_err(SessionError::Storage)? else {
            self.refresh_pin_flags().await;
            return Err(SessionError::PinUnavailable);
        };

        if !self.vault.verify_pin(pin).await.map_err(SessionError::Storage)? {
            let failures = self
                .vault
                .record_pin_failure()
                .await
                .map_err(SessionError::Storage)?;
            warn!(failures, "Incorrect PIN");
            if failures >= MAX_PIN_ATTEMPTS {
                warn!("Too many incorrect PINs, disabling PIN login");
                self.disable_pin_login().await;
                return Err(SessionError::PinUnavailable);
            }
            return Err(SessionError::IncorrectPin);
        }
        if let Err(e) = self.vault.reset_pin_failures().await {
            warn!(error = %e, "Failed to reset PIN failure count");
        }

        let password = match self.vault.reveal(&credentials) {
            Ok(password) => password,
            Err(e) => {
                // Device key changed or record tampered with
                warn!(error = %e, "Stored credentials could not be decrypted");
                self.disable_pin_login().await;
                return Err(SessionError::PinUnavailable);
            }
        };

        self.login(&credentials.username, &password).await
    }

    async fn disable_pin_login(&self) {
        self.vault.clear_all().await;
        self.update(|s| {
            s.has_stored_credentials = false;
            s.pin_login_available = false;
        });
    }

    /// Raise or dismiss the PIN setup offer. Dismissing forgets the
    /// credentials kept for it.
    pub fn set_should_show_pin_setup(&self, show: bool) {
        if !show {
            self.set_pending(None);
        }
        self.update(|s| s.should_show_pin_setup = show);
    }
}
