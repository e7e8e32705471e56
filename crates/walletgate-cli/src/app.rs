//! Application wiring and the command loop.
//!
//! `App` builds the session core from config (HTTP gateway, file store,
//! keychain-backed cipher) and runs a prompt over stdin. Each entered
//! line is forwarded to the idle timer as key activity before the
//! command runs.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::channel::mpsc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use walletgate_core::auth::{CredentialCipher, Keychain};
use walletgate_core::store::SessionStoreExt;
use walletgate_core::{
    ActivityKind, AppLifecycle, AuthSessionManager, Config, FileSessionStore, HostEvent,
    HttpApiGateway, LoginOutcome, SessionError,
};

use crate::terminal::{self, TerminalUi};

/// A parsed prompt line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login(Option<String>),
    PinSetup,
    PinSkip,
    PinLogin,
    Refresh,
    Balance(f64),
    Status,
    Background,
    Foreground,
    Logout,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Command::Empty;
        };
        let arg = parts.next();

        match name.to_lowercase().as_str() {
            "login" => Command::Login(arg.map(str::to_string)),
            "pin-setup" => Command::PinSetup,
            "pin-skip" => Command::PinSkip,
            "pin-login" => Command::PinLogin,
            "refresh" => Command::Refresh,
            "balance" => match arg.map(|a| a.replace(',', "").parse::<f64>()) {
                Some(Ok(amount)) => Command::Balance(amount),
                _ => Command::Invalid("Usage: balance <amount>".to_string()),
            },
            "status" => Command::Status,
            "background" | "bg" => Command::Background,
            "foreground" | "fg" => Command::Foreground,
            "logout" => Command::Logout,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Invalid(format!("Unknown command: {} (try `help`)", other)),
        }
    }
}

pub struct App {
    config: Config,
    store: Arc<FileSessionStore>,
    session: Arc<AuthSessionManager>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(api = %config.api_base_url, tenant = ?config.tenant_key(), "Config loaded");

        let keychain = Keychain::default();
        let cipher = match keychain.load_or_create_device_key() {
            Ok(key) => CredentialCipher::new(key),
            Err(e) => {
                // PIN records written with this key will not survive a restart
                warn!(error = %e, "Keychain unavailable, using an ephemeral device key");
                CredentialCipher::ephemeral()
            }
        };

        let gateway = HttpApiGateway::new(config.api_base_url.clone())
            .context("Failed to create API client")?
            .with_keychain(keychain);
        let store = Arc::new(FileSessionStore::in_data_dir()?);
        debug!(dir = %store.dir().display(), "Session store ready");

        let session = AuthSessionManager::new(
            Arc::new(gateway),
            store.clone(),
            cipher,
            Arc::new(TerminalUi),
            config.session_config(),
        );

        Ok(Self {
            config,
            store,
            session,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        println!("walletgate - type `help` for commands");
        self.session.initialize().await;
        self.print_status().await;

        let (activity, events) = mpsc::unbounded::<HostEvent>();
        let watcher = self.session.idle_timer().attach(events);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        terminal::prompt();
        while let Some(line) = lines.next_line().await.context("Failed to read input")? {
            let _ = activity.unbounded_send(HostEvent::Activity(ActivityKind::Key));

            match Command::parse(&line) {
                Command::Quit => break,
                Command::Background => {
                    let _ = activity.unbounded_send(HostEvent::Lifecycle(AppLifecycle::Background));
                    println!("App backgrounded; the idle timer is paused.");
                }
                Command::Foreground => {
                    let _ = activity.unbounded_send(HostEvent::Lifecycle(AppLifecycle::Foreground));
                    println!("App foregrounded.");
                }
                command => self.execute(command).await,
            }
            terminal::prompt();
        }

        watcher.abort();
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        let result = match command {
            Command::Login(username) => self.login(username).await,
            Command::PinSetup => self.setup_pin().await,
            Command::PinSkip => {
                self.session.set_should_show_pin_setup(false);
                Ok(())
            }
            Command::PinLogin => self.login_with_pin().await,
            Command::Refresh => self.refresh().await,
            Command::Balance(amount) => self.session.update_wallet_balance(amount).await.map(|_| {
                println!("Balance updated.");
            }),
            Command::Status => {
                self.print_status().await;
                Ok(())
            }
            Command::Logout => {
                self.session.logout().await;
                Ok(())
            }
            Command::Help => {
                terminal::print_help();
                Ok(())
            }
            Command::Invalid(message) => {
                println!("{}", message);
                Ok(())
            }
            Command::Empty | Command::Quit | Command::Background | Command::Foreground => Ok(()),
        };

        if let Err(e) = result {
            println!("{}", e);
        }
    }

    async fn login(&mut self, username: Option<String>) -> Result<(), SessionError> {
        let Some(username) = username.or_else(|| self.config.last_username.clone()) else {
            println!("Usage: login <username>");
            return Ok(());
        };
        let password = match terminal::read_secret("Password: ").await {
            Ok(password) => password,
            Err(e) => {
                println!("{:#}", e);
                return Ok(());
            }
        };

        match self.session.login(&username, &password).await? {
            LoginOutcome::Authenticated { offer_pin_setup } => {
                info!(username = %username, "Login successful");
                self.remember_username(&username);
                self.print_status().await;
                if offer_pin_setup {
                    println!("Set up a PIN for faster sign-in with `pin-setup`, or `pin-skip`.");
                }
            }
            LoginOutcome::Rejected { message } => println!("{}", message),
            LoginOutcome::MissingCredentials => println!("Username and password required"),
        }
        Ok(())
    }

    fn remember_username(&mut self, username: &str) {
        if self.config.last_username.as_deref() == Some(username) {
            return;
        }
        self.config.last_username = Some(username.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    async fn setup_pin(&self) -> Result<(), SessionError> {
        let pin = terminal::read_secret("New PIN (4-6 digits): ")
            .await
            .map_err(SessionError::Storage)?;
        self.session.setup_pin(&pin).await?;
        println!("PIN enabled.");
        Ok(())
    }

    async fn login_with_pin(&self) -> Result<(), SessionError> {
        if !self.session.snapshot().pin_login_available {
            println!("PIN login is not set up. Sign in with `login <username>`.");
            return Ok(());
        }
        let pin = terminal::read_secret("PIN: ")
            .await
            .map_err(SessionError::Storage)?;
        match self.session.login_with_pin(&pin).await? {
            LoginOutcome::Authenticated { .. } => self.print_status().await,
            LoginOutcome::Rejected { message } => println!("{}", message),
            LoginOutcome::MissingCredentials => println!("PIN login is not available."),
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<(), SessionError> {
        let profile = self.session.refresh_profile().await?;
        println!("Profile refreshed for {}.", profile.display_name());
        self.print_status().await;
        Ok(())
    }

    async fn print_status(&self) {
        let cache_age = match self.store.load_organization().await {
            Ok(cached) => cached.map(|c| c.age_display()),
            Err(e) => {
                debug!(error = %e, "No readable organization cache");
                None
            }
        };
        terminal::print_status(&self.session.snapshot(), cache_age.as_deref());
    }
}
