//! Terminal rendering and prompts.

use std::io::{self, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use walletgate_core::session::SessionUi;
use walletgate_core::SessionSnapshot;

/// `SessionUi` backed by stdout.
pub struct TerminalUi;

#[async_trait]
impl SessionUi for TerminalUi {
    async fn session_expired(&self) {
        println!();
        println!("Your session has expired. Please log in again.");
    }

    fn redirect_to_login(&self) {
        println!("Signed out. Type `login <username>` or `pin-login` to continue.");
        prompt();
    }
}

pub fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// Read a secret without echo. Runs on the blocking pool so timers keep firing.
pub async fn read_secret(label: &'static str) -> Result<String> {
    let secret = tokio::task::spawn_blocking(move || rpassword::prompt_password(label))
        .await
        .context("Secret prompt task failed")?
        .context("Failed to read from terminal")?;
    Ok(secret.trim().to_string())
}

pub fn format_amount(amount: f64, currency: Option<&str>) -> String {
    match currency {
        Some(code) => format!("{} {:.2}", code, amount),
        None => format!("{:.2}", amount),
    }
}

pub fn print_help() {
    println!("Commands:");
    println!("  login [username]   sign in with a password");
    println!("  pin-setup          protect the last login with a PIN");
    println!("  pin-skip           dismiss the PIN offer");
    println!("  pin-login          sign in with your PIN");
    println!("  refresh            reload profile and balance");
    println!("  balance <amount>   set the wallet balance");
    println!("  status             show session state");
    println!("  background         simulate the app going to background");
    println!("  foreground         simulate the app returning to foreground");
    println!("  logout             sign out");
    println!("  quit               exit");
}

pub fn print_status(snapshot: &SessionSnapshot, cache_age: Option<&str>) {
    let currency = snapshot
        .app_settings
        .as_ref()
        .and_then(|s| s.currency.as_deref());

    match snapshot.organization {
        Some(ref org) => match cache_age {
            Some(age) => println!("Organization: {} (cached {})", org.name, age),
            None => println!("Organization: {}", org.name),
        },
        None => println!("Organization: unknown"),
    }
    if let Some(ref error) = snapshot.init_error {
        println!("Startup error: {}", error);
    }

    match snapshot.user {
        Some(ref user) => {
            println!("Signed in as {} ({})", user.display_name(), user.username);
            println!("Balance: {}", format_amount(snapshot.wallet_balance, currency));
        }
        None => println!("Not signed in"),
    }

    if snapshot.pin_login_available {
        println!("PIN login: available");
    } else if snapshot.has_stored_credentials {
        println!("PIN login: disabled by organization");
    }
    if snapshot.should_show_pin_setup {
        println!("Tip: run `pin-setup` to sign in faster next time.");
    }
}
