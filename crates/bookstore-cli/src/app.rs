//! Command implementations for the bookstore CLI.
//!
//! `App` owns the session handle and the persisted preferences; each
//! public method is one command.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bookstore_core::{
    ApiConfig, ApiError, Config, SessionError, SessionEvent, SessionHandle, SessionManager,
    SessionState, SessionStore,
};
use chrono::{Local, Utc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::credentials::{Account, CredentialStore};
use crate::forms::{self, AdminLoginForm, LoginForm};

const LOGIN_FAILED: &str = "Please provide a valid email and password";
const ADMIN_LOGIN_FAILED: &str = "Please provide a valid username and password";
const CONNECT_FAILED: &str = "Unable to connect to server. Check your internet connection.";
const EXPIRED_NOTICE: &str = "Session expired. Please login again.";

pub struct App {
    config: Config,
    session: SessionHandle,
}

impl App {
    /// Build the app from the environment and pick up any saved session.
    pub fn new() -> Result<Self> {
        let config = Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        });

        let api_config = ApiConfig::from_env().context("Invalid API configuration")?;
        let data_dir = Config::data_dir().context("Could not determine data directory")?;
        let store = Arc::new(SessionStore::open(&data_dir));
        let session = SessionManager::new(&api_config, store)
            .context("Failed to create HTTP client")?
            .into_handle();

        let restored = session.restore();
        debug!(
            authenticated = restored.is_authenticated(),
            base_url = %api_config.base_url(),
            "App initialized"
        );

        Ok(Self { config, session })
    }

    pub async fn login(&mut self, email: Option<String>, remember: bool) -> Result<()> {
        println!("\n=== Book Store Login ===\n");

        let email = match email {
            Some(email) => email,
            None => prompt_with_default("Email", self.config.last_email.as_deref())?,
        };
        let password = password_for(Account::Customer(email.trim()))?;
        let form = LoginForm::new(&email, password);
        form.validate().map_err(|errors| anyhow!(forms::describe(&errors)))?;

        println!("\nAuthenticating...");
        let state = self
            .session
            .login(&form.email, &form.password)
            .await
            .map_err(|e| {
                error!(error = %e, "Login failed");
                anyhow!(failure_message(&e, LOGIN_FAILED))
            })?;

        if remember {
            remember_password(Account::Customer(&form.email), &form.password);
        }
        self.config.last_email = Some(form.email.clone());
        self.save_config();

        println!("Login successful!");
        print_session(&state, self.session.expires_at());
        Ok(())
    }

    pub async fn register(&mut self, email: Option<String>, remember: bool) -> Result<()> {
        println!("\n=== Book Store Registration ===\n");

        let email = match email {
            Some(email) => email,
            None => prompt("Email")?,
        };
        let password = rpassword::prompt_password("Password: ")?;
        let form = LoginForm::new(&email, password);
        form.validate().map_err(|errors| anyhow!(forms::describe(&errors)))?;

        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if confirm != form.password {
            return Err(anyhow!("Passwords do not match"));
        }

        println!("\nCreating account...");
        let state = self
            .session
            .register(&form.email, &form.password)
            .await
            .map_err(|e| {
                error!(error = %e, "Registration failed");
                anyhow!(failure_message(&e, LOGIN_FAILED))
            })?;

        if remember {
            remember_password(Account::Customer(&form.email), &form.password);
        }
        self.config.last_email = Some(form.email.clone());
        self.save_config();

        println!("Registration successful!");
        print_session(&state, self.session.expires_at());
        Ok(())
    }

    pub async fn admin_login(&mut self, username: Option<String>, remember: bool) -> Result<()> {
        println!("\n=== Admin Dashboard Login ===\n");

        let username = match username {
            Some(username) => username,
            None => prompt_with_default("Username", self.config.last_admin_username.as_deref())?,
        };
        let password = password_for(Account::Admin(username.trim()))?;
        let form = AdminLoginForm::new(&username, password);
        form.validate().map_err(|errors| anyhow!(forms::describe(&errors)))?;

        println!("\nAuthenticating...");
        self.session
            .admin_login(&form.username, &form.password)
            .await
            .map_err(|e| {
                error!(error = %e, "Admin login failed");
                anyhow!(failure_message(&e, ADMIN_LOGIN_FAILED))
            })?;

        if remember {
            remember_password(Account::Admin(&form.username), &form.password);
        }
        self.config.last_admin_username = Some(form.username.clone());
        self.save_config();

        println!("Admin Login successful!");
        if let Some(at) = self.session.expires_at() {
            println!("Session valid until {}.", at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
        }
        Ok(())
    }

    /// Sign out and forget remembered passwords for the last used accounts.
    pub fn logout(&mut self) -> Result<()> {
        self.session.logout().context("Failed to clear session")?;

        let accounts = [
            self.config.last_email.as_deref().map(Account::Customer),
            self.config.last_admin_username.as_deref().map(Account::Admin),
        ];
        for account in accounts.into_iter().flatten() {
            if let Err(e) = CredentialStore::delete(account) {
                warn!(error = %e, "Failed to forget remembered password");
            }
        }

        println!("Logged out.");
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        let state = self.session.current();
        if state.is_authenticated() {
            print_session(&state, self.session.expires_at());
        } else {
            println!("Not logged in.");
        }
        Ok(())
    }

    /// Stay in the foreground until the session ends.
    pub async fn watch(&self) -> Result<()> {
        let mut events = self.session.subscribe();

        let state = self.session.current();
        if !state.is_authenticated() {
            println!("Not logged in.");
            return Ok(());
        }
        let Some(expires_at) = self.session.expires_at() else {
            println!("This session has no expiry; nothing to wait for.");
            return Ok(());
        };

        print_session(&state, Some(expires_at));
        println!("Waiting for the session to end...");

        loop {
            match events.recv().await {
                Ok(SessionEvent::Expired) => return acknowledge_expiry().await,
                Ok(SessionEvent::LoggedOut) => {
                    println!("Logged out.");
                    return Ok(());
                }
                Ok(SessionEvent::Established { .. }) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }

    fn save_config(&self) {
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
}

/// Message shown when an auth call fails: the server's own explanation
/// when it sent one, otherwise `fallback`.
fn failure_message(err: &SessionError, fallback: &str) -> String {
    match err {
        SessionError::Api(ApiError::NetworkError(e)) if e.status().is_none() => {
            CONNECT_FAILED.to_string()
        }
        SessionError::Api(api) => api.user_message(fallback),
        SessionError::Store(e) => format!("Signed in, but the session could not be saved: {}", e),
    }
}

fn print_session(state: &SessionState, expires_at: Option<chrono::DateTime<Utc>>) {
    match state.identity() {
        Some(identity) => println!("Signed in as {}", identity.display_name()),
        None => println!("Signed in (admin session)"),
    }
    if let Some(at) = expires_at {
        let minutes = (at - Utc::now()).num_minutes().max(0);
        println!(
            "Session expires at {} ({} min left)",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            minutes
        );
    }
}

/// Print the expiry notice and block until the user acknowledges it.
async fn acknowledge_expiry() -> Result<()> {
    info!("Session expired while watching");
    println!("\n{}", EXPIRED_NOTICE);
    print!("Press Enter to continue...");
    io::stdout().flush()?;

    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().read_line(&mut line).map(|_| ())
    })
    .await
    .context("Input task failed")??;

    println!("Run `bookstore login` to sign in again.");
    Ok(())
}

fn remember_password(account: Account<'_>, password: &str) {
    if let Err(e) = CredentialStore::store(account, password) {
        warn!(error = %e, "Failed to store credentials");
    }
}

/// Stored password if the user wants it, otherwise a fresh prompt.
fn password_for(account: Account<'_>) -> Result<String> {
    if CredentialStore::has_credentials(account) {
        print!("Use stored password? [Y/n]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "n" {
            return CredentialStore::get_password(account);
        }
    }
    Ok(rpassword::prompt_password("Password: ")?)
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_with_default(label: &str, default: Option<&str>) -> Result<String> {
    let Some(default) = default else {
        return prompt(label);
    };

    let input = prompt(&format!("{} [{}]", label, default))?;
    if input.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input)
    }
}
