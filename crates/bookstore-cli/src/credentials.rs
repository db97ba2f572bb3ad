//! Remembered passwords in the OS keychain.
//!
//! Customer and admin accounts live in separate namespaces so an email and
//! an admin username that happen to match never overwrite each other.

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "bookstore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Account<'a> {
    Customer(&'a str),
    Admin(&'a str),
}

impl Account<'_> {
    fn entry_name(&self) -> String {
        match self {
            Account::Customer(email) => format!("customer:{}", email),
            Account::Admin(username) => format!("admin:{}", username),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.entry_name()).context("Failed to create keyring entry")
    }
}

pub struct CredentialStore;

impl CredentialStore {
    pub fn store(account: Account<'_>, password: &str) -> Result<()> {
        account
            .entry()?
            .set_password(password)
            .context("Failed to store password in keychain")?;
        debug!(account = %account.entry_name(), "Password remembered");
        Ok(())
    }

    pub fn get_password(account: Account<'_>) -> Result<String> {
        account
            .entry()?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Forget the stored password. A missing entry is not an error.
    pub fn delete(account: Account<'_>) -> Result<()> {
        match account.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }

    pub fn has_credentials(account: Account<'_>) -> bool {
        account
            .entry()
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}
