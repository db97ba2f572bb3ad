//! Client configuration.
//!
//! Two layers live here:
//!
//! - `ApiConfig`: where the backend lives, resolved from the environment
//!   (`BOOKSTORE_API_URL`, `BOOKSTORE_API_ORIGIN`, `BOOKSTORE_ENV`).
//! - `Config`: small user preferences persisted at
//!   `~/.config/bookstore/config.json` (last used login names).

use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Application name used for config/data directory paths
const APP_NAME: &str = "bookstore";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API base used when `BOOKSTORE_API_URL` is unset. Relative, so it is
/// resolved against the API origin.
const DEFAULT_API_PATH: &str = "/api";

const DEV_API_ORIGIN: &str = "http://localhost:5000";
const PROD_API_ORIGIN: &str = "https://mern-stack-book-store-umber.vercel.app";

pub const ENV_API_URL: &str = "BOOKSTORE_API_URL";
pub const ENV_API_ORIGIN: &str = "BOOKSTORE_API_ORIGIN";
pub const ENV_MODE: &str = "BOOKSTORE_ENV";
pub const ENV_DATA_DIR: &str = "BOOKSTORE_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL in {name}: {value} ({reason})")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Could not find {0} directory")]
    MissingDirectory(&'static str),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Build mode that picks the default API origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Read `BOOKSTORE_ENV`, falling back to the build profile.
    pub fn from_env() -> Self {
        std::env::var(ENV_MODE)
            .ok()
            .and_then(|value| Self::parse(&value))
            .unwrap_or_else(Self::build_default)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn default_origin(self) -> &'static str {
        match self {
            Self::Development => DEV_API_ORIGIN,
            Self::Production => PROD_API_ORIGIN,
        }
    }
}

/// Resolved backend addresses.
///
/// `base_url` prefixes the standard API routes (`/auth/login`, ...),
/// `origin` prefixes routes that are mounted at the server root
/// (`/api/auth/admin`). Neither carries a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: String,
    origin: String,
}

impl ApiConfig {
    /// Resolve addresses from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin = non_empty_var(ENV_API_ORIGIN);
        let api_url = non_empty_var(ENV_API_URL);
        Self::resolve(Environment::from_env(), origin.as_deref(), api_url.as_deref())
    }

    /// Resolve addresses from explicit values.
    ///
    /// `origin` falls back to the environment's default origin. `api_url`
    /// falls back to `/api`; a relative value is appended to the origin.
    pub fn resolve(
        env: Environment,
        origin: Option<&str>,
        api_url: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let origin = trim_trailing_slash(origin.unwrap_or(env.default_origin()));
        Url::parse(origin).map_err(|e| ConfigError::InvalidUrl {
            name: ENV_API_ORIGIN,
            value: origin.to_string(),
            reason: e.to_string(),
        })?;

        let api_url = api_url.unwrap_or(DEFAULT_API_PATH);
        let base_url = if is_absolute(api_url) {
            trim_trailing_slash(api_url).to_string()
        } else {
            format!("{}/{}", origin, api_url.trim_matches('/'))
        };
        let base_url = trim_trailing_slash(&base_url).to_string();
        Url::parse(&base_url).map_err(|e| ConfigError::InvalidUrl {
            name: ENV_API_URL,
            value: base_url.clone(),
            reason: e.to_string(),
        })?;

        debug!(base_url = %base_url, origin = %origin, ?env, "Resolved API configuration");

        Ok(Self {
            base_url,
            origin: origin.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn trim_trailing_slash(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

/// Persisted user preferences.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub last_email: Option<String>,
    pub last_admin_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::MissingDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session. `BOOKSTORE_DATA_DIR`
    /// overrides the platform default.
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = non_empty_var(ENV_DATA_DIR) {
            return Ok(PathBuf::from(dir));
        }
        let data_dir = dirs::data_local_dir().ok_or(ConfigError::MissingDirectory("data"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
