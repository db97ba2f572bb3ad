//! Core library for the bookstore client.
//!
//! - `api`: HTTP client for the backend plus the authentication endpoints
//! - `auth`: session persistence and lifecycle, including automatic logout
//!   when the token expires
//! - `config`: API addresses from the environment and persisted preferences
//! - `models`: shared data types

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, AuthGrant};
pub use auth::{
    AuthState, SessionError, SessionEvent, SessionHandle, SessionManager, SessionState,
    SessionStore,
};
pub use config::{ApiConfig, Config, ConfigError, Environment};
pub use models::UserIdentity;
