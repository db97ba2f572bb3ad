//! REST API client module for the bookstore backend.
//!
//! This module provides the `ApiClient` for talking to the backend and
//! the typed authentication endpoints built on it.
//!
//! Authenticated requests carry the stored token as a bearer credential.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::AuthGrant;
pub use client::ApiClient;
pub use error::ApiError;
pub use reqwest::StatusCode;
