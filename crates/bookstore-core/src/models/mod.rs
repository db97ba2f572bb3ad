//! Data models shared by the API client and the session layer.
//!
//! - `UserIdentity`: profile fields returned by the backend on login/registration

pub mod identity;

pub use identity::UserIdentity;
