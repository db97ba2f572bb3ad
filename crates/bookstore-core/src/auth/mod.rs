//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionManager`: login/registration/logout with expiry-triggered logout
//! - `SessionStore`: persisted identity and token
//! - `KeyValueStore`: the storage layer underneath (`FileStore`, `MemoryStore`)
//! - `token`: reading the expiry claim out of a credential token
//!
//! Sessions are persisted to disk and dropped automatically once the token's
//! `exp` claim passes.

pub mod kv;
pub mod session;
pub mod store;
pub mod token;

pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use session::{SessionError, SessionEvent, SessionHandle, SessionManager};
pub use store::{AuthState, SessionState, SessionStore};
pub use token::decode_expiry;
