//! Session lifecycle: login, registration, logout and expiry-triggered logout.
//!
//! `SessionManager` is the single owner of the expiry timer. Every new
//! session aborts the previous timer before arming its own. A timer that
//! fires only clears the store if it is still the armed one and the store
//! still holds the token it was armed for; another process sharing the
//! session file may have signed in since.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::kv::StoreError;
use super::store::{AuthState, SessionState, SessionStore};
use super::token;
use crate::api::{ApiClient, ApiError, AuthGrant};
use crate::config::ApiConfig;

/// Buffer size for the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to persist session: {0}")]
    Store(#[from] StoreError),
}

/// Session changes broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established { expires_at: Option<DateTime<Utc>> },
    LoggedOut,
    Expired,
}

/// Shared handle passed to whatever needs the session.
pub type SessionHandle = Arc<SessionManager>;

struct ExpiryTimer {
    id: u64,
    token: String,
    handle: JoinHandle<()>,
}

impl ExpiryTimer {
    fn cancel(self) {
        debug!(timer_id = self.id, "Cancelling session expiry timer");
        self.handle.abort();
    }
}

/// State reachable from the timer task.
struct Shared {
    store: Arc<SessionStore>,
    timer: Mutex<Option<ExpiryTimer>>,
    events: broadcast::Sender<SessionEvent>,
    next_timer_id: AtomicU64,
}

impl Shared {
    fn lock_timer(&self) -> MutexGuard<'_, Option<ExpiryTimer>> {
        // The slot holds no invariant a panic could break
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Arm a timer for `token`, due at `expires_at_ms`. The caller holds
    /// the slot lock and stores the returned timer in it.
    fn arm(self: &Arc<Self>, token: String, expires_at_ms: i64) -> ExpiryTimer {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let delay = token::delay_until(expires_at_ms, token::now_millis());
        debug!(timer_id = id, delay_ms = delay.as_millis() as u64, "Scheduling session expiry");

        let shared: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(id);
            }
        });

        ExpiryTimer { id, token, handle }
    }

    fn expire(self: &Arc<Self>, id: u64) {
        let mut slot = self.lock_timer();
        let armed_token = match slot.as_ref() {
            Some(timer) if timer.id == id => timer.token.clone(),
            _ => {
                debug!(timer_id = id, "Ignoring stale expiry timer");
                return;
            }
        };
        // Dropping our own handle detaches it; the task is finishing anyway
        *slot = None;

        match self.store.clear_if_token(&armed_token) {
            Ok(true) => {}
            Ok(false) => {
                let event = self.follow_replaced_session(&mut slot);
                drop(slot);
                self.notify(event);
                return;
            }
            Err(e) => warn!(error = %e, "Failed to clear expired session"),
        }
        drop(slot);

        info!("Session expired");
        self.notify(SessionEvent::Expired);
    }

    /// The store was changed outside this manager. Track whatever session
    /// it holds now instead of clearing it.
    fn follow_replaced_session(self: &Arc<Self>, slot: &mut Option<ExpiryTimer>) -> SessionEvent {
        let current = self.store.load();
        let Some(current_token) = current.token() else {
            info!("Session was signed out elsewhere");
            return SessionEvent::LoggedOut;
        };

        let expires_at_ms = token::decode_expiry(current_token);
        if let Some(ms) = expires_at_ms {
            *slot = Some(self.arm(current_token.to_string(), ms));
        }
        info!("Session was replaced elsewhere, following the new one");
        SessionEvent::Established {
            expires_at: expires_at_ms.and_then(DateTime::from_timestamp_millis),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let slot = match self.timer.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
    }
}

/// Owns the session operations and the expiry timer.
///
/// Methods that may arm the timer (`establish`, `restore` and the
/// operations built on them) spawn onto the current tokio runtime and
/// panic if called outside one.
pub struct SessionManager {
    api: ApiClient,
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager whose API client reads its token from `store`.
    pub fn new(config: &ApiConfig, store: Arc<SessionStore>) -> Result<Self, ApiError> {
        let api = ApiClient::new(config, Arc::clone(&store))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            api,
            shared: Arc::new(Shared {
                store,
                timer: Mutex::new(None),
                events,
                next_timer_id: AtomicU64::new(0),
            }),
        })
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(self)
    }

    /// Client sharing this manager's session, for non-auth requests
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn current(&self) -> SessionState {
        self.shared.store.load()
    }

    pub fn state(&self) -> AuthState {
        self.current().auth_state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_authenticated()
    }

    /// Expiry of the current token, when it carries one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current().token().and_then(token::expires_at)
    }

    /// Expiry claim of `token` in milliseconds since the epoch.
    pub fn decode_expiry(token: &str) -> Option<i64> {
        token::decode_expiry(token)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<SessionState, SessionError> {
        let grant = self.api.register(email, password).await?;
        self.establish(grant)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionState, SessionError> {
        let grant = self.api.login(email, password).await?;
        self.establish(grant)
    }

    pub async fn admin_login(&self, username: &str, password: &str) -> Result<SessionState, SessionError> {
        let grant = self.api.admin_login(username, password).await?;
        self.establish(grant)
    }

    /// Persist `grant` as the current session and re-arm the expiry timer.
    ///
    /// Whatever session was there before is replaced, including its timer.
    /// A grant with an empty token is rejected and changes nothing.
    pub(crate) fn establish(&self, grant: AuthGrant) -> Result<SessionState, SessionError> {
        let AuthGrant {
            identity,
            token: raw_token,
        } = grant;
        if raw_token.is_empty() {
            return Err(ApiError::MissingToken.into());
        }
        let expires_at_ms = token::decode_expiry(&raw_token);

        let mut slot = self.shared.lock_timer();
        self.shared.store.save(identity.as_ref(), &raw_token)?;
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        match expires_at_ms {
            Some(ms) => *slot = Some(self.shared.arm(raw_token.clone(), ms)),
            None => debug!("Token carries no expiry, no automatic logout scheduled"),
        }
        drop(slot);

        let expires_at = expires_at_ms.and_then(DateTime::from_timestamp_millis);
        info!(
            user = identity.as_ref().map(|i| i.display_name()).unwrap_or("admin"),
            expires_at = ?expires_at,
            "Session established"
        );
        self.shared.notify(SessionEvent::Established { expires_at });

        Ok(SessionState::new(identity, Some(raw_token)))
    }

    /// Drop the session. Safe to call when nobody is signed in.
    pub fn logout(&self) -> Result<(), SessionError> {
        let mut slot = self.shared.lock_timer();
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
        self.shared.store.clear()?;
        drop(slot);

        info!("Logged out");
        self.shared.notify(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Pick up a persisted session at startup.
    ///
    /// A session whose token has already expired, or whose stored identity
    /// cannot be read, is cleared and reported as anonymous. Otherwise the
    /// expiry timer is armed for it.
    pub fn restore(&self) -> SessionState {
        let mut slot = self.shared.lock_timer();
        let (state, identity_corrupted) = self.shared.store.load_checked();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }

        if identity_corrupted {
            info!("Stored identity is unreadable, clearing the session");
            if let Err(e) = self.shared.store.clear() {
                warn!(error = %e, "Failed to clear corrupted session");
            }
            return SessionState::anonymous();
        }

        let Some((stored_token, expires_at_ms)) = state
            .token()
            .and_then(|t| token::decode_expiry(t).map(|ms| (t.to_string(), ms)))
        else {
            debug!(authenticated = state.is_authenticated(), "Restored session without expiry");
            return state;
        };

        if expires_at_ms <= token::now_millis() {
            info!("Stored session has expired, clearing it");
            if let Err(e) = self.shared.store.clear() {
                warn!(error = %e, "Failed to clear expired session");
            }
            return SessionState::anonymous();
        }

        *slot = Some(self.shared.arm(stored_token, expires_at_ms));
        debug!("Restored session");
        state
    }
}
