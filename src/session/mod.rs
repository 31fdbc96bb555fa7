//! Authenticated session lifecycle.
//!
//! The session is an explicitly owned object, not ambient state. A
//! [`SessionCore`] is shared (via `Arc`) between the [`SessionManager`], the
//! HTTP 401 guard and anything that reads the current user. All transitions
//! go through the core and are serialized by a single mutex:
//!
//! ```text
//! Bootstrapping ──▶ Authenticated(id, user) ──▶ Anonymous
//!        │                    ▲                     │
//!        └──────▶ Anonymous ──┴──── login/register ─┘
//! ```
//!
//! Each successful login, register or bootstrap produces a fresh
//! [`SessionId`]; an Authenticated state is never resumed after it ends.
//! Observers hear about a transition before it is published, so by the time
//! any subscriber sees `Anonymous` the realtime connection is already gone.

mod manager;
mod navigator;

pub use manager::SessionManager;
pub use navigator::{Navigator, RecordingNavigator, Route, TracingNavigator};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use trellis_common::User;

use crate::credential::{Credential, CredentialStore};
use crate::errors::ClientError;

/// Generation number of one authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Startup, before the stored credential has been checked.
    Bootstrapping,
    Authenticated { id: SessionId, user: User },
    Anonymous,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<SessionId> {
        match self {
            SessionState::Authenticated { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Bootstrapping => "bootstrapping",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Anonymous => "anonymous",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Logout,
    /// A response came back 401.
    Unauthorized,
    /// The stored credential could not be turned into a user at startup.
    BootstrapFailed,
    /// Nothing stored at startup.
    NoCredential,
    /// A new login replaced the running session.
    Superseded,
    /// Application teardown. The credential survives for the next run.
    Shutdown,
}

impl EndReason {
    pub fn clears_credential(&self) -> bool {
        matches!(
            self,
            EndReason::Logout | EndReason::Unauthorized | EndReason::BootstrapFailed
        )
    }

    pub fn navigates_to_login(&self) -> bool {
        matches!(self, EndReason::Logout | EndReason::Unauthorized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Logout => "logout",
            EndReason::Unauthorized => "unauthorized",
            EndReason::BootstrapFailed => "bootstrap_failed",
            EndReason::NoCredential => "no_credential",
            EndReason::Superseded => "superseded",
            EndReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hooks run inside a transition, while the transition lock is held.
///
/// Implementations must not block and must not call back into the core.
pub trait SessionObserver: Send + Sync {
    /// Runs before `Authenticated` is published.
    fn on_authenticated(&self, id: SessionId, credential: &Credential);

    /// Runs before `Anonymous` is published. `id` is `None` when no session
    /// was running; implementations still release anything they hold.
    fn on_ended(&self, id: Option<SessionId>, reason: EndReason);
}

pub struct SessionCore {
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    observers: Vec<Arc<dyn SessionObserver>>,
    state: watch::Sender<SessionState>,
    transition: Mutex<()>,
    next_id: AtomicU64,
}

impl SessionCore {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        observers: Vec<Arc<dyn SessionObserver>>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Bootstrapping);
        Self {
            store,
            navigator,
            observers,
            state,
            transition: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.store.load()
    }

    pub fn navigate(&self, route: Route) {
        self.navigator.navigate(route);
    }

    /// Store `credential` and publish a fresh Authenticated session.
    ///
    /// A session already running is ended first (`Superseded`) so its
    /// observers release before the new one starts.
    pub fn begin(&self, credential: Credential, user: User) -> Result<SessionId, ClientError> {
        let _guard = self.lock();
        self.store.store(&credential)?;

        let previous = self.state.borrow().id();
        if let Some(previous) = previous {
            for observer in &self.observers {
                observer.on_ended(Some(previous), EndReason::Superseded);
            }
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        for observer in &self.observers {
            observer.on_authenticated(id, &credential);
        }
        tracing::info!(session = %id, user = %user.username, "session authenticated");
        self.state.send_replace(SessionState::Authenticated { id, user });
        Ok(id)
    }

    /// End the current session unconditionally.
    pub fn end(&self, reason: EndReason) {
        let _guard = self.lock();
        self.end_locked(reason, reason.clears_credential());
    }

    /// End the session because a request using `attached` was rejected.
    ///
    /// Only the credential that was actually rejected is cleared. When the
    /// store already holds a different one (a login finished while the
    /// request was in flight) the rejection is stale and nothing happens.
    /// A second rejection after the session already ended is a no-op.
    /// Returns whether the session was ended.
    pub fn expire(&self, attached: Option<&Credential>, reason: EndReason) -> bool {
        let _guard = self.lock();

        let current = match attached {
            Some(credential) => match self.store.clear_if(credential) {
                Ok(cleared) => cleared,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to compare rejected credential, clearing store");
                    if let Err(e) = self.store.clear() {
                        tracing::warn!(error = %e, "failed to clear credential");
                    }
                    true
                }
            },
            None => self.store.load().is_none(),
        };
        if !current {
            tracing::debug!(reason = %reason, "ignoring rejection of a superseded credential");
            return false;
        }
        if *self.state.borrow() == SessionState::Anonymous {
            return false;
        }

        self.end_locked(reason, false);
        true
    }

    /// Swap the user record of the running session. Same id, same credential.
    pub fn replace_user(&self, user: User) -> bool {
        let _guard = self.lock();
        let current = self.state.borrow().id();
        let Some(id) = current else {
            return false;
        };
        self.state
            .send_replace(SessionState::Authenticated { id, user });
        true
    }

    fn end_locked(&self, reason: EndReason, clear_credential: bool) {
        let previous = self.state.borrow().id();

        for observer in &self.observers {
            observer.on_ended(previous, reason);
        }
        if clear_credential {
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "failed to clear credential");
            }
        }

        match previous {
            Some(id) => tracing::info!(session = %id, reason = %reason, "session ended"),
            None => tracing::debug!(reason = %reason, "session anonymous"),
        }
        self.state.send_replace(SessionState::Anonymous);

        if reason.navigates_to_login() {
            self.navigator.navigate(Route::Login);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryCredentialStore;

    fn user(id: i64) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.com", id),
            role: "member".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Records the published state each hook observes.
    struct OrderingObserver {
        core: Mutex<Option<watch::Receiver<SessionState>>>,
        seen: Mutex<Vec<String>>,
    }

    impl OrderingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                core: Mutex::new(None),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn attach(&self, rx: watch::Receiver<SessionState>) {
            *self.core.lock().unwrap() = Some(rx);
        }

        fn published(&self) -> &'static str {
            self.core
                .lock()
                .unwrap()
                .as_ref()
                .map(|rx| rx.borrow().label())
                .unwrap_or("detached")
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl SessionObserver for OrderingObserver {
        fn on_authenticated(&self, id: SessionId, credential: &Credential) {
            let entry = format!("auth {} {} while {}", id, credential.as_str(), self.published());
            self.seen.lock().unwrap().push(entry);
        }

        fn on_ended(&self, id: Option<SessionId>, reason: EndReason) {
            let id = id.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
            let entry = format!("end {} {} while {}", id, reason, self.published());
            self.seen.lock().unwrap().push(entry);
        }
    }

    fn core_with(
        store: Arc<MemoryCredentialStore>,
    ) -> (SessionCore, Arc<OrderingObserver>, Arc<RecordingNavigator>) {
        let observer = OrderingObserver::new();
        let nav = Arc::new(RecordingNavigator::new());
        let core = SessionCore::new(store, nav.clone(), vec![observer.clone()]);
        observer.attach(core.subscribe());
        (core, observer, nav)
    }

    #[test]
    fn test_observers_run_before_state_is_published() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, observer, _) = core_with(store);

        core.begin(Credential::new("t1"), user(1)).unwrap();
        core.end(EndReason::Logout);

        assert_eq!(
            observer.seen(),
            vec![
                "auth #1 t1 while bootstrapping".to_string(),
                "end #1 logout while authenticated".to_string(),
            ]
        );
        assert_eq!(core.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_begin_stores_credential_and_assigns_fresh_ids() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, observer, _) = core_with(store.clone());

        let first = core.begin(Credential::new("t1"), user(1)).unwrap();
        let second = core.begin(Credential::new("t2"), user(1)).unwrap();

        assert!(second > first);
        assert_eq!(store.load(), Some(Credential::new("t2")));
        assert_eq!(core.state().id(), Some(second));
        assert!(observer.seen().contains(&"end #1 superseded while authenticated".to_string()));
    }

    #[test]
    fn test_logout_clears_and_navigates_every_time() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, nav) = core_with(store.clone());
        core.begin(Credential::new("t1"), user(1)).unwrap();

        core.end(EndReason::Logout);
        core.end(EndReason::Logout);

        assert!(store.load().is_none());
        assert_eq!(core.state(), SessionState::Anonymous);
        assert_eq!(nav.routes(), vec![Route::Login, Route::Login]);
    }

    #[test]
    fn test_expire_with_matching_credential_ends_session() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, nav) = core_with(store.clone());
        core.begin(Credential::new("t1"), user(1)).unwrap();

        assert!(core.expire(Some(&Credential::new("t1")), EndReason::Unauthorized));

        assert!(store.load().is_none());
        assert!(!core.state().is_authenticated());
        assert_eq!(nav.last(), Some(Route::Login));
    }

    /// Store whose compare-and-clear always fails.
    struct BrokenCompareStore {
        inner: MemoryCredentialStore,
    }

    impl CredentialStore for BrokenCompareStore {
        fn load(&self) -> Option<Credential> {
            self.inner.load()
        }

        fn store(&self, credential: &Credential) -> Result<(), ClientError> {
            self.inner.store(credential)
        }

        fn clear(&self) -> Result<(), ClientError> {
            self.inner.clear()
        }

        fn clear_if(&self, _expected: &Credential) -> Result<bool, ClientError> {
            Err(ClientError::Credential(std::io::Error::other("compare failed")))
        }
    }

    #[test]
    fn test_expire_clears_store_when_compare_fails() {
        let store = Arc::new(BrokenCompareStore {
            inner: MemoryCredentialStore::new(),
        });
        let nav = Arc::new(RecordingNavigator::new());
        let core = SessionCore::new(store.clone(), nav.clone(), Vec::new());
        core.begin(Credential::new("t1"), user(1)).unwrap();

        assert!(core.expire(Some(&Credential::new("t1")), EndReason::Unauthorized));

        assert!(store.load().is_none());
        assert_eq!(core.state(), SessionState::Anonymous);
        assert_eq!(nav.last(), Some(Route::Login));
    }

    #[test]
    fn test_repeated_expire_navigates_once() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, nav) = core_with(store);
        core.begin(Credential::new("t1"), user(1)).unwrap();

        assert!(core.expire(Some(&Credential::new("t1")), EndReason::Unauthorized));
        assert!(!core.expire(Some(&Credential::new("t1")), EndReason::Unauthorized));

        assert_eq!(nav.routes(), vec![Route::Login]);
    }

    #[test]
    fn test_expire_with_stale_credential_is_ignored() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, nav) = core_with(store.clone());
        core.begin(Credential::new("t2"), user(1)).unwrap();

        assert!(!core.expire(Some(&Credential::new("t1")), EndReason::Unauthorized));

        assert_eq!(store.load(), Some(Credential::new("t2")));
        assert!(core.state().is_authenticated());
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn test_expire_without_credential_when_store_is_empty() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, _) = core_with(store);
        assert!(core.expire(None, EndReason::Unauthorized));
        assert_eq!(core.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_shutdown_keeps_credential() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, nav) = core_with(store.clone());
        core.begin(Credential::new("t1"), user(1)).unwrap();

        core.end(EndReason::Shutdown);

        assert_eq!(store.load(), Some(Credential::new("t1")));
        assert_eq!(core.state(), SessionState::Anonymous);
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn test_replace_user_keeps_session_id() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (core, _, _) = core_with(store);
        assert!(!core.replace_user(user(1)));

        let id = core.begin(Credential::new("t1"), user(1)).unwrap();
        let mut renamed = user(1);
        renamed.username = "renamed".into();
        assert!(core.replace_user(renamed));

        let state = core.state();
        assert_eq!(state.id(), Some(id));
        assert_eq!(state.user().unwrap().username, "renamed");
    }

    #[test]
    fn test_end_reason_effects() {
        assert!(EndReason::Logout.clears_credential());
        assert!(EndReason::BootstrapFailed.clears_credential());
        assert!(!EndReason::NoCredential.clears_credential());
        assert!(!EndReason::Shutdown.clears_credential());
        assert!(!EndReason::BootstrapFailed.navigates_to_login());
        assert!(EndReason::Unauthorized.navigates_to_login());
    }
}
