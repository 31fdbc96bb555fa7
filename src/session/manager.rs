use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use trellis_common::{AuthResponse, User, UserUpdate};

use super::{EndReason, Route, SessionCore, SessionState};
use crate::credential::Credential;
use crate::errors::ClientError;
use crate::http::ApiClient;

/// Login, register, logout and profile operations over a [`SessionCore`].
///
/// Cheap to clone; clones share the same core.
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<SessionCore>,
    api: ApiClient,
    bootstrapped: Arc<AtomicBool>,
}

impl SessionManager {
    pub fn new(core: Arc<SessionCore>, api: ApiClient) -> Self {
        Self {
            core,
            api,
            bootstrapped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn core(&self) -> &Arc<SessionCore> {
        &self.core
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.core.state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.core.state().is_authenticated()
    }

    /// Resolve the stored credential into a session.
    ///
    /// Runs at most once per manager. Any failure, including a 401, discards
    /// the credential and leaves the session Anonymous; the identity fetch is
    /// sent once and never retried. A concurrent caller arriving while the
    /// first fetch is in flight gets the current state back, which may still
    /// be `Bootstrapping`; subscribe to observe the outcome.
    pub async fn bootstrap(&self) -> SessionState {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return self.core.state();
        }

        let Some(credential) = self.core.credential() else {
            self.core.end(EndReason::NoCredential);
            return self.core.state();
        };

        match self.api.get_profile_with(&credential).await {
            Ok(user) => {
                if let Err(e) = self.core.begin(credential, user) {
                    tracing::warn!(error = %e, "failed to persist credential during bootstrap");
                    self.core.end(EndReason::BootstrapFailed);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "bootstrap failed, discarding stored credential");
                self.core
                    .expire(Some(&credential), EndReason::BootstrapFailed);
            }
        }
        self.core.state()
    }

    /// Authenticate and start a fresh session, then navigate home.
    ///
    /// On failure the backend's message is returned and the session is left
    /// as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let response = self.api.login(email, password).await?;
        self.establish(response).await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ClientError> {
        let response = self.api.register(username, email, password).await?;
        self.establish(response).await
    }

    /// Discard the credential and end the session. No network involved.
    pub fn logout(&self) {
        self.bootstrapped.store(true, Ordering::SeqCst);
        self.core.end(EndReason::Logout);
    }

    pub async fn refresh_profile(&self) -> Result<User, ClientError> {
        self.require_session()?;
        let user = self.api.get_profile().await?;
        self.core.replace_user(user.clone());
        Ok(user)
    }

    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User, ClientError> {
        self.require_session()?;
        let user = self.api.update_profile(update).await?;
        self.core.replace_user(user.clone());
        Ok(user)
    }

    /// Release the realtime connection and publish Anonymous. The stored
    /// credential is kept for the next run.
    pub fn shutdown(&self) {
        self.core.end(EndReason::Shutdown);
    }

    async fn establish(&self, response: AuthResponse) -> Result<User, ClientError> {
        let credential = Credential::new(response.access_token);
        let user = match response.user {
            Some(user) => user,
            None => self.api.get_profile_with(&credential).await?,
        };

        self.bootstrapped.store(true, Ordering::SeqCst);
        self.core.begin(credential, user.clone())?;
        self.core.navigate(Route::Home);
        Ok(user)
    }

    fn require_session(&self) -> Result<(), ClientError> {
        if self.core.state().is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }
}
