//! Application context.
//!
//! [`Trellis`] is constructed once at startup and passed to every view. It
//! wires the credential store, the session core, the realtime channel and
//! the HTTP client together:
//!
//! ```text
//! CredentialStore ─┬─▶ BearerAuth ─────────┐
//!                  │                       ▼
//!                  └─▶ SessionCore ◀── UnauthorizedGuard ◀── ApiClient
//!                        │  observers
//!                        └─▶ RealtimeChannel ─▶ Transport
//! ```

use std::sync::Arc;

use url::Url;

use crate::config::TrellisConfig;
use crate::credential::{CredentialStore, FileCredentialStore};
use crate::errors::ClientError;
use crate::http::{ApiClient, BearerAuth, ReadPolicy, UnauthorizedGuard};
use crate::realtime::{RealtimeChannel, ReconnectPolicy, Transport, WsTransport};
use crate::session::{Navigator, SessionCore, SessionManager, SessionObserver, TracingNavigator};

pub struct Trellis {
    session: SessionManager,
    api: ApiClient,
    realtime: Arc<RealtimeChannel>,
    store: Arc<dyn CredentialStore>,
}

impl Trellis {
    pub fn builder(api_url: impl Into<String>) -> TrellisBuilder {
        TrellisBuilder {
            api_url: api_url.into(),
            ws_url: None,
            user_agent: None,
            read_policy: ReadPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            store: None,
            navigator: None,
            transport: None,
        }
    }

    /// Builder preloaded from resolved configuration.
    pub fn from_config(config: &TrellisConfig) -> anyhow::Result<TrellisBuilder> {
        let mut builder = Self::builder(config.api_url())
            .ws_url(config.ws_url()?)
            .read_policy(config.read_policy())
            .reconnect_policy(config.reconnect_policy())
            .credential_store(Arc::new(FileCredentialStore::new(config.token_path())));
        if let Some(user_agent) = config.user_agent() {
            builder = builder.user_agent(user_agent);
        }
        Ok(builder)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn realtime(&self) -> &Arc<RealtimeChannel> {
        &self.realtime
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Release the realtime connection. The stored credential is kept.
    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}

impl Drop for Trellis {
    fn drop(&mut self) {
        self.realtime.close();
    }
}

pub struct TrellisBuilder {
    api_url: String,
    ws_url: Option<String>,
    user_agent: Option<String>,
    read_policy: ReadPolicy,
    reconnect: ReconnectPolicy,
    store: Option<Arc<dyn CredentialStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    transport: Option<Arc<dyn Transport>>,
}

impl TrellisBuilder {
    pub fn ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Replace the WebSocket transport, e.g. with a test double.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Trellis, ClientError> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileCredentialStore::new(FileCredentialStore::default_path())));
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(TracingNavigator));

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let raw = match self.ws_url {
                    Some(url) => url,
                    None => crate::config::derive_ws_url(&self.api_url).map_err(|_| {
                        ClientError::InvalidUrl {
                            url: self.api_url.clone(),
                            source: url::ParseError::RelativeUrlWithoutBase,
                        }
                    })?,
                };
                let url = Url::parse(&raw)
                    .map_err(|source| ClientError::InvalidUrl { url: raw.clone(), source })?;
                Arc::new(WsTransport::new(url)) as Arc<dyn Transport>
            }
        };

        let realtime = Arc::new(RealtimeChannel::new(transport, self.reconnect));
        let observers: Vec<Arc<dyn SessionObserver>> = vec![realtime.clone()];
        let core = Arc::new(SessionCore::new(store.clone(), navigator, observers));

        let mut api = ApiClient::builder(self.api_url)
            .read_policy(self.read_policy)
            .decorator(Arc::new(BearerAuth::new(store.clone())))
            .guard(Arc::new(UnauthorizedGuard::new(core.clone())));
        if let Some(user_agent) = self.user_agent {
            api = api.user_agent(user_agent);
        }
        let api = api.build()?;

        let session = SessionManager::new(core, api.clone());
        Ok(Trellis {
            session,
            api,
            realtime,
            store,
        })
    }
}
