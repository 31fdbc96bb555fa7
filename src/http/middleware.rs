//! Request decorators and response guards.
//!
//! Every call made through [`ApiClient`](super::ApiClient) runs the same
//! pipeline: decorators mutate the outgoing request, the request executes,
//! then guards observe the response status before the caller sees it.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::credential::{Credential, CredentialStore};
use crate::errors::ClientError;
use crate::session::{EndReason, SessionCore};

/// Per-request metadata shared between decorators and guards.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Credential sent with the request, if any. Set up-front to pin a
    /// specific credential instead of the stored one.
    pub attached: Option<Credential>,
    /// Whether the read retry policy applies. Identity checks run once.
    pub retry: bool,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            attached: None,
            retry: true,
        }
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.attached = Some(credential);
        self
    }

    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    /// Reads are retried unless the caller opted out.
    pub fn is_retryable(&self) -> bool {
        self.retry && self.is_read()
    }
}

pub trait RequestDecorator: Send + Sync {
    fn decorate(
        &self,
        request: &mut reqwest::Request,
        ctx: &mut RequestContext,
    ) -> Result<(), ClientError>;
}

pub trait ResponseGuard: Send + Sync {
    fn inspect(&self, status: StatusCode, ctx: &RequestContext);
}

/// Attaches `Authorization: Bearer <token>` whenever a credential exists.
pub struct BearerAuth {
    store: Arc<dyn CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestDecorator for BearerAuth {
    fn decorate(
        &self,
        request: &mut reqwest::Request,
        ctx: &mut RequestContext,
    ) -> Result<(), ClientError> {
        if ctx.attached.is_none() {
            ctx.attached = self.store.load();
        }
        let Some(credential) = &ctx.attached else {
            return Ok(());
        };

        let mut value = HeaderValue::from_str(&credential.bearer()).map_err(|e| {
            ClientError::Credential(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Expires the session on any 401, whichever call produced it.
///
/// The caller still receives `ClientError::Unauthorized` afterwards, so its
/// own error path runs too.
pub struct UnauthorizedGuard {
    session: Arc<SessionCore>,
}

impl UnauthorizedGuard {
    pub fn new(session: Arc<SessionCore>) -> Self {
        Self { session }
    }
}

impl ResponseGuard for UnauthorizedGuard {
    fn inspect(&self, status: StatusCode, ctx: &RequestContext) {
        if status != StatusCode::UNAUTHORIZED {
            return;
        }
        tracing::warn!(method = %ctx.method, path = %ctx.path, "received 401, expiring session");
        self.session
            .expire(ctx.attached.as_ref(), EndReason::Unauthorized);
    }
}
