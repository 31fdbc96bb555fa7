//! REST client with an explicit middleware pipeline.
//!
//! `ApiClient` is built once and cloned into every call site; clones share
//! one connection pool and one decorator/guard chain. Endpoint wrappers live
//! in [`crate::api`] as `impl ApiClient` blocks.

pub mod middleware;

use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::credential::Credential;
use crate::errors::ClientError;

pub use middleware::{
    BearerAuth, RequestContext, RequestDecorator, ResponseGuard, UnauthorizedGuard,
};

const DEFAULT_USER_AGENT: &str = concat!("trellis/", env!("CARGO_PKG_VERSION"));

/// Retry policy for idempotent reads.
///
/// Reads retry on transport failures and 5xx responses only. Writes are
/// never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    pub retries: u32,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self { retries: 1 }
    }
}

impl ReadPolicy {
    pub fn none() -> Self {
        Self { retries: 0 }
    }

    pub fn is_retryable(err: &ClientError) -> bool {
        match err {
            ClientError::Transport(_) => true,
            ClientError::Api { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    decorators: Vec<Arc<dyn RequestDecorator>>,
    guards: Vec<Arc<dyn ResponseGuard>>,
    read_policy: ReadPolicy,
}

pub struct ApiClientBuilder {
    base_url: String,
    user_agent: String,
    decorators: Vec<Arc<dyn RequestDecorator>>,
    guards: Vec<Arc<dyn ResponseGuard>>,
    read_policy: ReadPolicy,
}

impl ApiClientBuilder {
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn guard(mut self, guard: Arc<dyn ResponseGuard>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = Url::parse(&self.base_url).map_err(|source| ClientError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        })?;
        let http = reqwest::Client::builder()
            .user_agent(self.user_agent)
            .build()
            .map_err(ClientError::Transport)?;

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                base_url,
                decorators: self.decorators,
                guards: self.guards,
                read_policy: self.read_policy,
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            decorators: Vec::new(),
            guards: Vec::new(),
            read_policy: ReadPolicy::default(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|source| ClientError::InvalidUrl {
                url: path.to_string(),
                source,
            })
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let builder = self.inner.http.get(self.url(path)?);
        self.send_json(builder, RequestContext::new(Method::GET, path))
            .await
    }

    /// GET with a pinned credential, sent exactly once.
    pub(crate) async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        credential: &Credential,
    ) -> Result<T, ClientError> {
        let builder = self.inner.http.get(self.url(path)?);
        let ctx = RequestContext::new(Method::GET, path)
            .with_credential(credential.clone())
            .without_retry();
        self.send_json(builder, ctx).await
    }

    pub(crate) async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let builder = self.inner.http.get(self.url(path)?).query(query);
        self.send_json(builder, RequestContext::new(Method::GET, path))
            .await
    }

    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.inner.http.post(self.url(path)?).json(body);
        self.send_json(builder, RequestContext::new(Method::POST, path))
            .await
    }

    pub(crate) async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.inner.http.put(self.url(path)?).json(body);
        self.send_json(builder, RequestContext::new(Method::PUT, path))
            .await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let builder = self.inner.http.delete(self.url(path)?);
        let request = builder.build().map_err(ClientError::Transport)?;
        self.run(request, RequestContext::new(Method::DELETE, path))
            .await
            .map(|_| ())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<T, ClientError> {
        let path = ctx.path.clone();
        let request = builder.build().map_err(ClientError::Transport)?;
        let response = self.run(request, ctx).await?;
        let bytes = response.bytes().await.map_err(ClientError::Transport)?;
        serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode { path, source })
    }

    /// Execute with the read retry policy applied.
    async fn run(
        &self,
        request: reqwest::Request,
        ctx: RequestContext,
    ) -> Result<reqwest::Response, ClientError> {
        let retries = if ctx.is_retryable() {
            self.inner.read_policy.retries
        } else {
            0
        };
        let mut attempt = 0;

        loop {
            let Some(this_try) = request.try_clone() else {
                return self.dispatch(request, ctx).await;
            };
            match self.dispatch(this_try, ctx.clone()).await {
                Err(e) if attempt < retries && ReadPolicy::is_retryable(&e) => {
                    attempt += 1;
                    tracing::debug!(path = %ctx.path, attempt, error = %e, "retrying read");
                }
                other => return other,
            }
        }
    }

    async fn dispatch(
        &self,
        mut request: reqwest::Request,
        mut ctx: RequestContext,
    ) -> Result<reqwest::Response, ClientError> {
        for decorator in &self.inner.decorators {
            decorator.decorate(&mut request, &mut ctx)?;
        }

        tracing::debug!(method = %ctx.method, path = %ctx.path, "sending request");
        let response = self
            .inner
            .http
            .execute(request)
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        for guard in &self.inner.guards {
            guard.inspect(status, &ctx);
        }

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(status, &body);
        tracing::debug!(method = %ctx.method, path = %ctx.path, %status, %detail, "request rejected");
        if status == StatusCode::UNAUTHORIZED {
            Err(ClientError::Unauthorized { detail })
        } else {
            Err(ClientError::Api { status, detail })
        }
    }
}

/// Pull the human-readable message out of an error body.
///
/// Prefers `detail` (string, or the raw JSON when it is a validation list),
/// then `error`, then `message`, then the raw body, then the status reason.
pub fn error_detail(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_detail_string() {
        let body = r#"{"detail": "Incorrect email or password"}"#;
        assert_eq!(
            error_detail(StatusCode::BAD_REQUEST, body),
            "Incorrect email or password"
        );
    }

    #[test]
    fn test_error_detail_serializes_validation_list() {
        let body = r#"{"detail": [{"loc": ["body", "email"], "msg": "field required"}]}"#;
        let detail = error_detail(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert!(detail.contains("field required"));
    }

    #[test]
    fn test_error_detail_falls_back_to_error_key() {
        let body = r#"{"error": "Project 3 not found"}"#;
        assert_eq!(error_detail(StatusCode::NOT_FOUND, body), "Project 3 not found");
    }

    #[test]
    fn test_error_detail_plain_text_body() {
        assert_eq!(
            error_detail(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "upstream down"
        );
    }

    #[test]
    fn test_error_detail_empty_body_uses_reason() {
        assert_eq!(error_detail(StatusCode::FORBIDDEN, ""), "Forbidden");
    }

    #[test]
    fn test_read_policy_retries_server_errors_only() {
        let server = ClientError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: "busy".into(),
        };
        let client = ClientError::Api {
            status: StatusCode::NOT_FOUND,
            detail: "missing".into(),
        };
        let unauthorized = ClientError::Unauthorized {
            detail: "expired".into(),
        };
        assert!(ReadPolicy::is_retryable(&server));
        assert!(!ReadPolicy::is_retryable(&client));
        assert!(!ReadPolicy::is_retryable(&unauthorized));
        assert_eq!(ReadPolicy::default().retries, 1);
    }

    #[test]
    fn test_builder_rejects_invalid_base_url() {
        let err = ApiClient::builder("not a url").build().err().unwrap();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn test_url_joins_absolute_api_paths() {
        let client = ApiClient::builder("http://localhost:8000").build().unwrap();
        assert_eq!(
            client.url("/api/tickets/7").unwrap().as_str(),
            "http://localhost:8000/api/tickets/7"
        );
    }
}
