//! Authenticated HTTP client for one HSDP API family
//!
//! [`ServiceClient`] sends requests with the current bearer token and turns
//! every round-trip into a [`CallAttempt`]; [`HsdpClientFactory`] resolves
//! endpoints and performs the initial token exchange.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use hsdp_core::client::{ApiClient, ApiFamily, ClientFactory, ClientRequest};
use hsdp_core::config::GlobalConfig;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::provider::BoxFuture;
use hsdp_core::retry::{
    CallAttempt, RetryPolicy, TokenRefresh, check_for_permission_errors, retry_with_backoff,
    try_http_call,
};

use crate::auth::{AccessToken, Authenticator};
use crate::endpoints;

/// Longest error body quoted in a message
const MAX_ERROR_BODY: usize = 256;

/// Tokens this close to expiry are renewed before the next request
const TOKEN_EXPIRY_GRACE_SECS: i64 = 60;

/// One request, reusable across attempts
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    /// Path relative to the client's endpoint, or an absolute URL
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    form: Option<Vec<(String, String)>>,
    headers: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            form: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.form = Some(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn api_version(self, version: &str) -> Self {
        self.header("Api-Version", version)
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when empty or not JSON
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn decode<T: DeserializeOwned>(&self) -> ProviderResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Best human-readable message in an error body
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            json.pointer("/issue/0/details/text"),
            json.pointer("/issue/0/diagnostics"),
            json.get("error_description"),
            json.get("message"),
            json.pointer("/errors/0/message"),
            json.get("error"),
        ];
        if let Some(msg) = candidates
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .find(|s| !s.is_empty())
        {
            return msg.to_string();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        return reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string();
    }
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Authenticated client for one API family
pub struct ServiceClient {
    family: ApiFamily,
    http: reqwest::Client,
    endpoint: String,
    auth: Authenticator,
    token: RwLock<AccessToken>,
    retry: RetryPolicy,
    organization: Option<String>,
    released: AtomicBool,
}

impl ServiceClient {
    pub fn new(
        family: ApiFamily,
        http: reqwest::Client,
        endpoint: String,
        auth: Authenticator,
        token: AccessToken,
        retry: RetryPolicy,
        organization: Option<String>,
    ) -> Self {
        Self {
            family,
            http,
            endpoint,
            auth,
            token: RwLock::new(token),
            retry,
            organization,
            released: AtomicBool::new(false),
        }
    }

    /// Organization the token is scoped to, if any
    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Base URL of the authorization server
    pub fn iam_url(&self) -> &str {
        self.auth.iam_url()
    }

    pub async fn access_token(&self) -> String {
        self.token.read().await.value().to_string()
    }

    /// Current token, renewed first when it is about to expire. A failed
    /// renewal keeps the old token; the server's 401 then drives the retry.
    async fn fresh_token(&self) -> String {
        let grace = chrono::Duration::seconds(TOKEN_EXPIRY_GRACE_SECS);
        let expires_at = {
            let token = self.token.read().await;
            if !token.is_expired(grace) {
                return token.value().to_string();
            }
            token.expires_at()
        };
        debug!(
            "{} access token expires at {}, renewing",
            self.family,
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Err(e) = self.refresh_token().await {
            warn!("early token renewal failed: {}", e);
        }
        self.access_token().await
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
        }
    }

    /// One HTTP round-trip
    pub async fn attempt(&self, request: &ApiRequest) -> CallAttempt<ApiResponse> {
        if self.is_released() {
            return CallAttempt::no_response(ProviderError::validation(format!(
                "{} client used after release",
                self.family
            )));
        }

        let token = self.fresh_token().await;
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(token)
            .header("Accept", "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        } else if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return CallAttempt::no_response(ProviderError::Transport(e.to_string())),
        };
        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return CallAttempt::failed(status, ProviderError::Transport(e.to_string()));
            }
        };

        if !(200..300).contains(&status) {
            return CallAttempt::failed(
                status,
                ProviderError::http(status, error_message(status, &text)),
            );
        }
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };
        CallAttempt::ok(status, ApiResponse { status, body })
    }

    /// Send under the client's bounded-attempts policy
    pub async fn call(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> ProviderResult<ApiResponse> {
        self.call_with(&self.retry, cancel, request).await
    }

    /// Send under an explicit bounded-attempts policy
    pub async fn call_with(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> ProviderResult<ApiResponse> {
        let this = self;
        let request = &request;
        try_http_call(policy, self, cancel, move || this.attempt(request)).await
    }

    /// Send under the permanent-marker policy: 401 and 403 refresh the token
    /// and retry, statuses above 500 retry, everything else stops
    pub async fn call_marked(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> ProviderResult<ApiResponse> {
        let this = self;
        let request = &request;
        retry_with_backoff(&self.retry, cancel, move || async move {
            let attempt = this.attempt(request).await;
            match attempt.result {
                Ok(response) => Ok(response),
                Err(e) => {
                    Err(check_for_permission_errors(this, cancel, attempt.response, e).await)
                }
            }
        })
        .await
    }
}

impl TokenRefresh for ServiceClient {
    fn refresh_token(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            let token = self.auth.exchange().await?;
            *self.token.write().await = token;
            debug!("refreshed {} access token", self.family);
            Ok(())
        })
    }
}

impl ApiClient for ServiceClient {
    fn family(&self) -> ApiFamily {
        self.family
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!("released {} client for {}", self.family, self.endpoint);
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Builds [`ServiceClient`]s from the provider configuration
#[derive(Clone)]
pub struct HsdpClientFactory {
    config: Arc<GlobalConfig>,
    http: reqwest::Client,
}

impl HsdpClientFactory {
    pub fn new(config: Arc<GlobalConfig>) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hsdp-provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Endpoint precedence: call-site attribute, principal, configured
    /// family URL, inferred from region and environment
    fn endpoint_for(&self, request: &ClientRequest<'_>) -> ProviderResult<String> {
        let creds = request.credentials;
        let url = match request
            .endpoint
            .or(creds.endpoint.as_deref())
            .or(self.config.endpoint(request.family))
        {
            Some(url) => url.to_string(),
            None => endpoints::infer(request.family, &creds.region, &creds.environment),
        };
        endpoints::validate(&url)
    }

    fn iam_url_for(&self, request: &ClientRequest<'_>) -> ProviderResult<String> {
        let creds = request.credentials;
        let url = match &self.config.iam_url {
            Some(url) => url.clone(),
            None => endpoints::infer_iam(&creds.region, &creds.environment),
        };
        endpoints::validate(&url)
    }
}

impl ClientFactory for HsdpClientFactory {
    type Client = ServiceClient;

    fn connect<'a>(
        &'a self,
        request: ClientRequest<'a>,
    ) -> BoxFuture<'a, ProviderResult<ServiceClient>> {
        Box::pin(async move {
            let endpoint = self.endpoint_for(&request)?;
            let iam_url = self.iam_url_for(&request)?;
            let auth = Authenticator::new(
                self.http.clone(),
                iam_url,
                request.credentials.credentials.clone(),
                request.credentials.oauth_client.clone(),
            );
            let token = auth.exchange().await?;
            info!("connected {} client to {}", request.family, endpoint);
            Ok(ServiceClient::new(
                request.family,
                self.http.clone(),
                endpoint,
                auth,
                token,
                self.config.retry.clone(),
                request.credentials.organization.clone(),
            ))
        })
    }
}
