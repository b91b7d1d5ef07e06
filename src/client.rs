use std::{fmt, sync::Arc, time::Duration};

use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Body, Method, Request, Url,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    augment::apply_credential,
    classify::{server_message, FailureSignal},
    events::{ApiErrorEvent, ErrorBroadcaster, SubscriptionId},
    request::IDEMPOTENCY_KEY_HEADER,
    retry::{self, Call},
    ApiError, ClientOptions, CredentialProvider, NoCredentials, RequestDescriptor, Result,
    StaticToken,
};

/// Fixed path prefix of every backend route.
pub const API_BASE_PATH: &str = "/api";

/// A descriptor turned into the parts replayed by every attempt.
struct PreparedRequest {
    method: Method,
    url: String,
    target: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    retry_eligible: bool,
}

#[derive(Clone)]
/// Shared HTTP client for the dashboard backend.
///
/// Attaches the bearer credential to every attempt, retries transient
/// failures with exponential backoff and publishes an [`ApiErrorEvent`] for
/// every call that fails terminally.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    events: ErrorBroadcaster,
    options: ClientOptions,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("credentials", &"<redacted>")
            .field("events", &self.events)
            .field("options", &self.options)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client that sends no credential.
    ///
    /// `base_url` is the backend origin, e.g. `"https://admin.example.com"`;
    /// requests go to `<base_url>/api<path>`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_credentials(base_url, NoCredentials)
    }

    /// Creates a client reading its bearer credential from `provider` before
    /// every attempt.
    pub fn with_credentials<P>(base_url: impl Into<String>, provider: P) -> Self
    where
        P: CredentialProvider + 'static,
    {
        Self {
            http: default_http_client(),
            base_url: base_url.into(),
            credentials: Arc::new(provider),
            events: ErrorBroadcaster::new(),
            options: ClientOptions::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `DASHBOARD_API_URL`: backend origin (required)
    /// - `DASHBOARD_API_TOKEN`: static bearer token (optional)
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("DASHBOARD_API_URL")
            .map_err(|_| "missing DASHBOARD_API_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("DASHBOARD_API_URL is set but empty".to_owned());
        }
        match std::env::var("DASHBOARD_API_TOKEN") {
            Ok(token) if !token.trim().is_empty() => {
                Ok(Self::with_credentials(url, StaticToken::new(token)))
            }
            _ => Ok(Self::new(url)),
        }
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Replaces the underlying `reqwest` client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Failure notification channel of this client. Clones of the client share it.
    pub fn events(&self) -> &ErrorBroadcaster {
        &self.events
    }

    /// Shorthand for `self.events().subscribe(listener)`.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ApiErrorEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Full URL of an API path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        if path.is_empty() || path.starts_with('/') {
            format!("{base}{API_BASE_PATH}{path}")
        } else {
            format!("{base}{API_BASE_PATH}/{path}")
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.send(RequestDescriptor::post(path).json(body)?).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.send(RequestDescriptor::put(path).json(body)?).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.send(RequestDescriptor::patch(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(RequestDescriptor::delete(path)).await
    }

    /// Sends a request and returns the decoded response body.
    ///
    /// JSON bodies are returned as-is, empty bodies as `Null` and anything
    /// else as a `String`.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Value> {
        self.dispatch(request, None).await
    }

    /// Like [`ApiClient::send`], aborting when `cancel` fires.
    ///
    /// A cancelled call returns [`ApiError::Cancelled`] and publishes no event.
    pub async fn send_with_cancel(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.dispatch(request, Some(cancel)).await
    }

    /// Sends a request and deserializes the response body into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        let value = self.send(request).await?;
        serde_json::from_value(value)
            .map_err(|err| ApiError::Decode(format!("unexpected response body: {err}")))
    }

    async fn dispatch(
        &self,
        request: RequestDescriptor,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let prepared = self.prepare(request)?;
        let call = Call {
            url: &prepared.url,
            retry_eligible: prepared.retry_eligible,
            cancel,
        };
        retry::run(&self.options.retry, &self.events, call, |_attempt| {
            self.send_attempt(&prepared)
        })
        .await
    }

    fn prepare(&self, request: RequestDescriptor) -> Result<PreparedRequest> {
        let url = self.url_for(&request.path);
        let target = Url::parse(&url)
            .map_err(|err| ApiError::InvalidRequest(format!("invalid url '{url}': {err}")))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(ApiError::InvalidRequest(format!(
                "unsupported url scheme '{}' in '{url}'",
                target.scheme()
            )));
        }

        let retry_eligible = request.retry_eligible(self.options.retry.retry_non_idempotent);
        let mut headers = request.headers;
        headers
            .entry(header::ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        if let Some(key) = &request.idempotency_key {
            let value = HeaderValue::from_str(key).map_err(|err| {
                ApiError::InvalidRequest(format!("invalid idempotency key: {err}"))
            })?;
            headers.insert(IDEMPOTENCY_KEY_HEADER, value);
        }

        let body = match &request.body {
            Some(value) => {
                headers
                    .entry(header::CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/json"));
                let bytes = serde_json::to_vec(value).map_err(|err| {
                    ApiError::InvalidRequest(format!("body is not serializable: {err}"))
                })?;
                Some(bytes)
            }
            None => None,
        };

        Ok(PreparedRequest {
            method: request.method,
            url,
            target,
            headers,
            body,
            retry_eligible,
        })
    }

    /// Executes one physical attempt. The credential is read anew every time.
    ///
    /// The request is assembled from the already validated URL, so every
    /// error from `execute` means nothing usable came back.
    async fn send_attempt(
        &self,
        prepared: &PreparedRequest,
    ) -> std::result::Result<Value, FailureSignal> {
        let mut request = Request::new(prepared.method.clone(), prepared.target.clone());
        *request.headers_mut() = prepared.headers.clone();
        apply_credential(request.headers_mut(), self.credentials.as_ref());
        *request.timeout_mut() = Some(Duration::from_millis(self.options.timeout_ms));
        *request.body_mut() = prepared.body.clone().map(Body::from);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|err| FailureSignal::no_response(err.to_string()))?;
        let status = response.status();
        let body = response.text().await;

        if !status.is_success() {
            // The status line arrived; a truncated error body only loses the message.
            return Err(FailureSignal::Status {
                status: status.as_u16(),
                message: body.ok().as_deref().and_then(server_message),
            });
        }

        let body = body.map_err(|err| FailureSignal::no_response(err.to_string()))?;
        Ok(decode_body(&body))
    }
}

/// HTTP client with a cookie store, so session cookies travel with every call.
fn default_http_client() -> reqwest::Client {
    match reqwest::Client::builder().cookie_store(true).build() {
        Ok(http) => http,
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("cookie-enabled http client unavailable, falling back: {err}");
            #[cfg(not(feature = "tracing"))]
            let _ = err;
            reqwest::Client::new()
        }
    }
}

fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_owned()))
}
