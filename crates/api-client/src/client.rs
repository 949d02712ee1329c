//! Backend API client
//!
//! Single point of HTTP egress for the dashboard. Each call:
//! 1. builds the absolute URL and headers (bearer token unless `skip_auth`)
//! 2. sends through the [`Transport`] under the per-call timeout
//! 3. parses the body (JSON when the response says so, else `{message: text}`)
//! 4. classifies failures, signs out inactive accounts, and retries
//!    retryable failures after a flat delay while the retry budget lasts
//!
//! Every path ends in an [`ApiResult`]; the client never panics or returns a
//! bare error to its caller.

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde_json::{Value, json};
use storage::{AuthStorage, StorageManager, expired_auth_cookie};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::classify::{
    AuthFailure, classify_auth_failure, classify_transport_error, is_retryable_status,
    transport_failure_message,
};
use crate::config::{BackendOrigin, health_url_for};
use crate::envelope::{ApiFailure, ApiResult, ApiSuccess};
use crate::metrics;
use crate::navigator::{LoggingNavigator, LoginRoutes, Navigator};
use crate::transport::{
    MultipartForm, ReqwestTransport, RequestBody, Transport, TransportError, TransportRequest,
    TransportResponse,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Flat delay between attempts. No exponential growth, no jitter.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Source of the bearer token for requests without an explicit one.
pub type TokenGetter = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Query parameters in insertion order; `null` values are skipped.
    pub params: Vec<(String, Value)>,
    pub data: Option<RequestBody>,
    /// Overrides the token getter for this call.
    pub token: Option<Secret<String>>,
    pub skip_auth: bool,
    pub headers: Vec<(String, String)>,
    /// `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// Extra attempts allowed after the first one.
    pub retries: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            params: Vec::new(),
            data: None,
            token: None,
            skip_auth: false,
            headers: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            retries: 0,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.data = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, form: MultipartForm) -> Self {
        self.data = Some(RequestBody::Form(form));
        self
    }

    pub fn token(mut self, token: impl Into<Secret<String>>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn is_form_data(&self) -> bool {
        matches!(self.data, Some(RequestBody::Form(_)))
    }
}

/// Backend API client. Share it behind an `Arc`.
pub struct ApiClient {
    base_url: String,
    token_getter: RwLock<TokenGetter>,
    auth: AuthStorage,
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
    routes: LoginRoutes,
    retry_delay: Duration,
}

impl ApiClient {
    /// Start building a client for `origin` (calls go to `<origin>/api/v1`).
    pub fn builder(origin: &BackendOrigin) -> ApiClientBuilder {
        ApiClientBuilder::new(origin.base_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the token source. Requests already past header building keep
    /// the token they resolved.
    pub fn set_token_getter<F>(&self, getter: F)
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let mut slot = self
            .token_getter
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(getter);
    }

    fn current_token(&self) -> Option<String> {
        let getter = self
            .token_getter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        getter()
    }

    /// Absolute URL for `endpoint` with `params` appended as query pairs.
    pub fn build_url(&self, endpoint: &str, params: &[(String, Value)]) -> Result<Url, ApiFailure> {
        let endpoint = endpoint.trim_start_matches('/');
        let raw = format!("{}/{endpoint}", self.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| {
            ApiFailure::transport(format!("invalid request URL: {e}"), "invalid_url", raw.clone())
        })?;

        let mut present = params
            .iter()
            .filter_map(|(key, value)| query_value(value).map(|value| (key, value)))
            .peekable();
        if present.peek().is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in present {
                pairs.append_pair(key, &value);
            }
        }
        Ok(url)
    }

    /// Request headers: JSON content type unless sending a form, custom
    /// headers, then the bearer token unless `skip_auth`.
    pub fn build_headers(
        &self,
        token: Option<&Secret<String>>,
        skip_auth: bool,
        is_form_data: bool,
        custom: &[(String, String)],
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !is_form_data {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for (name, value) in custom {
            let name = match HeaderName::from_str(name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if is_form_data && name == CONTENT_TYPE {
                debug!("dropping content-type override on multipart request");
                continue;
            }
            let value = match HeaderValue::from_str(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.insert(name, value);
        }

        if skip_auth {
            return headers;
        }

        let token = match token {
            Some(token) if !token.is_blank() => Some(token.expose().clone()),
            _ => self.current_token(),
        };
        match token.filter(|t| !t.is_empty()) {
            Some(token) => match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "token is not a valid header value, sending unauthenticated"),
            },
            None => debug!("no auth token available, sending unauthenticated request"),
        }
        headers
    }

    /// Issue a request and resolve it to an [`ApiResult`].
    #[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4().as_simple(), method = %options.method, endpoint = %endpoint))]
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> ApiResult {
        let url = self.build_url(endpoint, &options.params)?;
        let headers = self.build_headers(
            options.token.as_ref(),
            options.skip_auth,
            options.is_form_data(),
            &options.headers,
        );
        let body = if options.method == Method::GET {
            None
        } else {
            options.data.clone()
        };

        let mut retries_left = options.retries;
        let mut attempt = 1u32;
        loop {
            let request = TransportRequest {
                method: options.method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
            };
            debug!(attempt, %url, "sending request");

            let started = Instant::now();
            match self.send_with_timeout(request, options.timeout).await {
                Ok(response) => {
                    let status = response.status;
                    metrics::record_request(
                        options.method.as_str(),
                        status.as_u16(),
                        started.elapsed().as_secs_f64(),
                    );
                    let data = parse_body(&response);
                    if status.is_success() {
                        debug!(attempt, status = status.as_u16(), "request succeeded");
                        return Ok(ApiSuccess {
                            status: status.as_u16(),
                            data,
                        });
                    }

                    let failure = self.http_failure(status, data);
                    if is_retryable_status(status.as_u16()) && retries_left > 0 {
                        warn!(attempt, status = status.as_u16(), retries_left, "retryable status, retrying");
                        metrics::record_retry(status.as_str());
                        tokio::time::sleep(self.retry_delay).await;
                        retries_left -= 1;
                        attempt += 1;
                        continue;
                    }
                    debug!(attempt, status = status.as_u16(), message = %failure.message, "request failed");
                    return Err(failure);
                }
                Err(error) => {
                    let kind = classify_transport_error(&error);
                    metrics::record_transport_error(kind.name());
                    if kind.is_retryable() && retries_left > 0 {
                        warn!(attempt, error = %error, kind = kind.name(), retries_left, "transport error, retrying");
                        metrics::record_retry(kind.name());
                        tokio::time::sleep(self.retry_delay).await;
                        retries_left -= 1;
                        attempt += 1;
                        continue;
                    }
                    warn!(attempt, error = %error, kind = kind.name(), %url, "request failed without response");
                    return Err(ApiFailure::transport(
                        transport_failure_message(&error, kind),
                        kind.name(),
                        url.as_str(),
                    ));
                }
            }
        }
    }

    async fn send_with_timeout(
        &self,
        request: TransportRequest,
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        let Some(limit) = timeout else {
            return self.transport.send(request).await;
        };
        match tokio::time::timeout(limit, self.transport.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::timeout(format!(
                "Request timed out after {} ms",
                limit.as_millis()
            ))),
        }
    }

    /// Failure for a non-2xx response, including inactive-account sign-out.
    fn http_failure(&self, status: StatusCode, data: Value) -> ApiFailure {
        let message = ["message", "error"]
            .iter()
            .find_map(|field| {
                data.get(field)
                    .and_then(Value::as_str)
                    .filter(|message| !message.trim().is_empty())
            })
            .map(str::to_owned)
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                )
            });

        let auth = classify_auth_failure(status.as_u16(), &message, &data);
        if auth == Some(AuthFailure::InactiveAccount) {
            self.sign_out_inactive_account();
        }

        let mut failure = ApiFailure::http(status.as_u16(), message, data);
        failure.auth = auth;
        failure
    }

    fn sign_out_inactive_account(&self) {
        self.auth.clear_tokens();
        self.navigator.set_cookie(&expired_auth_cookie());
        let location = self
            .routes
            .inactive_account_redirect(&self.navigator.current_path());
        info!(%location, "account inactive, session cleared");
        self.navigator.redirect(&location);
    }

    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> ApiResult {
        self.request(endpoint, RequestOptions { method: Method::GET, ..options }).await
    }

    pub async fn post(&self, endpoint: &str, data: Value, options: RequestOptions) -> ApiResult {
        self.request(endpoint, RequestOptions { method: Method::POST, ..options }.json(data))
            .await
    }

    pub async fn put(&self, endpoint: &str, data: Value, options: RequestOptions) -> ApiResult {
        self.request(endpoint, RequestOptions { method: Method::PUT, ..options }.json(data))
            .await
    }

    pub async fn patch(&self, endpoint: &str, data: Value, options: RequestOptions) -> ApiResult {
        self.request(endpoint, RequestOptions { method: Method::PATCH, ..options }.json(data))
            .await
    }

    pub async fn delete(&self, endpoint: &str, options: RequestOptions) -> ApiResult {
        self.request(endpoint, RequestOptions { method: Method::DELETE, ..options })
            .await
    }

    /// POST a multipart form.
    pub async fn upload(
        &self,
        endpoint: &str,
        form: MultipartForm,
        options: RequestOptions,
    ) -> ApiResult {
        self.request(endpoint, RequestOptions { method: Method::POST, ..options }.form(form))
            .await
    }

    /// GET `<origin>/health` without auth. Success comes from the status
    /// code alone; no retries, no auth handling.
    #[instrument(skip_all)]
    pub async fn health_check(&self) -> ApiResult {
        let raw = health_url_for(&self.base_url);
        let url = Url::parse(&raw).map_err(|e| {
            ApiFailure::transport(format!("invalid health URL: {e}"), "invalid_url", raw.clone())
        })?;
        let request = TransportRequest {
            method: Method::GET,
            url: url.clone(),
            headers: HeaderMap::new(),
            body: None,
        };

        let started = Instant::now();
        match self.send_with_timeout(request, Some(DEFAULT_TIMEOUT)).await {
            Ok(response) => {
                let status = response.status;
                metrics::record_request("GET", status.as_u16(), started.elapsed().as_secs_f64());
                let data = parse_body(&response);
                if status.is_success() {
                    Ok(ApiSuccess {
                        status: status.as_u16(),
                        data,
                    })
                } else {
                    warn!(status = status.as_u16(), "health check returned non-success status");
                    Err(ApiFailure::http(
                        status.as_u16(),
                        format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown Status")
                        ),
                        data,
                    ))
                }
            }
            Err(error) => {
                let kind = classify_transport_error(&error);
                metrics::record_transport_error(kind.name());
                warn!(error = %error, kind = kind.name(), "health check failed");
                Err(ApiFailure::transport(
                    transport_failure_message(&error, kind),
                    kind.name(),
                    url.as_str(),
                ))
            }
        }
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    base_url: String,
    auth: Option<AuthStorage>,
    transport: Option<Arc<dyn Transport>>,
    navigator: Option<Arc<dyn Navigator>>,
    routes: LoginRoutes,
    retry_delay: Duration,
    token_getter: Option<TokenGetter>,
}

impl ApiClientBuilder {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            auth: None,
            transport: None,
            navigator: None,
            routes: LoginRoutes::default(),
            retry_delay: RETRY_DELAY,
            token_getter: None,
        }
    }

    /// Session store used for the default token getter and for sign-out.
    pub fn auth(mut self, auth: AuthStorage) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn login_routes(mut self, routes: LoginRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn token_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.token_getter = Some(Arc::new(getter));
        self
    }

    pub fn build(self) -> ApiClient {
        let auth = self
            .auth
            .unwrap_or_else(|| AuthStorage::new(StorageManager::unavailable()));
        let token_getter = self.token_getter.unwrap_or_else(|| {
            let auth = auth.clone();
            Arc::new(move || auth.get_access_token())
        });

        ApiClient {
            base_url: self.base_url.trim_end_matches('/').to_owned(),
            token_getter: RwLock::new(token_getter),
            auth,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::default())),
            navigator: self
                .navigator
                .unwrap_or_else(|| Arc::new(LoggingNavigator::default())),
            routes: self.routes,
            retry_delay: self.retry_delay,
        }
    }
}

/// Query-string rendering of a parameter; `None` for null.
fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// JSON when the response declares it and parses; otherwise `{message: text}`.
fn parse_body(response: &TransportResponse) -> Value {
    let is_json = response
        .content_type()
        .is_some_and(|content_type| content_type.contains("json"));
    if is_json {
        match serde_json::from_slice(&response.body) {
            Ok(value) => return value,
            Err(e) => debug!(error = %e, "response declared JSON but did not parse"),
        }
    }
    json!({ "message": response.text() })
}
