//! HTTP transport seam
//!
//! [`ApiClient`](crate::ApiClient) never touches reqwest directly: it hands a
//! fully built [`TransportRequest`] to a [`Transport`] and gets back either
//! the raw response or a [`TransportError`]. Production uses
//! [`ReqwestTransport`]; tests substitute scripted transports.
//!
//! Uses `Pin<Box<dyn Future>>` return types so the client can hold an
//! `Arc<dyn Transport>`.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

/// Request body. JSON is serialized by the transport; a multipart form lets
/// the transport pick the boundary and `Content-Type`.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Form(MultipartForm),
}

/// Multipart form that can be re-sent on retry.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::File {
                file_name: file_name.into(),
                content_type: content_type.map(str::to_owned),
                bytes: bytes.into(),
            },
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    fn into_reqwest(self) -> Result<reqwest::multipart::Form, TransportError> {
        let mut form = reqwest::multipart::Form::new();
        for part in self.parts {
            form = match part.value {
                FormValue::Text(text) => form.text(part.name, text),
                FormValue::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let mut file = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name);
                    if let Some(content_type) = content_type {
                        file = file.mime_str(&content_type).map_err(|e| {
                            TransportError::other(format!("invalid content type {content_type}: {e}"))
                        })?;
                    }
                    form.part(part.name, file)
                }
            };
        }
        Ok(form)
    }
}

/// One attempt's worth of request, ready to send.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

/// Raw response; the client decides how to parse the body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Why a request produced no HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The per-request timeout elapsed
    Timeout,
    /// Connection, DNS or TLS failure
    Network,
    /// Rejected by cross-origin policy
    Cors,
    /// Anything else (malformed request, body errors)
    Other,
}

impl TransportErrorKind {
    /// Name reported in the failure's `error` field and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Cors => "cors",
            Self::Other => "transport",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Network)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn cors(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Cors, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() || e.is_request() {
            TransportErrorKind::Network
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// Sends a single HTTP request. Retries and timeouts belong to the client.
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            Some(RequestBody::Json(value)) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| TransportError::other(format!("serializing body: {e}")))?;
                builder.body(bytes)
            }
            Some(RequestBody::Form(form)) => builder.multipart(form.into_reqwest()?),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}
