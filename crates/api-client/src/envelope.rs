//! Call outcomes
//!
//! Every client call resolves to an [`ApiResult`]; nothing is thrown past
//! the client. `status == 0` on a failure means no HTTP response arrived.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::classify::AuthFailure;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiSuccess {
    pub status: u16,
    pub data: Value,
}

impl ApiSuccess {
    /// Decode `data` into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiFailure {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 401/403 sub-classification, for callers that surface pending approval.
    #[serde(skip)]
    pub auth: Option<AuthFailure>,
}

impl ApiFailure {
    pub fn http(status: u16, message: impl Into<String>, data: Value) -> Self {
        Self {
            status,
            message: message.into(),
            data: Some(data),
            error: None,
            url: None,
            auth: None,
        }
    }

    pub fn transport(message: impl Into<String>, error: &str, url: impl Into<String>) -> Self {
        Self {
            status: 0,
            message: message.into(),
            data: None,
            error: Some(error.to_owned()),
            url: Some(url.into()),
            auth: None,
        }
    }

    /// True when no HTTP response was received.
    pub fn is_transport(&self) -> bool {
        self.status == 0
    }

    pub fn is_pending_approval(&self) -> bool {
        self.auth == Some(AuthFailure::PendingApproval)
    }
}

pub type ApiResult = Result<ApiSuccess, ApiFailure>;

/// Render a result in the `{success, status, ...}` wire shape.
pub fn envelope(result: &ApiResult) -> Value {
    let (success, body) = match result {
        Ok(success) => (true, serde_json::to_value(success)),
        Err(failure) => (false, serde_json::to_value(failure)),
    };
    let mut body = body.unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut body {
        map.insert("success".into(), Value::Bool(success));
    }
    body
}
