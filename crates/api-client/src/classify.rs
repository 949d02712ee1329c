//! Failure classification
//!
//! The backend signals account state only through free-text messages, so
//! 401/403 handling sniffs the message for known phrases. All string
//! matching lives here, pinned by tests to the literal backend wording.
//!
//! - Retryable HTTP statuses: 408, 429, 500, 502, 503, 504.
//! - 401/403 split into unauthorized, inactive account, pending approval.
//! - Transport errors: timeouts and network failures are retryable,
//!   CORS-flavored failures never are.

use serde_json::Value;

use crate::transport::{TransportError, TransportErrorKind};

/// Statuses worth another attempt after the flat retry delay.
pub const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

const INACTIVE_PATTERNS: &[&str] = &["inactive", "deactivated", "account disabled"];

const PENDING_PATTERNS: &[&str] = &["pending", "approval"];

/// Message substituted for the browser's generic connection failure text.
pub const CONNECTION_FAILED_MESSAGE: &str =
    "Unable to reach the server. Check your connection and try again.";

/// Message substituted for bare CORS rejections.
pub const CORS_BLOCKED_MESSAGE: &str =
    "The request was blocked by the server's cross-origin policy. Please contact support.";

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Sub-classification of 401/403 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Bad or missing credentials; returned to the caller unchanged.
    Unauthorized,
    /// Account switched off by an admin; the session is cleared and the
    /// browser sent back to login.
    InactiveAccount,
    /// Account awaiting admin approval; the caller shows the message inline.
    PendingApproval,
}

/// Classify an auth failure from its status, resolved message and body.
///
/// Returns `None` for statuses other than 401 and 403. Pending approval wins
/// over inactive when both match.
pub fn classify_auth_failure(status: u16, message: &str, body: &Value) -> Option<AuthFailure> {
    if status != 401 && status != 403 {
        return None;
    }

    let lower = message.to_lowercase();
    let pending = body.get("isPendingApproval").and_then(Value::as_bool) == Some(true)
        || PENDING_PATTERNS.iter().any(|p| lower.contains(p));
    if pending {
        return Some(AuthFailure::PendingApproval);
    }

    if INACTIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(AuthFailure::InactiveAccount);
    }

    Some(AuthFailure::Unauthorized)
}

/// Final kind of a transport error, after looking at its message.
///
/// Anything mentioning CORS is treated as a CORS rejection. The generic
/// "Failed to fetch" text only counts as CORS when the transport could not
/// tell it was a plain network failure.
pub fn classify_transport_error(error: &TransportError) -> TransportErrorKind {
    if error.kind == TransportErrorKind::Cors || error.message.contains("CORS") {
        return TransportErrorKind::Cors;
    }
    if error.message.contains("Failed to fetch") && error.kind != TransportErrorKind::Network {
        return TransportErrorKind::Cors;
    }
    error.kind
}

/// Caller-facing message for a terminal transport failure.
pub fn transport_failure_message(error: &TransportError, kind: TransportErrorKind) -> String {
    if error.message.contains("Failed to fetch") {
        return CONNECTION_FAILED_MESSAGE.to_owned();
    }
    if kind == TransportErrorKind::Cors {
        return CORS_BLOCKED_MESSAGE.to_owned();
    }
    error.message.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} must be retryable");
        }
        for status in [200, 400, 401, 403, 404, 409, 422, 501] {
            assert!(!is_retryable_status(status), "{status} must not be retryable");
        }
    }

    #[test]
    fn non_auth_statuses_are_not_classified() {
        assert_eq!(classify_auth_failure(400, "Account deactivated", &json!({})), None);
        assert_eq!(classify_auth_failure(500, "pending", &json!({})), None);
    }

    #[test]
    fn deactivated_account_message() {
        let body = json!({"success": false, "message": "Your account has been deactivated. Please contact the administrator."});
        assert_eq!(
            classify_auth_failure(401, body["message"].as_str().unwrap(), &body),
            Some(AuthFailure::InactiveAccount)
        );
    }

    #[test]
    fn inactive_account_message() {
        assert_eq!(
            classify_auth_failure(403, "Account is inactive", &json!({})),
            Some(AuthFailure::InactiveAccount)
        );
        assert_eq!(
            classify_auth_failure(403, "Account disabled by admin", &json!({})),
            Some(AuthFailure::InactiveAccount)
        );
    }

    #[test]
    fn pending_approval_message() {
        assert_eq!(
            classify_auth_failure(
                401,
                "Your account is pending approval. Please wait for admin approval.",
                &json!({})
            ),
            Some(AuthFailure::PendingApproval)
        );
    }

    #[test]
    fn pending_flag_overrides_inactive_wording() {
        let body = json!({"message": "Account inactive", "isPendingApproval": true});
        assert_eq!(
            classify_auth_failure(401, "Account inactive", &body),
            Some(AuthFailure::PendingApproval)
        );
    }

    #[test]
    fn plain_unauthorized() {
        assert_eq!(
            classify_auth_failure(401, "Invalid or expired token", &json!({})),
            Some(AuthFailure::Unauthorized)
        );
        assert_eq!(
            classify_auth_failure(403, "HTTP 403: Forbidden", &json!({})),
            Some(AuthFailure::Unauthorized)
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(
            classify_auth_failure(401, "ACCOUNT DEACTIVATED", &json!({})),
            Some(AuthFailure::InactiveAccount)
        );
    }

    #[test]
    fn cors_flavored_errors() {
        let tagged = TransportError::cors("Failed to fetch");
        assert_eq!(classify_transport_error(&tagged), TransportErrorKind::Cors);

        let mentions = TransportError::other("Request blocked by CORS policy");
        assert_eq!(classify_transport_error(&mentions), TransportErrorKind::Cors);

        let generic = TransportError::other("Failed to fetch");
        assert_eq!(classify_transport_error(&generic), TransportErrorKind::Cors);
    }

    #[test]
    fn network_and_timeout_errors_keep_their_kind() {
        let network = TransportError::network("Failed to fetch");
        assert_eq!(classify_transport_error(&network), TransportErrorKind::Network);

        let refused = TransportError::network("connection refused");
        assert_eq!(classify_transport_error(&refused), TransportErrorKind::Network);

        let timeout = TransportError::timeout("Request timed out after 50 ms");
        assert_eq!(classify_transport_error(&timeout), TransportErrorKind::Timeout);
    }

    #[test]
    fn retryable_transport_kinds() {
        assert!(TransportErrorKind::Timeout.is_retryable());
        assert!(TransportErrorKind::Network.is_retryable());
        assert!(!TransportErrorKind::Cors.is_retryable());
        assert!(!TransportErrorKind::Other.is_retryable());
    }

    #[test]
    fn friendly_messages_replace_generic_text() {
        let generic = TransportError::network("Failed to fetch");
        assert_eq!(
            transport_failure_message(&generic, TransportErrorKind::Network),
            CONNECTION_FAILED_MESSAGE
        );

        let cors = TransportError::cors("CORS");
        assert_eq!(
            transport_failure_message(&cors, TransportErrorKind::Cors),
            CORS_BLOCKED_MESSAGE
        );

        let specific = TransportError::network("dns error: no such host");
        assert_eq!(
            transport_failure_message(&specific, TransportErrorKind::Network),
            "dns error: no such host"
        );
    }
}
