//! Signed-in session storage
//!
//! The whole [`AuthSession`] lives under [`AUTH_STORAGE_KEY`] and is written
//! wholesale on login, read piecemeal by the API client, and removed on
//! logout or when the backend reports the account inactive.
//!
//! Route middleware on the server side reads the access token from a cookie
//! rather than from storage; [`auth_cookie`] and [`expired_auth_cookie`]
//! render the `Set-Cookie` values for that.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::manager::{SetOptions, StorageManager};

/// Storage key holding the serialized session.
pub const AUTH_STORAGE_KEY: &str = "auth_tokens";

/// Cookie read by server-side route middleware.
pub const AUTH_COOKIE_NAME: &str = "auth_token";

/// Cookie lifetime set at login (24 hours).
pub const AUTH_COOKIE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Tokens and profile of the signed-in admin or user.
///
/// Older sessions stored the access token as `token`; it is read as a
/// fallback when `accessToken` is missing or empty. Empty tokens read as
/// `None`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredSession")]
pub struct AuthSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Value>,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, user: Option<Value>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            user,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.as_deref().is_some_and(|token| !token.is_empty())
    }
}

/// On-disk shape, carrying both historical token fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<Value>,
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|token| !token.is_empty())
}

impl From<StoredSession> for AuthSession {
    fn from(stored: StoredSession) -> Self {
        Self {
            access_token: non_empty(stored.access_token).or_else(|| non_empty(stored.token)),
            refresh_token: stored.refresh_token,
            user: stored.user,
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthSession")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("user", &self.user)
            .finish()
    }
}

/// Session facade over a [`StorageManager`].
#[derive(Clone)]
pub struct AuthStorage {
    storage: StorageManager,
}

impl AuthStorage {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    /// Store `session`, replacing whatever session was there.
    pub fn save_tokens(&self, session: &AuthSession) -> bool {
        let saved = self.storage.set(AUTH_STORAGE_KEY, session, SetOptions::default());
        if saved {
            debug!(authenticated = session.is_authenticated(), "saved auth session");
        }
        saved
    }

    /// The stored session, or an all-`None` session when nothing is stored.
    pub fn get_tokens(&self) -> AuthSession {
        self.storage.get(AUTH_STORAGE_KEY).unwrap_or_default()
    }

    pub fn clear_tokens(&self) -> bool {
        let cleared = self.storage.remove(AUTH_STORAGE_KEY);
        if cleared {
            info!("cleared auth session");
        }
        cleared
    }

    /// Access token from `accessToken`, falling back to the legacy `token`.
    pub fn get_access_token(&self) -> Option<String> {
        let session = match self.storage.try_get::<AuthSession>(AUTH_STORAGE_KEY) {
            Ok(session) => session,
            Err(StorageError::Unavailable) => None,
            Err(e) => {
                warn!(error = %e, "failed to read auth session");
                return None;
            }
        };

        let token = session.and_then(|session| session.access_token);
        if token.is_none() {
            warn!("no access token in stored auth session");
        }
        token
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_access_token().is_some()
    }

    pub fn get_current_user(&self) -> Option<Value> {
        self.get_tokens().user
    }

    /// Replace the stored profile, keeping the tokens. No-op without a session.
    pub fn update_user(&self, user: Value) -> bool {
        let mut session = self.get_tokens();
        if !session.is_authenticated() {
            debug!("ignoring profile update without a signed-in session");
            return false;
        }
        session.user = Some(user);
        self.save_tokens(&session)
    }
}

/// `Set-Cookie` value issued at login.
pub fn auth_cookie(token: &str) -> String {
    format!("{AUTH_COOKIE_NAME}={token}; path=/; max-age={AUTH_COOKIE_MAX_AGE_SECS}; SameSite=Lax")
}

/// `Set-Cookie` value that removes the auth cookie.
pub fn expired_auth_cookie() -> String {
    format!("{AUTH_COOKIE_NAME}=; path=/; max-age=0; SameSite=Lax")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StorageBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn auth_storage() -> (AuthStorage, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let auth = AuthStorage::new(StorageManager::new(backend.clone()));
        (auth, backend)
    }

    fn write_raw_session(backend: &MemoryBackend, value: Value) {
        let entry = json!({"value": value, "timestamp": 1_700_000_000_000u64});
        backend
            .set_item(AUTH_STORAGE_KEY, &entry.to_string())
            .unwrap();
    }

    #[test]
    fn pristine_store_returns_empty_session() {
        let (auth, _) = auth_storage();
        let session = auth.get_tokens();
        assert_eq!(session, AuthSession::default());
        assert_eq!(
            serde_json::to_value(&session).unwrap(),
            json!({"accessToken": null, "refreshToken": null, "user": null})
        );
        assert!(!auth.is_authenticated());
        assert!(auth.get_current_user().is_none());
    }

    #[test]
    fn save_and_read_session() {
        let (auth, _) = auth_storage();
        let session = AuthSession::new(
            "at_1",
            Some("rt_1".into()),
            Some(json!({"id": "u1", "role": "admin"})),
        );
        assert!(auth.save_tokens(&session));

        assert_eq!(auth.get_tokens(), session);
        assert_eq!(auth.get_access_token().as_deref(), Some("at_1"));
        assert!(auth.is_authenticated());
        assert_eq!(auth.get_current_user().unwrap()["role"], "admin");
    }

    #[test]
    fn save_overwrites_previous_session() {
        let (auth, _) = auth_storage();
        auth.save_tokens(&AuthSession::new("at_old", Some("rt_old".into()), None));
        auth.save_tokens(&AuthSession::new("at_new", None, None));

        let session = auth.get_tokens();
        assert_eq!(session.access_token.as_deref(), Some("at_new"));
        assert!(session.refresh_token.is_none());
    }

    #[test]
    fn legacy_token_field_is_accepted() {
        let (auth, backend) = auth_storage();
        write_raw_session(&backend, json!({"token": "legacy-at", "user": null}));

        assert_eq!(auth.get_access_token().as_deref(), Some("legacy-at"));
        assert_eq!(auth.get_tokens().access_token.as_deref(), Some("legacy-at"));
    }

    #[test]
    fn access_token_preferred_over_legacy_field() {
        let (auth, backend) = auth_storage();
        write_raw_session(&backend, json!({"accessToken": "at", "token": "legacy"}));
        assert_eq!(auth.get_access_token().as_deref(), Some("at"));
    }

    #[test]
    fn both_token_fields_present_keeps_whole_session() {
        let (auth, backend) = auth_storage();
        write_raw_session(
            &backend,
            json!({"accessToken": "a", "token": "a", "refreshToken": "r", "user": {"id": 1}}),
        );

        let session = auth.get_tokens();
        assert_eq!(session.access_token.as_deref(), Some("a"));
        assert_eq!(session.refresh_token.as_deref(), Some("r"));
        assert_eq!(auth.get_access_token().as_deref(), Some("a"));
        assert_eq!(auth.get_current_user().unwrap()["id"], 1);
    }

    #[test]
    fn empty_access_token_falls_back_to_legacy_field() {
        let (auth, backend) = auth_storage();
        write_raw_session(&backend, json!({"accessToken": "", "token": "legacy-at"}));
        assert_eq!(auth.get_access_token().as_deref(), Some("legacy-at"));
        assert_eq!(auth.get_tokens().access_token.as_deref(), Some("legacy-at"));
    }

    #[test]
    fn empty_token_is_not_authenticated_anywhere() {
        let session = AuthSession::new("", None, Some(json!({"id": "u1"})));
        assert!(!session.is_authenticated());

        let (auth, _) = auth_storage();
        auth.save_tokens(&session);
        assert!(!auth.is_authenticated());
        assert!(!auth.get_tokens().is_authenticated());
        assert!(auth.get_access_token().is_none());
    }

    #[test]
    fn session_without_token_is_not_authenticated() {
        let (auth, backend) = auth_storage();
        write_raw_session(&backend, json!({"user": {"id": "u1"}}));
        assert!(auth.get_access_token().is_none());
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn clear_tokens_removes_only_session_key() {
        let (auth, backend) = auth_storage();
        auth.save_tokens(&AuthSession::new("at", None, None));
        backend.set_item("cache_users", "{}").unwrap();

        assert!(auth.clear_tokens());
        assert!(backend.get_item(AUTH_STORAGE_KEY).unwrap().is_none());
        assert!(backend.get_item("cache_users").unwrap().is_some());
        assert_eq!(auth.get_tokens(), AuthSession::default());
    }

    #[test]
    fn update_user_keeps_tokens() {
        let (auth, _) = auth_storage();
        auth.save_tokens(&AuthSession::new("at", Some("rt".into()), Some(json!({"name": "A"}))));
        assert!(auth.update_user(json!({"name": "B"})));

        let session = auth.get_tokens();
        assert_eq!(session.access_token.as_deref(), Some("at"));
        assert_eq!(session.user.unwrap()["name"], "B");
    }

    #[test]
    fn update_user_without_session_is_rejected() {
        let (auth, _) = auth_storage();
        assert!(!auth.update_user(json!({"name": "B"})));
        assert_eq!(auth.get_tokens(), AuthSession::default());
    }

    #[test]
    fn unavailable_storage_is_fail_soft() {
        let auth = AuthStorage::new(StorageManager::unavailable());
        assert!(!auth.save_tokens(&AuthSession::new("at", None, None)));
        assert_eq!(auth.get_tokens(), AuthSession::default());
        assert!(auth.get_access_token().is_none());
        assert!(!auth.clear_tokens());
    }

    #[test]
    fn debug_redacts_tokens() {
        let session = AuthSession::new("at_secret", Some("rt_secret".into()), None);
        let debug = format!("{session:?}");
        assert!(!debug.contains("at_secret"), "got: {debug}");
        assert!(!debug.contains("rt_secret"), "got: {debug}");
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn cookie_values() {
        assert_eq!(
            auth_cookie("abc"),
            "auth_token=abc; path=/; max-age=86400; SameSite=Lax"
        );
        assert_eq!(
            expired_auth_cookie(),
            "auth_token=; path=/; max-age=0; SameSite=Lax"
        );
    }
}
