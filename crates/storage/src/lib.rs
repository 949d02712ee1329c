//! Client-side storage for the admin dashboard
//!
//! A fail-soft key-value layer with optional per-entry expiry, plus two
//! facades built on the same primitive:
//!
//! - [`AuthStorage`] keeps the signed-in session (`accessToken`,
//!   `refreshToken`, `user`) under one fixed key.
//! - [`CacheStorage`] keeps short-lived response data under a reserved
//!   prefix with a default 5-minute TTL.
//!
//! Every public operation on [`StorageManager`] and its facades degrades to a
//! default value when the backend is missing or failing. Callers that need to
//! tell "absent" from "failed" use the `try_*` variants.

pub mod auth;
pub mod backend;
pub mod cache;
pub mod error;
pub mod manager;

pub use auth::{
    AUTH_COOKIE_NAME, AUTH_STORAGE_KEY, AuthSession, AuthStorage, auth_cookie, expired_auth_cookie,
};
pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use cache::{CACHE_PREFIX, CacheStorage, DEFAULT_CACHE_TTL};
pub use error::{Result, StorageError};
pub use manager::{SetOptions, StorageManager, StoredEntry};
