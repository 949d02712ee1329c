//! Backend origin resolution
//!
//! The only place that decides which backend the dashboard talks to. Both
//! the API client and the status monitor resolve through
//! [`BackendOrigin::resolve`], so they cannot drift apart.
//!
//! Resolution order: explicit value > `BACKEND_URL` > `API_URL` > default.

use common::{Error, Result};

/// Versioned prefix appended to the origin for every API call.
pub const API_PREFIX: &str = "/api/v1";

/// Liveness path, relative to the origin (no API prefix).
pub const HEALTH_PATH: &str = "/health";

pub const ORIGIN_ENV: &str = "BACKEND_URL";
pub const FALLBACK_ORIGIN_ENV: &str = "API_URL";
pub const DEFAULT_ORIGIN: &str = "http://localhost:5000";

/// Backend HTTP origin without a trailing slash, e.g. `https://api.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOrigin(String);

impl BackendOrigin {
    /// Validate an origin string. Surrounding whitespace and trailing slashes
    /// are removed; the scheme must be http or https.
    pub fn parse(origin: &str) -> Result<Self> {
        let origin = origin.trim().trim_end_matches('/');
        if !origin.starts_with("http://") && !origin.starts_with("https://") {
            return Err(Error::Origin(format!(
                "backend origin must start with http:// or https://, got: {origin}"
            )));
        }
        Ok(Self(origin.to_owned()))
    }

    /// Resolve the origin from an explicit value or the environment.
    ///
    /// Empty environment values are skipped.
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        if let Some(origin) = explicit.filter(|o| !o.trim().is_empty()) {
            return Self::parse(origin);
        }
        for var in [ORIGIN_ENV, FALLBACK_ORIGIN_ENV] {
            if let Ok(origin) = std::env::var(var)
                && !origin.trim().is_empty()
            {
                return Self::parse(&origin);
            }
        }
        Self::parse(DEFAULT_ORIGIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<origin>/api/v1`
    pub fn base_url(&self) -> String {
        format!("{}{API_PREFIX}", self.0)
    }

    /// `<origin>/health`
    pub fn health_url(&self) -> String {
        format!("{}{HEALTH_PATH}", self.0)
    }
}

impl std::fmt::Display for BackendOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health URL for a base URL that may or may not carry the API prefix.
pub fn health_url_for(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let origin = base.strip_suffix(API_PREFIX).unwrap_or(base);
    format!("{origin}{HEALTH_PATH}")
}
