//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The backend origin follows the client's own resolver, so an unset
//! `[api] origin` falls back to `BACKEND_URL` / `API_URL`.

use api_client::BackendOrigin;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

/// Backend API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Explicit origin; overrides the environment when set.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            origin: None,
            timeout_ms: default_timeout_ms(),
            retries: 0,
        }
    }
}

/// Poller and HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Session store used for authenticated probes
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// JSON store file holding the signed-in session. In-memory when unset,
    /// which leaves probes unauthenticated.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Endpoint polled on every tick, relative to `/api/v1`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    pub endpoint: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_interval() -> u64 {
    30
}

fn default_max_connections() -> usize {
    100
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if let Some(origin) = &self.api.origin {
            BackendOrigin::parse(origin)?;
        }

        if self.api.timeout_ms == 0 {
            return Err(common::Error::Config(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        if self.monitor.interval_secs == 0 {
            return Err(common::Error::Config(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.monitor.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let mut names = HashSet::new();
        for probe in &self.probes {
            if probe.name.trim().is_empty() || probe.endpoint.trim().is_empty() {
                return Err(common::Error::Config(
                    "probes need a non-empty name and endpoint".into(),
                ));
            }
            if !names.insert(probe.name.as_str()) {
                return Err(common::Error::Config(format!(
                    "duplicate probe name: {}",
                    probe.name
                )));
            }
        }

        Ok(())
    }

    /// Backend origin: `[api] origin`, then `BACKEND_URL`, `API_URL`, default.
    pub fn origin(&self) -> common::Result<BackendOrigin> {
        BackendOrigin::resolve(self.api.origin.as_deref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("status-monitor.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[api]
origin = "https://api.impactleaders.example"
retries = 2

[monitor]
listen_addr = "127.0.0.1:9090"

[storage]
path = "/var/lib/status-monitor/session.json"

[[probes]]
name = "users"
endpoint = "/users"

[[probes]]
name = "posts"
endpoint = "/posts"
"#
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status-monitor.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn load_valid_config() {
        let (_dir, path) = write_config(valid_toml());
        let config = Config::load(&path).unwrap();

        assert_eq!(config.api.retries, 2);
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.monitor.interval_secs, 30);
        assert_eq!(config.monitor.max_connections, 100);
        assert_eq!(config.probes.len(), 2);
        assert_eq!(config.probes[1].endpoint, "/posts");
        assert_eq!(
            config.storage.path.as_deref(),
            Some(Path::new("/var/lib/status-monitor/session.json"))
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(
            config.origin().unwrap().base_url(),
            "https://api.impactleaders.example/api/v1"
        );
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let (_dir, path) = write_config(
            r#"
[monitor]
listen_addr = "0.0.0.0:9090"
"#,
        );
        let config = Config::load(&path).unwrap();
        assert!(config.api.origin.is_none());
        assert_eq!(config.api.retries, 0);
        assert!(config.storage.path.is_none());
        assert!(config.probes.is_empty());
    }

    #[test]
    fn origin_falls_back_to_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (_dir, path) = write_config(
            r#"
[monitor]
listen_addr = "0.0.0.0:9090"
"#,
        );
        let config = Config::load(&path).unwrap();

        unsafe { set_env("BACKEND_URL", "https://backend.internal/") };
        assert_eq!(config.origin().unwrap().as_str(), "https://backend.internal");
        unsafe { remove_env("BACKEND_URL") };
    }

    #[test]
    fn load_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/status-monitor.toml")).is_err());
    }

    #[test]
    fn load_invalid_toml() {
        let (_dir, path) = write_config("not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn rejects_bad_origin() {
        let (_dir, path) = write_config(
            r#"
[api]
origin = "ftp://files.example"

[monitor]
listen_addr = "0.0.0.0:9090"
"#,
        );
        assert!(matches!(Config::load(&path), Err(common::Error::Origin(_))));
    }

    #[test]
    fn rejects_zero_values() {
        for (section, field) in [
            ("api", "timeout_ms = 0"),
            ("monitor", "interval_secs = 0"),
            ("monitor", "max_connections = 0"),
        ] {
            let toml = if section == "api" {
                format!("[api]\n{field}\n\n[monitor]\nlisten_addr = \"0.0.0.0:9090\"\n")
            } else {
                format!("[monitor]\nlisten_addr = \"0.0.0.0:9090\"\n{field}\n")
            };
            let (_dir, path) = write_config(&toml);
            let err = Config::load(&path).unwrap_err();
            assert!(
                matches!(err, common::Error::Config(_)),
                "{field} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_duplicate_probe_names() {
        let (_dir, path) = write_config(
            r#"
[monitor]
listen_addr = "0.0.0.0:9090"

[[probes]]
name = "users"
endpoint = "/users"

[[probes]]
name = "users"
endpoint = "/admin/users"
"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate probe name"));
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/etc/status-monitor/env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/tmp/cli.toml")),
            PathBuf::from("/tmp/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/status-monitor/env.toml")
        );

        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("status-monitor.toml")
        );
    }
}
