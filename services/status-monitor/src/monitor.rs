//! Backend poller
//!
//! Each tick runs the health check and every configured probe in sequence,
//! then swaps the shared [`StatusSnapshot`] in one write. Readers never see a
//! half-updated snapshot.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use api_client::{ApiClient, ApiResult, RequestOptions};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::metrics;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub up: bool,
    /// HTTP status; 0 when no response arrived.
    pub status: u16,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    fn from_result(result: &ApiResult, latency: Duration) -> Self {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(success) => Self {
                up: true,
                status: success.status,
                latency_ms,
                message: None,
            },
            Err(failure) => Self {
                up: false,
                status: failure.status,
                latency_ms,
                message: Some(failure.message.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeStatus {
    pub name: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub result: CheckResult,
}

/// Latest view of the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub backend: CheckResult,
    pub probes: Vec<ProbeStatus>,
    /// Epoch milliseconds of the last completed poll.
    pub checked_at: Option<u64>,
}

impl StatusSnapshot {
    /// Snapshot served before the first poll completes.
    pub fn pending() -> Self {
        Self {
            backend: CheckResult {
                up: false,
                status: 0,
                latency_ms: 0,
                message: Some("not checked yet".into()),
            },
            probes: Vec::new(),
            checked_at: None,
        }
    }
}

pub type SharedSnapshot = Arc<RwLock<StatusSnapshot>>;

pub struct Monitor {
    client: Arc<ApiClient>,
    probes: Vec<ProbeConfig>,
    request_timeout: Duration,
    retries: u32,
}

impl Monitor {
    pub fn new(
        client: Arc<ApiClient>,
        probes: Vec<ProbeConfig>,
        request_timeout: Duration,
        retries: u32,
    ) -> Self {
        Self {
            client,
            probes,
            request_timeout,
            retries,
        }
    }

    /// Run the health check and all probes once.
    pub async fn check_once(&self) -> StatusSnapshot {
        let started = Instant::now();
        let health = self.client.health_check().await;
        let backend = CheckResult::from_result(&health, started.elapsed());
        metrics::record_check("backend", backend.up, started.elapsed().as_secs_f64());

        let mut probes = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let started = Instant::now();
            let options = RequestOptions::new()
                .timeout(self.request_timeout)
                .retries(self.retries);
            let result = self.client.get(&probe.endpoint, options).await;
            let result = CheckResult::from_result(&result, started.elapsed());
            metrics::record_check(&probe.name, result.up, started.elapsed().as_secs_f64());
            if !result.up {
                warn!(probe = %probe.name, status = result.status, message = ?result.message, "probe failed");
            }
            probes.push(ProbeStatus {
                name: probe.name.clone(),
                endpoint: probe.endpoint.clone(),
                result,
            });
        }

        StatusSnapshot {
            backend,
            probes,
            checked_at: Some(epoch_millis()),
        }
    }

    /// Poll every `interval` until `shutdown` flips to true.
    pub async fn run(
        self,
        snapshot: SharedSnapshot,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = interval.as_secs(),
            probes = self.probes.len(),
            "status poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let next = self.check_once().await;
                    let up = next.backend.up;
                    let previous = std::mem::replace(&mut *snapshot.write().await, next);
                    if previous.backend.up != up && previous.checked_at.is_some() {
                        if up {
                            info!("backend recovered");
                        } else {
                            warn!("backend went down");
                        }
                    }
                    debug!(backend_up = up, "status snapshot updated");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("status poller stopped");
                        return;
                    }
                }
            }
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
