//! Liveness probing
//!
//! One periodic task per backend issues `GET /health` against it and stores
//! the outcome in the backend's health flag. The flag is only written after
//! a probe completes, so a backend never looks healthy on optimism alone; it
//! starts out unhealthy and earns the flag with its first 200.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::BalancerConfig;

use super::pool::BackendPool;

/// Spawns and owns the per-backend probe tasks
pub struct HealthProber {
    client: Client,
    scheme: &'static str,
    timeout: Duration,
    interval: Duration,
}

impl HealthProber {
    /// Create a prober from the balancer configuration
    pub fn new(config: &BalancerConfig) -> Self {
        Self {
            client: Client::new(),
            scheme: config.scheme(),
            timeout: config.timeout,
            interval: config.probe_interval,
        }
    }

    /// Start one probe loop per backend
    ///
    /// The first probe fires immediately; after that the loop ticks on the
    /// configured interval, skipping ticks it missed while a slow probe was
    /// in flight. Probe failures mark the backend unhealthy and never
    /// propagate further.
    pub fn spawn(&self, pool: &BackendPool) -> Vec<JoinHandle<()>> {
        pool.backends()
            .iter()
            .map(|backend| {
                let backend = Arc::clone(backend);
                let client = self.client.clone();
                let url = format!("{}://{}/health", self.scheme, backend.address());
                let timeout = self.timeout;
                let interval = self.interval;

                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        ticker.tick().await;

                        let healthy = probe(&client, &url, timeout).await;
                        backend.set_healthy(healthy);
                        tracing::debug!(
                            backend = backend.address(),
                            healthy,
                            "liveness probe"
                        );
                    }
                })
            })
            .collect()
    }
}

/// Issue a single liveness probe
///
/// Healthy means the probe completed within the timeout and returned
/// exactly 200; any other status or a transport error is unhealthy.
pub async fn probe(client: &Client, url: &str, timeout: Duration) -> bool {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) => response.status() == StatusCode::OK,
        Err(e) => {
            tracing::debug!(url, "probe failed: {}", e);
            false
        }
    }
}
