//! Health probing for upstream proxies
//!
//! A probe is a single bounded GET to an address-echo endpoint through the
//! proxy. Probing never fails past this module: every outcome is folded into
//! a `ProbeResult`.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::pool::ProxyPool;
use super::transport::{http_get, ProxyTransport, TargetProtocol};
use crate::config::ProbeConfig;
use crate::error::VeilError;
use crate::models::{ProbeResult, ProxyDescriptor};

/// Health prober for upstream proxies
#[derive(Debug, Clone)]
pub struct HealthProber {
    config: ProbeConfig,
}

impl HealthProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe one transport
    #[instrument(skip(self, transport), fields(proxy = %transport.label()))]
    pub async fn probe(&self, transport: &ProxyTransport) -> ProbeResult {
        let label = transport.label();
        debug!("Probing {} via {}", label, self.config.url);

        match http_get(Some(transport), &self.config.url, self.config.timeout).await {
            Ok(reply) if reply.status.is_success() => {
                let address = observed_address(&reply.body);
                debug!("Proxy {} is working, egress address {}", label, address);
                ProbeResult::working(label, address)
            }
            Ok(reply) => {
                let msg = format!("probe returned HTTP {}", reply.status);
                warn!("Proxy {} is unhealthy: {}", label, msg);
                ProbeResult::failed(label, msg)
            }
            Err(VeilError::Timeout) => {
                let msg = format!(
                    "probe timed out after {}s",
                    self.config.timeout.as_secs_f32()
                );
                warn!("Proxy {} is unhealthy: {}", label, msg);
                ProbeResult::failed(label, msg)
            }
            Err(e) => {
                warn!("Proxy {} is unhealthy: {}", label, e);
                ProbeResult::failed(label, e.to_string())
            }
        }
    }

    /// Probe a descriptor and record the outcome in `pool`
    pub async fn probe_and_record(
        &self,
        pool: &ProxyPool,
        proxy: &Arc<ProxyDescriptor>,
    ) -> ProbeResult {
        let result = match ProxyTransport::try_build(proxy, TargetProtocol::Http) {
            Ok(transport) => self.probe(&transport).await,
            Err(e) => ProbeResult::failed(proxy.label(), e.to_string()),
        };

        if result.working {
            pool.mark_success(proxy);
        } else {
            pool.mark_failed(proxy);
        }
        result
    }

    /// Probe every loaded proxy with at most `workers` probes in flight
    pub async fn probe_pool(&self, pool: &ProxyPool, workers: usize) -> Vec<ProbeResult> {
        let proxies = pool.snapshot();
        info!("Checking health of {} proxies", proxies.len());

        let results = futures::stream::iter(proxies)
            .map(|proxy| async move { self.probe_and_record(pool, &proxy).await })
            .buffer_unordered(workers.max(1))
            .collect::<Vec<ProbeResult>>()
            .await;

        let healthy = results.iter().filter(|r| r.working).count();
        info!(
            "Health check complete: {} healthy, {} unhealthy",
            healthy,
            results.len() - healthy
        );

        results
    }
}

/// `ip` field of a JSON echo body, or the trimmed body text
fn observed_address(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("ip").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}
