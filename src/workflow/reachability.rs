use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use tracing::instrument;
use url::Url;

use super::VerificationWorkflow;
use crate::error::VeilError;
use crate::events::SessionEmitter;
use crate::models::{VerificationOutcome, VerificationRequest};
use crate::proxy::dial::target_of;
use crate::proxy::{http_get, open_tunnel, ProxyTransport};

/// Checks that the target answers through the chosen transport
///
/// Plain-http targets get a GET; https targets only get a tunnel, since the
/// TLS session itself belongs to whatever drives the page.
pub struct ReachabilityWorkflow {
    timeout: Duration,
}

impl ReachabilityWorkflow {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl VerificationWorkflow for ReachabilityWorkflow {
    fn name(&self) -> &'static str {
        "reachability"
    }

    #[instrument(skip_all, fields(target = %request.target))]
    async fn run(
        &self,
        request: &VerificationRequest,
        transport: Option<&ProxyTransport>,
        emitter: &SessionEmitter,
    ) -> anyhow::Result<VerificationOutcome> {
        let url = Url::parse(&request.target)
            .with_context(|| format!("invalid target {:?}", request.target))?;
        let via = transport
            .map(|t| t.label())
            .unwrap_or_else(|| "direct".to_string());

        emitter.info(format!("Checking {} via {}", url, via));
        let start = Instant::now();

        let outcome = match url.scheme() {
            "http" => {
                let reply = http_get(transport, &url, self.timeout).await?;
                let status = reply.status;

                let outcome = if status.is_success() || status.is_redirection() {
                    emitter.success(format!("Target answered with HTTP {}", status.as_u16()));
                    VerificationOutcome::succeeded()
                } else {
                    emitter.warn(format!("Target answered with HTTP {}", status.as_u16()));
                    VerificationOutcome::failed(format!("target returned HTTP {}", status))
                };

                outcome
                    .with_detail("statusCode", status.as_u16())
                    .with_detail("bytes", reply.body.len())
            }
            "https" => {
                let (host, port) = target_of(&url)?;
                tokio::time::timeout(self.timeout, open_tunnel(transport, &host, port))
                    .await
                    .map_err(|_| VeilError::Timeout)??;

                emitter.success(format!("Tunnel to {} established", url.host_str().unwrap_or(&host)));
                VerificationOutcome::succeeded().with_detail("tunnel", true)
            }
            other => anyhow::bail!("unsupported target scheme: {}", other),
        };

        let mut outcome = outcome
            .with_detail("elapsedMs", start.elapsed().as_millis() as u64)
            .with_detail("via", via);
        if !request.kind.is_empty() {
            outcome = outcome.with_detail("type", request.kind.clone());
        }
        Ok(outcome)
    }
}
