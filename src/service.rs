//! Verification service
//!
//! Ties the shared pool and event router to a workflow. This is the surface
//! the HTTP API drives; everything here is safe to call concurrently.

use std::sync::Arc;

use tracing::{info, instrument};
use url::Url;

use crate::error::{Result, VeilError};
use crate::events::{SessionEmitter, SessionRouter, Subscription};
use crate::models::{
    PoolStatus, ProbeResult, ProxyDescriptor, SessionId, VerificationOutcome, VerificationRequest,
};
use crate::proxy::{HealthProber, ProxyPool, ProxyTransport, TargetProtocol};
use crate::workflow::VerificationWorkflow;

/// Where the descriptor for a verification came from
enum Selection {
    Pool(Arc<ProxyDescriptor>),
    Single(Arc<ProxyDescriptor>),
    Direct,
}

impl Selection {
    fn descriptor(&self) -> Option<&Arc<ProxyDescriptor>> {
        match self {
            Self::Pool(proxy) | Self::Single(proxy) => Some(proxy),
            Self::Direct => None,
        }
    }
}

pub struct VerificationService {
    pool: Arc<ProxyPool>,
    router: SessionRouter,
    prober: HealthProber,
    workflow: Arc<dyn VerificationWorkflow>,
}

impl VerificationService {
    pub fn new(
        pool: Arc<ProxyPool>,
        router: SessionRouter,
        prober: HealthProber,
        workflow: Arc<dyn VerificationWorkflow>,
    ) -> Self {
        Self {
            pool,
            router,
            prober,
            workflow,
        }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Replace the pool contents from `host:port[:user[:pass]]` lines
    pub fn load_proxies(&self, text: &str) -> usize {
        let count = self.pool.load_from_lines(text);
        self.router
            .process_emitter()
            .info(format!("Loaded {} proxies", count));
        count
    }

    pub fn proxy_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn clear_proxies(&self) {
        self.pool.clear();
        self.router.process_emitter().info("Proxy pool cleared");
    }

    pub fn subscribe(&self, session_id: impl Into<SessionId>) -> Subscription {
        self.router.subscribe(session_id)
    }

    /// Probe one randomly chosen proxy and record the result
    #[instrument(skip(self))]
    pub async fn test_random_proxy(&self) -> Result<ProbeResult> {
        let proxy = self.pool.random().ok_or(VeilError::NoProxiesAvailable)?;
        let result = self.prober.probe_and_record(&self.pool, &proxy).await;

        let emitter = self.router.process_emitter();
        if result.working {
            emitter.success(format!("Proxy {} is working", result.proxy_label));
        } else {
            emitter.warn(format!(
                "Proxy {} failed: {}",
                result.proxy_label,
                result.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
        Ok(result)
    }

    /// Probe every loaded proxy, `workers` at a time
    pub async fn test_all_proxies(&self, workers: usize) -> Vec<ProbeResult> {
        let results = self.prober.probe_pool(&self.pool, workers).await;
        let healthy = results.iter().filter(|r| r.working).count();
        self.router.process_emitter().info(format!(
            "Checked {} proxies: {} healthy, {} unhealthy",
            results.len(),
            healthy,
            results.len() - healthy
        ));
        results
    }

    /// Run the workflow for one session
    ///
    /// Never fails: workflow errors come back as an unsuccessful outcome
    /// carrying the session id.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub async fn run_verification(&self, request: VerificationRequest) -> VerificationOutcome {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(SessionId::generate);
        let emitter = self.router.emitter(session_id.clone());
        info!(session_id = %session_id, workflow = self.workflow.name(), "Starting verification");

        let selection = self.select_proxy(&request, &emitter);
        let target = Url::parse(&request.target)
            .map(|url| TargetProtocol::from_url(&url))
            .unwrap_or_default();
        let transport = selection
            .descriptor()
            .and_then(|proxy| ProxyTransport::build(proxy, target, &emitter));
        if transport.is_none() {
            emitter.info("Connecting directly");
        }

        match self
            .workflow
            .run(&request, transport.as_ref(), &emitter)
            .await
        {
            Ok(outcome) => {
                if let Selection::Pool(proxy) = &selection {
                    if outcome.success {
                        self.pool.mark_success(proxy);
                    } else {
                        self.pool.mark_failed(proxy);
                    }
                }
                outcome.with_session(session_id)
            }
            Err(e) => {
                emitter.error(format!("Verification failed: {:#}", e));
                if let Selection::Pool(proxy) = &selection {
                    self.pool.mark_failed(proxy);
                }
                VerificationOutcome::failed(e.to_string()).with_session(session_id)
            }
        }
    }

    fn select_proxy(&self, request: &VerificationRequest, emitter: &SessionEmitter) -> Selection {
        if let Some(line) = request.single_proxy.as_deref() {
            return match ProxyDescriptor::try_parse(line) {
                Ok(proxy) => {
                    emitter.info(format!("Using supplied proxy {}", proxy.label()));
                    Selection::Single(Arc::new(proxy))
                }
                Err(e) => {
                    emitter.warn(format!("Ignoring supplied proxy: {}", e));
                    Selection::Direct
                }
            };
        }

        match self.pool.next() {
            Some(proxy) => Selection::Pool(proxy),
            None => {
                emitter.warn("Proxy pool is empty");
                Selection::Direct
            }
        }
    }
}
