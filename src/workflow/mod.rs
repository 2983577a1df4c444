//! Verification workflows
//!
//! A workflow receives the transport chosen for its session (or `None` for a
//! direct connection) and an emitter already bound to that session.

mod reachability;

pub use reachability::ReachabilityWorkflow;

use async_trait::async_trait;

use crate::events::SessionEmitter;
use crate::models::{VerificationOutcome, VerificationRequest};
use crate::proxy::ProxyTransport;

#[async_trait]
pub trait VerificationWorkflow: Send + Sync {
    fn name(&self) -> &'static str;

    /// Errors are converted into a failed outcome by the caller.
    async fn run(
        &self,
        request: &VerificationRequest,
        transport: Option<&ProxyTransport>,
        emitter: &SessionEmitter,
    ) -> anyhow::Result<VerificationOutcome>;
}
