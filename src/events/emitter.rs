use tracing::{debug, error, info, warn};

use super::SessionRouter;
use crate::models::{SessionEvent, SessionId, Severity};

/// Event sink bound to one session
///
/// Handed down the call chain to anything that reports progress, so every
/// line is attributed where it is produced.
#[derive(Clone)]
pub struct SessionEmitter {
    router: SessionRouter,
    session_id: Option<SessionId>,
}

impl SessionEmitter {
    pub(crate) fn new(router: SessionRouter, session_id: Option<SessionId>) -> Self {
        Self { router, session_id }
    }

    /// `None` for the process-wide emitter
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn emit(&self, message: impl Into<String>, severity: Severity) {
        let event = SessionEvent::new(self.session_id.clone(), severity, message);
        let session = self.session_id.as_ref().map(SessionId::as_str).unwrap_or("-");

        match severity {
            Severity::Debug => debug!(session_id = %session, "{}", event.message),
            Severity::Info | Severity::Success => info!(session_id = %session, "{}", event.message),
            Severity::Warning => warn!(session_id = %session, "{}", event.message),
            Severity::Error => error!(session_id = %session, "{}", event.message),
        }

        self.router.publish(event);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(message, Severity::Debug);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(message, Severity::Info);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(message, Severity::Success);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(message, Severity::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(message, Severity::Error);
    }
}
