use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque identifier scoping one verification run and its observers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Progress event produced by an in-flight workflow
///
/// `session_id == None` marks a process-wide event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
    pub session_id: Option<SessionId>,
}

impl SessionEvent {
    pub fn new(
        session_id: Option<SessionId>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            severity,
            session_id,
        }
    }

    pub fn info(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self::new(session_id, Severity::Info, message)
    }

    pub fn warning(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self::new(session_id, Severity::Warning, message)
    }

    pub fn error(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self::new(session_id, Severity::Error, message)
    }

    pub fn success(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self::new(session_id, Severity::Success, message)
    }

    pub fn belongs_to(&self, session_id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session_id)
    }

    /// Not attributable to any session
    pub fn is_process_wide(&self) -> bool {
        self.session_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display_matches_wire_name() {
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(
            serde_json::to_value(Severity::Warning).unwrap(),
            serde_json::json!("warning")
        );
    }

    #[test]
    fn test_generated_session_ids_differ() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = SessionEvent::info(Some("S1".into()), "hello");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sessionId"], "S1");
        assert_eq!(json["severity"], "info");
        assert_eq!(json["message"], "hello");

        let global = SessionEvent::warning(None, "pool reloaded");
        let json = serde_json::to_value(&global).unwrap();
        assert!(json["sessionId"].is_null());
    }

    #[test]
    fn test_belongs_to_is_exact() {
        let s1 = SessionId::from("S1");
        assert!(SessionEvent::info(Some("S1".into()), "x").belongs_to(&s1));
        assert!(!SessionEvent::info(Some("s1".into()), "x").belongs_to(&s1));
        assert!(!SessionEvent::info(None, "x").belongs_to(&s1));
    }
}
