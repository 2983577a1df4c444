use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SessionId;

/// Request to run one verification workflow
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// URL the workflow drives
    pub target: String,
    /// Workflow-specific verification type
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// One `host:port[:user[:pass]]` line used instead of the pool
    #[serde(default)]
    pub single_proxy: Option<String>,
}

impl VerificationRequest {
    pub fn new(target: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: kind.into(),
            session_id: None,
            single_proxy: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_single_proxy(mut self, line: impl Into<String>) -> Self {
        self.single_proxy = Some(line.into());
        self
    }
}

/// Result returned by a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Workflow-specific fields
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl VerificationOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            session_id: None,
            error: None,
            details: Map::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            error: Some(error.into()),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_type_field() {
        let req: VerificationRequest = serde_json::from_str(
            r#"{"target":"http://example.com","type":"student","sessionId":"abc"}"#,
        )
        .unwrap();
        assert_eq!(req.kind, "student");
        assert_eq!(req.session_id, Some(SessionId::from("abc")));
        assert!(req.single_proxy.is_none());
    }

    #[test]
    fn test_outcome_flattens_details() {
        let outcome = VerificationOutcome::succeeded()
            .with_detail("statusCode", 200)
            .with_session("S1".into());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["sessionId"], "S1");
        assert!(json.get("error").is_none());
    }
}
