use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream proxy entry parsed from one configuration line
///
/// Format: `host:port[:username[:password]]`. Everything after the third
/// colon belongs to the password, so passwords may contain colons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyDescriptor {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// The line this descriptor was parsed from; identity for health tracking
    #[serde(skip_serializing)]
    pub key: String,
}

/// Why a configuration line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing port")]
    MissingPort,
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
    #[error("empty host")]
    EmptyHost,
}

impl ProxyDescriptor {
    /// Parse a configuration line, returning `None` when it is malformed
    pub fn parse(line: &str) -> Option<Self> {
        Self::try_parse(line).ok()
    }

    /// Parse a configuration line with the rejection reason
    ///
    /// Fields come from the trimmed line; `key` keeps the line as given, so
    /// entries that differ only in whitespace stay distinct.
    pub fn try_parse(line: &str) -> Result<Self, ParseError> {
        let mut fields = line.trim().splitn(4, ':');

        let host = fields.next().unwrap_or_default();
        let port = fields.next().ok_or(ParseError::MissingPort)?;
        if host.is_empty() {
            return Err(ParseError::EmptyHost);
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ParseError::InvalidPort(port.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port,
            username: fields.next().map(str::to_string),
            password: fields.next().map(str::to_string),
            key: line.to_string(),
        })
    }

    /// `host:port`, safe to show in logs and results
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of feeding one line to the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Accepted(ProxyDescriptor),
    /// Blank line or `#` comment
    Comment,
    Rejected { line: String, error: ParseError },
}

/// Whether a trimmed line is a comment the loader should skip
pub fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Classify a single raw line
pub fn classify_line(raw: &str) -> LineOutcome {
    if is_comment(raw.trim()) {
        return LineOutcome::Comment;
    }

    match ProxyDescriptor::try_parse(raw) {
        Ok(descriptor) => LineOutcome::Accepted(descriptor),
        Err(error) => LineOutcome::Rejected {
            line: raw.trim().to_string(),
            error,
        },
    }
}

/// Classify every line of a proxy list
pub fn parse_lines(text: &str) -> Vec<LineOutcome> {
    text.lines().map(classify_line).collect()
}

/// Input accepted by `ProxyPool::load_from_list`
#[derive(Debug, Clone)]
pub enum ProxyEntry {
    Raw(String),
    Parsed(ProxyDescriptor),
}

impl From<&str> for ProxyEntry {
    fn from(line: &str) -> Self {
        ProxyEntry::Raw(line.to_string())
    }
}

impl From<String> for ProxyEntry {
    fn from(line: String) -> Self {
        ProxyEntry::Raw(line)
    }
}

impl From<ProxyDescriptor> for ProxyEntry {
    fn from(descriptor: ProxyDescriptor) -> Self {
        ProxyEntry::Parsed(descriptor)
    }
}

/// Cumulative pass/fail counts for one proxy key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStats {
    pub success_count: u64,
    pub fail_count: u64,
}

/// Pool counters reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub failed: usize,
}

/// Result of probing one proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub working: bool,
    pub proxy_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProbeResult {
    pub fn working(proxy_label: impl Into<String>, observed_address: impl Into<String>) -> Self {
        Self {
            working: true,
            proxy_label: proxy_label.into(),
            observed_address: Some(observed_address.into()),
            error_message: None,
        }
    }

    pub fn failed(proxy_label: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            working: false,
            proxy_label: proxy_label.into(),
            observed_address: None,
            error_message: Some(error_message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port_only() {
        let proxy = ProxyDescriptor::parse("10.0.0.1:3128").unwrap();
        assert_eq!(proxy.host, "10.0.0.1");
        assert_eq!(proxy.port, 3128);
        assert_eq!(proxy.username, None);
        assert_eq!(proxy.password, None);
        assert_eq!(proxy.key, "10.0.0.1:3128");
    }

    #[test]
    fn test_parse_password_keeps_colons() {
        let proxy = ProxyDescriptor::parse("proxy.example.com:8080:alice:p@ss:word").unwrap();
        assert_eq!(proxy.host, "proxy.example.com");
        assert_eq!(proxy.port, 8080);
        assert_eq!(proxy.username.as_deref(), Some("alice"));
        assert_eq!(proxy.password.as_deref(), Some("p@ss:word"));
    }

    #[test]
    fn test_parse_username_without_password() {
        let proxy = ProxyDescriptor::parse("p.net:3128:bob").unwrap();
        assert_eq!(proxy.username.as_deref(), Some("bob"));
        assert_eq!(proxy.password, None);
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(ProxyDescriptor::parse("badhost:notaport"), None);
        assert_eq!(
            ProxyDescriptor::try_parse("badhost:notaport"),
            Err(ParseError::InvalidPort("notaport".to_string()))
        );
        assert_eq!(
            ProxyDescriptor::try_parse("justahost"),
            Err(ParseError::MissingPort)
        );
        assert_eq!(
            ProxyDescriptor::try_parse(":8080"),
            Err(ParseError::EmptyHost)
        );
        assert!(ProxyDescriptor::parse("host:0").is_none());
        assert!(ProxyDescriptor::parse("host:65536").is_none());
        assert!(ProxyDescriptor::parse("host:").is_none());
    }

    #[test]
    fn test_keys_are_case_and_whitespace_sensitive() {
        let a = ProxyDescriptor::parse("Proxy.net:80").unwrap();
        let b = ProxyDescriptor::parse("proxy.net:80").unwrap();
        assert_ne!(a.key, b.key);

        let padded = ProxyDescriptor::parse(" proxy.net:80").unwrap();
        assert_eq!(padded.host, "proxy.net");
        assert_eq!(padded.port, 80);
        assert_eq!(padded.key, " proxy.net:80");
        assert_ne!(padded.key, b.key);
    }

    #[test]
    fn test_parse_lines_tags_each_line() {
        let outcomes = parse_lines("# header\n\n  a.net:80  \nbad:port\nb.net:81:u:p");
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes[0], LineOutcome::Comment);
        assert_eq!(outcomes[1], LineOutcome::Comment);
        assert!(matches!(
            &outcomes[2],
            LineOutcome::Accepted(d) if d.key == "  a.net:80  " && d.host == "a.net"
        ));
        assert!(matches!(
            &outcomes[3],
            LineOutcome::Rejected { line, error: ParseError::InvalidPort(_) } if line == "bad:port"
        ));
        assert!(matches!(&outcomes[4], LineOutcome::Accepted(d) if d.port == 81));
    }

    #[test]
    fn test_label_hides_credentials() {
        let proxy = ProxyDescriptor::parse("p.net:3128:user:secret").unwrap();
        assert_eq!(proxy.label(), "p.net:3128");
        assert_eq!(proxy.to_string(), "p.net:3128");
        let json = serde_json::to_string(&proxy).unwrap();
        assert!(!json.contains("secret"));
    }
}
