use crate::error::{Result, VeilError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default endpoint used to check which address a proxy egresses from
pub const DEFAULT_PROBE_URL: &str = "http://api.ipify.org?format=json";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Proxy pool bootstrap configuration
    pub pool: PoolConfig,
    /// Health probe configuration
    pub probe: ProbeConfig,
    /// Verification workflow configuration
    pub workflow: WorkflowConfig,
    /// Session event router configuration
    pub events: EventConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 8001)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Proxy list loaded once at startup
    pub proxy_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// "What is my IP" endpoint, plain http only
    pub url: Url,
    /// Upper bound for one probe request
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_PROBE_URL).expect("default probe url is valid"),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Upper bound for one verification run
    pub timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Capacity of the process-wide event broadcast
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl LogConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "8001").parse().map_err(|_| {
                    VeilError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            pool: PoolConfig {
                proxy_file: env::var("PROXY_FILE")
                    .ok()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            },
            probe: ProbeConfig {
                url: parse_probe_url(&get_env_or("PROBE_URL", DEFAULT_PROBE_URL))?,
                timeout: Duration::from_secs(parse_secs("PROBE_TIMEOUT", "10")?),
            },
            workflow: WorkflowConfig {
                timeout: Duration::from_secs(parse_secs("WORKFLOW_TIMEOUT", "30")?),
            },
            events: EventConfig {
                buffer_size: get_env_or("EVENT_BUFFER_SIZE", "1024")
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        VeilError::InvalidConfig(
                            "EVENT_BUFFER_SIZE must be a positive number".into(),
                        )
                    })?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_probe_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        VeilError::InvalidConfig(format!("PROBE_URL must be a valid URL: {}", e))
    })?;

    if url.scheme() != "http" {
        return Err(VeilError::InvalidConfig(format!(
            "PROBE_URL has unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(VeilError::InvalidConfig(
            "PROBE_URL must include a host".into(),
        ));
    }

    Ok(url)
}

fn parse_secs(key: &str, default: &str) -> Result<u64> {
    get_env_or(key, default)
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| VeilError::InvalidConfig(format!("{} must be a positive number of seconds", key)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize env access; a failed test must not block the others
    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    const CONFIG_ENV_KEYS: &[&str] = &[
        "API_PORT",
        "API_HOST",
        "CORS_ORIGINS",
        "PROXY_FILE",
        "PROBE_URL",
        "PROBE_TIMEOUT",
        "WORKFLOW_TIMEOUT",
        "EVENT_BUFFER_SIZE",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = env_lock();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.api.port, 8001);
        assert_eq!(config.api.host, "0.0.0.0");
        assert!(config.api.cors_origins.is_empty());
        assert!(config.pool.proxy_file.is_none());
        assert_eq!(config.probe.url, Url::parse(DEFAULT_PROBE_URL).unwrap());
        assert_eq!(config.probe.url.as_str(), "http://api.ipify.org/?format=json");
        assert_eq!(config.probe.timeout, Duration::from_secs(10));
        assert_eq!(config.workflow.timeout, Duration::from_secs(30));
        assert_eq!(config.events.buffer_size, 1024);
        assert!(!config.log.is_json());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = env_lock();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("API_PORT", "9001");
        env::set_var("API_HOST", "127.0.0.1");
        env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        env::set_var("PROXY_FILE", "/etc/veil/proxies.txt");
        env::set_var("PROBE_URL", "http://ip.example/raw");
        env::set_var("PROBE_TIMEOUT", "3");
        env::set_var("LOG_FORMAT", "JSON");

        let config = Config::from_env().unwrap();

        assert_eq!(config.api_addr(), "127.0.0.1:9001");
        assert_eq!(
            config.api.cors_origins,
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ]
        );
        assert_eq!(
            config.pool.proxy_file,
            Some(PathBuf::from("/etc/veil/proxies.txt"))
        );
        assert_eq!(config.probe.url.host_str(), Some("ip.example"));
        assert_eq!(config.probe.timeout, Duration::from_secs(3));
        assert!(config.log.is_json());
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = env_lock();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("API_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, VeilError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_https_probe_url() {
        let _lock = env_lock();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROBE_URL", "https://api.ipify.org");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, VeilError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let _lock = env_lock();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("WORKFLOW_TIMEOUT", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, VeilError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_lock_recovers_after_panicking_holder() {
        let holder = std::thread::spawn(|| {
            let _lock = env_lock();
            panic!("test failed while holding the env lock");
        });
        assert!(holder.join().is_err());

        let _lock = env_lock();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        assert_eq!(Config::from_env().unwrap().api.port, 8001);
    }
}
