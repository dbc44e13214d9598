//! Configuration file support for corvid.
//!
//! corvid data lives in a `.corvid/` directory:
//! - `.corvid/config.toml` - Configuration file
//! - `.corvid/logs/` - Daily-rotated log files
//! - `.corvid/traces/` - Per-run JSONL traces, when enabled
//!
//! Config discovery searches for `.corvid/config.toml` starting from the
//! current directory and walking up to parent directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use corvid_runtime::{
    ApiKeyPolicy, ClientOptions, HeadersPolicy, PollOptions, ReqwestConfig, ReqwestTransport,
    RetryOptions, Url,
};
use serde::{Deserialize, Serialize};

/// The corvid data directory name.
pub const CORVID_DIR: &str = ".corvid";
/// The config file name within the corvid directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Target service and request decoration.
    pub client: ClientConfig,
    /// Retry policy settings.
    pub retry: RetryOptions,
    /// Long-running operation polling.
    pub poller: PollerConfig,
    /// Per-run trace files.
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL requests are resolved against.
    pub endpoint: Option<String>,
    /// Value for the `api-version` query parameter.
    pub api_version: Option<String>,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Environment variable holding an API key.
    pub api_key_env: Option<String>,
    /// Header the API key is sent in.
    pub api_key_header: String,
    /// Timeout for a single HTTP exchange, in seconds.
    pub timeout_secs: u64,
    /// Log every request and response at debug level.
    pub logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: None,
            headers: BTreeMap::new(),
            api_key_env: None,
            api_key_header: "api-key".to_string(),
            timeout_secs: 300,
            logging: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between status polls when the service suggests none.
    pub frequency_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { frequency_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Record one span per pipeline call and write the trace on exit.
    pub enabled: bool,
    /// Trace directory, relative to `.corvid/` unless absolute.
    pub dir: PathBuf,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("traces"),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Returns the config and the `.corvid` directory it was found in.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let corvid_dir = dir.join(CORVID_DIR);
            let config_path = corvid_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, corvid_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve the trace directory relative to the .corvid directory.
    pub fn resolve_trace_dir(&self, corvid_dir: Option<&Path>) -> PathBuf {
        if self.trace.dir.is_absolute() {
            self.trace.dir.clone()
        } else if let Some(dir) = corvid_dir {
            dir.join(&self.trace.dir)
        } else {
            PathBuf::from(CORVID_DIR).join(&self.trace.dir)
        }
    }

    /// The endpoint as a URL.
    pub fn endpoint(&self) -> Result<Url> {
        let endpoint = self
            .client
            .endpoint
            .as_deref()
            .context("No endpoint configured. Set [client] endpoint or pass --endpoint.")?;
        Url::parse(endpoint).with_context(|| format!("Invalid endpoint: {}", endpoint))
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions::with_frequency(Duration::from_secs(self.poller.frequency_secs))
    }

    /// Client options for the configured service over real HTTP.
    ///
    /// Fails if the API key variable is configured but unset.
    pub fn client_options(&self) -> Result<ClientOptions> {
        let transport = ReqwestTransport::new(
            ReqwestConfig::default().with_timeout(Duration::from_secs(self.client.timeout_secs)),
        )?;

        let mut options = ClientOptions::default()
            .with_transport(Arc::new(transport))
            .with_retry(self.retry.clone())
            .with_logging(self.client.logging);

        if let Some(version) = &self.client.api_version {
            options = options.with_api_version(version.clone());
        }
        if !self.client.headers.is_empty() {
            let headers = self
                .client
                .headers
                .iter()
                .fold(HeadersPolicy::new(), |policy, (name, value)| {
                    policy.with(name.clone(), value.clone())
                });
            options = options.with_per_call_policy(headers);
        }
        if let Some(var) = &self.client.api_key_env {
            let policy = ApiKeyPolicy::from_env(self.client.api_key_header.clone(), var)
                .with_context(|| format!("Failed to read API key from ${}", var))?;
            options = options.with_per_retry_policy(policy);
        }

        Ok(options)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

impl Config {
    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message,
            })
        };

        match self.client.endpoint.as_deref() {
            None => push("client.endpoint", "Endpoint is required.".to_string()),
            Some(endpoint) => {
                if let Err(e) = Url::parse(endpoint) {
                    push("client.endpoint", format!("Invalid URL '{}': {}.", endpoint, e));
                }
            }
        }

        for name in self.client.headers.keys() {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
                push("client.headers", format!("Invalid header name '{}'.", name));
            }
        }

        if let Some(var) = &self.client.api_key_env {
            if std::env::var(var).is_err() {
                push(
                    "client.api_key_env",
                    format!("Environment variable ${} is not set.", var),
                );
            }
        }

        if self.client.timeout_secs == 0 {
            push("client.timeout_secs", "Timeout must be positive.".to_string());
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            push(
                "retry.max_backoff_ms",
                format!(
                    "Max backoff ({}ms) is below initial backoff ({}ms).",
                    self.retry.max_backoff_ms, self.retry.initial_backoff_ms
                ),
            );
        }

        if self.poller.frequency_secs == 0 {
            push("poller.frequency_secs", "Poll frequency must be positive.".to_string());
        }

        errors
    }
}

/// Written by `corvid init`.
pub const DEFAULT_CONFIG: &str = r#"# corvid configuration
# Paths are relative to this .corvid/ directory unless absolute

[client]
endpoint = "https://example.invalid"
# api_version = "2024-05-01"
# api_key_env = "CORVID_API_KEY"
# api_key_header = "api-key"
timeout_secs = 300
logging = false

[client.headers]
# x-ms-client-name = "corvid"

[retry]
max_retries = 3
initial_backoff_ms = 500
max_backoff_ms = 30000
retry_non_idempotent = false

[poller]
frequency_secs = 30

[trace]
enabled = false
dir = "traces"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.client.endpoint, None);
        assert_eq!(config.client.api_key_header, "api-key");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.poller.frequency_secs, 30);
        assert!(!config.trace.enabled);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[client]
endpoint = "https://svc.example.com"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.client.endpoint.as_deref(), Some("https://svc.example.com"));
        // Defaults should still apply
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[client]
endpoint = "https://svc.example.com/base/"
api_version = "2024-05-01"
timeout_secs = 10
logging = true

[client.headers]
x-team = "birds"

[retry]
max_retries = 1
initial_backoff_ms = 100
max_backoff_ms = 1000

[poller]
frequency_secs = 2

[trace]
enabled = true
dir = "/tmp/corvid-traces"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.client.api_version.as_deref(), Some("2024-05-01"));
        assert_eq!(config.client.headers["x-team"], "birds");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.poll_options().frequency, Duration::from_secs(2));
        assert_eq!(
            config.resolve_trace_dir(None),
            PathBuf::from("/tmp/corvid-traces")
        );
        assert_eq!(config.endpoint().unwrap().path(), "/base/");
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_resolve_trace_dir() {
        let config = Config::default();
        let corvid_dir = PathBuf::from("/project/.corvid");
        assert_eq!(
            config.resolve_trace_dir(Some(&corvid_dir)),
            PathBuf::from("/project/.corvid/traces")
        );
    }

    #[test]
    fn test_validate_missing_endpoint() {
        let errors = Config::default().validate();
        assert!(errors.iter().any(|e| e.field == "client.endpoint"));
    }

    #[test]
    fn test_validate_bad_values() {
        let mut config = Config::default();
        config.client.endpoint = Some("not a url".to_string());
        config.client.headers.insert("bad header".to_string(), "x".to_string());
        config.retry.max_backoff_ms = 10;
        config.poller.frequency_secs = 0;

        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"client.endpoint".to_string()));
        assert!(fields.contains(&"client.headers".to_string()));
        assert!(fields.contains(&"retry.max_backoff_ms".to_string()));
        assert!(fields.contains(&"poller.frequency_secs".to_string()));
    }

    #[test]
    fn test_validate_missing_api_key_env() {
        let mut config = Config::default();
        config.client.endpoint = Some("https://svc.example.com".to_string());
        config.client.api_key_env = Some("CORVID_TEST_KEY_THAT_IS_NEVER_SET".to_string());

        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "client.api_key_env"));
        assert!(config.client_options().is_err());
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let root = tempfile::tempdir().unwrap();
        let corvid_dir = root.path().join(CORVID_DIR);
        std::fs::create_dir_all(&corvid_dir).unwrap();
        std::fs::write(
            corvid_dir.join(CONFIG_FILE),
            "[client]\nendpoint = \"https://svc.example.com\"\n",
        )
        .unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, found) = Config::find_and_load_from(&nested).unwrap().unwrap();
        assert_eq!(found, corvid_dir);
        assert_eq!(config.client.endpoint.as_deref(), Some("https://svc.example.com"));
    }

    #[test]
    fn test_client_options_from_config() {
        let mut config = Config::default();
        config.client.endpoint = Some("https://svc.example.com".to_string());
        config.client.api_version = Some("2024-05-01".to_string());
        config.client.headers.insert("x-team".to_string(), "birds".to_string());

        let options = config.client_options().unwrap();
        assert_eq!(options.api_version.as_deref(), Some("2024-05-01"));
        assert_eq!(options.per_call_policies.len(), 1);
        assert!(options.transport.is_some());
    }
}
