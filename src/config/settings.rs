//! Runtime settings for a pipeline run.

use std::path::PathBuf;
use std::time::Duration;

use super::{ConfigError, EnvLookup};

/// Endpoint the fetch task reads from.
pub const DEFAULT_ENDPOINT_URL: &str = "https://jsonplaceholder.typicode.com/todos/";

/// Registry id of the target database.
pub const DEFAULT_CONN_ID: &str = "postgres_conn";

/// Retries per task after the first attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Delay between attempts of the same task.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Settings for the fetch/store pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// URL the fetch task issues its GET against.
    pub endpoint_url: String,
    /// Connection id resolved by the store task and the migration runner.
    pub conn_id: String,
    /// Retries per task after the first failed attempt.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Optional HTTP timeout. `None` means the request may block forever.
    pub fetch_timeout: Option<Duration>,
    /// YAML file with named connections.
    pub connections_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            conn_id: DEFAULT_CONN_ID.to_string(),
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            fetch_timeout: None,
            connections_file: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_ENDPOINT_URL`: fetch URL (default: the todos endpoint)
    /// - `PIPELINE_CONN_ID`: connection id (default: postgres_conn)
    /// - `PIPELINE_RETRIES`: retries per task (default: 1)
    /// - `PIPELINE_RETRY_DELAY_SECS`: delay between attempts (default: 300)
    /// - `PIPELINE_FETCH_TIMEOUT_SECS`: HTTP timeout (default: none)
    /// - `PIPELINE_CONNECTIONS_FILE`: named connection registry file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&EnvLookup::process())
    }

    /// Creates configuration from an arbitrary variable source.
    pub fn from_lookup(env: &EnvLookup) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = env.get("PIPELINE_ENDPOINT_URL") {
            config.endpoint_url = val;
        }

        if let Some(val) = env.get("PIPELINE_CONN_ID") {
            config.conn_id = val;
        }

        if let Some(val) = env.get("PIPELINE_RETRIES") {
            config.retries = parse_env_value(&val, "PIPELINE_RETRIES")?;
        }

        if let Some(val) = env.get("PIPELINE_RETRY_DELAY_SECS") {
            let secs: u64 = parse_env_value(&val, "PIPELINE_RETRY_DELAY_SECS")?;
            config.retry_delay = Duration::from_secs(secs);
        }

        if let Some(val) = env.get("PIPELINE_FETCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "PIPELINE_FETCH_TIMEOUT_SECS")?;
            config.fetch_timeout = Some(Duration::from_secs(secs));
        }

        if let Some(val) = env.get("PIPELINE_CONNECTIONS_FILE") {
            config.connections_file = Some(PathBuf::from(val));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conn_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "conn_id must not be empty".to_string(),
            ));
        }

        if !(self.endpoint_url.starts_with("http://") || self.endpoint_url.starts_with("https://"))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "endpoint_url must be an http(s) URL, got '{}'",
                self.endpoint_url
            )));
        }

        if self.fetch_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationFailed(
                "fetch timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sets the endpoint URL.
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    /// Sets the connection id.
    pub fn with_conn_id(mut self, conn_id: impl Into<String>) -> Self {
        self.conn_id = conn_id.into();
        self
    }

    /// Sets the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets an HTTP timeout for the fetch task.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }
}

fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(config.conn_id, "postgres_conn");
        assert_eq!(config.retries, 1);
        assert_eq!(config.retry_delay, Duration::from_secs(300));
        assert!(config.fetch_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let env = EnvLookup::from_pairs([
            ("PIPELINE_ENDPOINT_URL", "http://127.0.0.1:9000/todos/"),
            ("PIPELINE_CONN_ID", "warehouse"),
            ("PIPELINE_RETRIES", "3"),
            ("PIPELINE_RETRY_DELAY_SECS", "0"),
            ("PIPELINE_FETCH_TIMEOUT_SECS", "30"),
            ("PIPELINE_CONNECTIONS_FILE", "/etc/teddy/connections.yaml"),
        ]);

        let config = PipelineConfig::from_lookup(&env).expect("valid");
        assert_eq!(config.endpoint_url, "http://127.0.0.1:9000/todos/");
        assert_eq!(config.conn_id, "warehouse");
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_delay, Duration::ZERO);
        assert_eq!(config.fetch_timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            config.connections_file,
            Some(PathBuf::from("/etc/teddy/connections.yaml"))
        );
    }

    #[test]
    fn test_invalid_number() {
        let env = EnvLookup::from_pairs([("PIPELINE_RETRIES", "many")]);
        assert!(matches!(
            PipelineConfig::from_lookup(&env),
            Err(ConfigError::InvalidValue { key, .. }) if key == "PIPELINE_RETRIES"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = PipelineConfig::new().with_endpoint_url("ftp://example.com/todos");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_conn_id() {
        let config = PipelineConfig::new().with_conn_id("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = PipelineConfig::new().with_fetch_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
