//! Todo list collector.
//!
//! Issues a single GET against the todos endpoint and returns the decoded
//! JSON body. There is no pagination, no query string and no retry here; the
//! DAG runner owns retries.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{PipelineConfig, DEFAULT_ENDPOINT_URL};

use super::types::{json_type_name, CollectorError, CollectorResult};

/// Collector for the public todos endpoint.
///
/// # Example
///
/// ```ignore
/// use teddy_pipeline::collectors::TodoCollector;
///
/// let collector = TodoCollector::new()?;
/// let payload = collector.fetch().await?;
/// ```
#[derive(Debug, Clone)]
pub struct TodoCollector {
    /// HTTP client for API requests.
    http_client: Client,
    /// Endpoint URL.
    url: String,
}

impl TodoCollector {
    /// Creates a collector for the default endpoint with no timeout.
    pub fn new() -> CollectorResult<Self> {
        Self::with_url(DEFAULT_ENDPOINT_URL, None)
    }

    /// Creates a collector for `url`.
    ///
    /// With `timeout` unset a stalled server blocks the fetch indefinitely.
    pub fn with_url(url: impl Into<String>, timeout: Option<Duration>) -> CollectorResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| CollectorError::HttpError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    /// Creates a collector from pipeline settings.
    pub fn from_config(config: &PipelineConfig) -> CollectorResult<Self> {
        Self::with_url(config.endpoint_url.clone(), config.fetch_timeout)
    }

    /// The endpoint this collector reads.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the item list.
    ///
    /// # Errors
    ///
    /// - `FetchFailed` if the endpoint answers with a non-success status
    /// - `HttpError` if the request cannot be sent or the body cannot be read
    /// - `ParseError` if the body is not a JSON array
    pub async fn fetch(&self) -> CollectorResult<Value> {
        debug!(url = %self.url, "Fetching todos");

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CollectorError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::FetchFailed {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollectorError::HttpError(e.to_string()))?;

        let payload: Value = serde_json::from_slice(&body)
            .map_err(|e| CollectorError::ParseError(format!("Invalid JSON body: {}", e)))?;

        let Some(items) = payload.as_array() else {
            return Err(CollectorError::ParseError(format!(
                "Expected a JSON array, got {}",
                json_type_name(&payload)
            )));
        };

        info!(url = %self.url, count = items.len(), "Fetched todos");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let collector = TodoCollector::new().unwrap();
        assert_eq!(collector.url(), "https://jsonplaceholder.typicode.com/todos/");
    }

    #[test]
    fn test_from_config() {
        let config = PipelineConfig::new()
            .with_endpoint_url("http://localhost:1/todos/")
            .with_fetch_timeout(Duration::from_secs(5));
        let collector = TodoCollector::from_config(&config).unwrap();
        assert_eq!(collector.url(), "http://localhost:1/todos/");
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_http_error() {
        let collector =
            TodoCollector::with_url("http://127.0.0.1:1/todos/", Some(Duration::from_secs(2)))
                .unwrap();
        let err = collector.fetch().await.unwrap_err();
        assert!(matches!(err, CollectorError::HttpError(_)));
    }
}
