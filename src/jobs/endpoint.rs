//! Outbound calls for dynamic jobs
//!
//! A dynamic job names an external endpoint. It is probed with a HEAD request
//! when the job is created or updated, and mapped results are POSTed to it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;

/// Error type for endpoint calls
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The URL lacks a scheme or host, or does not parse at all
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The underlying HTTP request failed (network, DNS, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code
    #[error("Endpoint returned HTTP {0}")]
    HttpStatus(u16),
}

pub type EndpointResult<T> = Result<T, EndpointError>;

/// Parse an endpoint URL and require an http(s) scheme and a host
pub fn parse_endpoint(url: &str) -> EndpointResult<Url> {
    let invalid = |reason: &str| EndpointError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(parsed)
}

/// Client for the reachability probe and result forwarding
#[async_trait]
pub trait EndpointClient: Send + Sync {
    /// Check that the endpoint exists and answers with a 2xx status
    async fn probe(&self, url: &str) -> EndpointResult<()>;

    /// POST a mapped result as JSON
    async fn forward(&self, url: &str, payload: &Value) -> EndpointResult<()>;
}

/// reqwest-backed [`EndpointClient`]
#[derive(Debug, Clone)]
pub struct HttpEndpointClient {
    client: reqwest::Client,
    probe_timeout: Duration,
    forward_timeout: Duration,
}

impl HttpEndpointClient {
    pub fn new(config: &EngineConfig) -> EndpointResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            probe_timeout: config.probe_timeout(),
            forward_timeout: config.forward_timeout(),
        })
    }

    fn check_status(response: &reqwest::Response) -> EndpointResult<()> {
        if !response.status().is_success() {
            return Err(EndpointError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl EndpointClient for HttpEndpointClient {
    async fn probe(&self, url: &str) -> EndpointResult<()> {
        let target = parse_endpoint(url)?;
        let response = self
            .client
            .head(target)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        debug!(url, status = response.status().as_u16(), "Endpoint probed");
        Self::check_status(&response)
    }

    async fn forward(&self, url: &str, payload: &Value) -> EndpointResult<()> {
        let target = parse_endpoint(url)?;
        let response = self
            .client
            .post(target)
            .timeout(self.forward_timeout)
            .json(payload)
            .send()
            .await?;
        debug!(url, status = response.status().as_u16(), "Result forwarded");
        Self::check_status(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert!(parse_endpoint("https://hooks.example.com/in").is_ok());
        assert!(parse_endpoint("http://localhost:8080").is_ok());
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(EndpointError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_endpoint("ftp://example.com/x"),
            Err(EndpointError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_endpoint("mailto:someone@example.com"),
            Err(EndpointError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            EndpointError::HttpStatus(502).to_string(),
            "Endpoint returned HTTP 502"
        );
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        assert!(
            EndpointError::Request(req_err)
                .to_string()
                .contains("HTTP request failed")
        );
    }

    #[tokio::test]
    async fn test_probe_rejects_malformed_url_without_request() {
        let client = HttpEndpointClient::new(&EngineConfig::default()).unwrap();
        assert!(matches!(
            client.probe("example.com/no-scheme").await,
            Err(EndpointError::InvalidUrl { .. })
        ));
    }
}
