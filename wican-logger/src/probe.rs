//! HTTP access to the WiCAN endpoint
//!
//! Two seams sit on top of the same reqwest client:
//! - `Prober`: "is there a WiCAN here?" collapsed to a boolean
//! - `Transport`: fetch one JSON object payload for the polling loop
//!
//! Every request carries reqwest's own timeout plus an outer hard deadline,
//! so a wedged connection never stalls discovery or a poll cycle.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::address::Address;

/// One decoded WiCAN response
pub type Payload = Map<String, Value>;

/// Slack granted on top of the request timeout before the outer deadline fires
pub const PROBE_MARGIN: Duration = Duration::from_millis(250);

/// Fetch failures, all of them non-fatal
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out after {timeout:?}")]
    TimedOut { url: String, timeout: Duration },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned an unusable body: {reason}")]
    Malformed { url: String, reason: String },
}

/// Bounded-time reachability + verification check
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &Address, timeout: Duration) -> bool;
}

/// Source of data payloads for the polling loop
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, address: &Address, timeout: Duration) -> Result<Payload, FetchError>;
}

/// reqwest-backed client for the WiCAN data endpoint
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    endpoint_path: String,
}

impl HttpClient {
    pub fn new(endpoint_path: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("wican-logger/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint_path: endpoint_path.into(),
        })
    }

    /// GET the endpoint and parse the body as any JSON value
    pub async fn get_json(&self, address: &Address, timeout: Duration) -> Result<Value, FetchError> {
        let url = address.endpoint_url(&self.endpoint_path);

        match tokio::time::timeout(timeout + PROBE_MARGIN, self.request(&url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::TimedOut { url, timeout }),
        }
    }

    async fn request(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify(url, timeout, e))?;

        serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

fn classify(url: &str, timeout: Duration, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::TimedOut {
            url: url.to_string(),
            timeout,
        }
    } else {
        FetchError::Unreachable {
            url: url.to_string(),
            source: error,
        }
    }
}

#[async_trait]
impl Prober for HttpClient {
    async fn probe(&self, address: &Address, timeout: Duration) -> bool {
        match self.get_json(address, timeout).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Probe {} negative: {}", address, e);
                false
            }
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn fetch(&self, address: &Address, timeout: Duration) -> Result<Payload, FetchError> {
        match self.get_json(address, timeout).await? {
            Value::Object(map) => Ok(map),
            other => Err(FetchError::Malformed {
                url: address.endpoint_url(&self.endpoint_path),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
