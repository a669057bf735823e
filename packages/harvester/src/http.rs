//! HTTP transport and the transport-level retry layer.
//!
//! [`Transport`] is the seam between the harvester and the network: the
//! production implementation wraps a blocking `reqwest` client, tests plug in
//! scripted responses. [`RetryingFetcher`] adds bounded retries on top and knows
//! nothing about OAI-PMH.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

use crate::error::{HarvesterError, Result};
use crate::retry::TransportRetry;

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("oai-harvester/", env!("CARGO_PKG_VERSION"));

/// URLs longer than this are shortened in retry logs.
const LOG_URL_MAX_LEN: usize = 45;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a single HTTP exchange produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

/// A single HTTP GET, without retries.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> std::result::Result<HttpResponse, TransportFailure>;
}

/// Blocking `reqwest` transport with a hard per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> std::result::Result<HttpResponse, TransportFailure> {
        let response = self.client.get(url).send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(classify)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportFailure::Connect(err.to_string())
    } else {
        TransportFailure::Other(err.to_string())
    }
}

/// Keep the tail of a URL for log lines: `..` followed by the last 45 characters.
///
/// # Examples
/// ```
/// use oai_harvester::http::shorten_url;
///
/// assert_eq!(shorten_url("http://example.org/oai"), "http://example.org/oai");
/// let long = "http://example.org/oai?verb=GetRecord&identifier=oai:example.org:12345";
/// assert_eq!(shorten_url(long), "..rb=GetRecord&identifier=oai:example.org:12345");
/// ```
pub fn shorten_url(url: &str) -> String {
    let len = url.chars().count();
    if len <= LOG_URL_MAX_LEN {
        return url.to_string();
    }
    let tail: String = url.chars().skip(len - LOG_URL_MAX_LEN).collect();
    format!("..{tail}")
}

/// Transport wrapper that retries failed exchanges with exponential backoff.
///
/// Connection errors, timeouts and non-2xx statuses are all retried. The
/// response body is returned untouched.
pub struct RetryingFetcher<'a> {
    transport: &'a dyn Transport,
    policy: TransportRetry,
    name: String,
}

impl<'a> RetryingFetcher<'a> {
    /// `name` identifies the caller in log lines.
    pub fn new(transport: &'a dyn Transport, policy: TransportRetry, name: impl Into<String>) -> Self {
        Self {
            transport,
            policy,
            name: name.into(),
        }
    }

    /// Download `url`, retrying transport failures.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let max_attempts = self.policy.max_attempts();
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(
                    client = %self.name,
                    attempt,
                    ?delay,
                    "Retrying after delay"
                );
                thread::sleep(delay);
            }

            match self.transport.get(url) {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => {
                    last_error = format!("HTTP status {}", response.status);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if self.policy.has_attempt_after(attempt) {
                tracing::warn!(
                    client = %self.name,
                    attempt = attempt + 1,
                    max_attempts,
                    url = %shorten_url(url),
                    error = %last_error,
                    "backoff"
                );
            } else {
                tracing::debug!(
                    client = %self.name,
                    attempts = max_attempts,
                    url = %shorten_url(url),
                    error = %last_error,
                    "giving up"
                );
            }
        }

        Err(HarvesterError::Transport {
            url: url.to_string(),
            attempts: max_attempts,
            message: last_error,
        })
    }
}
