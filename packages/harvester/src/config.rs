//! Configuration constants, validation and request URLs for the harvester.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::error::{HarvesterError, Result};
use crate::response::Verb;

/// Metadata format requested when none is given.
pub const DEFAULT_FORMAT: &str = "oai_dc";

/// Transport-level retries per request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Time budget for fetching a single record, including protocol retries.
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(12);

/// Per-request HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 5;

/// Base delay for transport retries; doubled on every attempt.
pub const TRANSPORT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// First delay of the per-record backoff.
pub const RECORD_BACKOFF_INITIAL: Duration = Duration::from_millis(500);

/// Upper bound for a single per-record backoff delay.
pub const RECORD_BACKOFF_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Duration syntax accepted on the command line: `500ms`, `12s`, `2m`, `1h` or `12`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<value>\d+(?:\.\d+)?)\s*(?P<unit>ms|s|m|h)?$").expect("valid regex")
});

/// Default worker count: four connections per available core.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 4
}

/// Parse a human-friendly duration.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use oai_harvester::config::parse_duration;
///
/// assert_eq!(parse_duration("12s").unwrap(), Duration::from_secs(12));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || HarvesterError::InvalidDuration(input.to_string());
    let caps = DURATION_PATTERN.captures(input.trim()).ok_or_else(invalid)?;

    let value: f64 = caps["value"].parse().map_err(|_| invalid())?;
    let secs = match caps.name("unit").map(|m| m.as_str()) {
        Some("ms") => value / 1000.0,
        Some("m") => value * 60.0,
        Some("h") => value * 3600.0,
        _ => value,
    };

    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

/// Base address of an OAI-PMH repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    /// Validate a base URL.
    ///
    /// Any query string on the base URL is dropped: each request carries its
    /// own complete set of arguments.
    ///
    /// # Examples
    /// ```
    /// use oai_harvester::config::Endpoint;
    ///
    /// assert!(Endpoint::parse("http://export.arxiv.org/oai2").is_ok());
    /// assert!(Endpoint::parse("export.arxiv.org/oai2").is_err());
    /// assert!(Endpoint::parse("ftp://example.org/oai").is_err());
    /// ```
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = |reason: String| HarvesterError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let mut base = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.base.as_str()
    }

    fn request(&self, verb: Verb, args: &[(&str, &str)]) -> String {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verb", verb.as_str());
            for (key, value) in args {
                query.append_pair(key, value);
            }
        }
        url.into()
    }

    /// First page of the identifier listing.
    #[must_use]
    pub fn list_identifiers_url(&self, format: &str) -> String {
        self.request(Verb::ListIdentifiers, &[("metadataPrefix", format)])
    }

    /// Follow-up page. The token is the only argument besides the verb.
    #[must_use]
    pub fn resume_list_identifiers_url(&self, token: &str) -> String {
        self.request(Verb::ListIdentifiers, &[("resumptionToken", token)])
    }

    /// Full record for one identifier.
    #[must_use]
    pub fn get_record_url(&self, identifier: &str, format: &str) -> String {
        self.request(
            Verb::GetRecord,
            &[("identifier", identifier), ("metadataPrefix", format)],
        )
    }
}

/// Options of a harvest run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    /// Metadata prefix, e.g. `oai_dc`.
    pub format: String,
    /// Transport retries per request.
    pub max_retries: u32,
    /// Time budget per record, including protocol-level retries.
    pub max_elapsed: Duration,
    /// Number of concurrent record fetchers.
    pub workers: usize,
    /// Log failed records and carry on instead of aborting.
    pub best_effort: bool,
    pub http_timeout: Duration,
    pub retry_base_delay: Duration,
    pub backoff_initial: Duration,
    /// Capacity of the work queue; 0 means one slot per worker.
    pub queue_capacity: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_elapsed: DEFAULT_MAX_ELAPSED,
            workers: default_workers(),
            best_effort: false,
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            retry_base_delay: TRANSPORT_RETRY_BASE_DELAY,
            backoff_initial: RECORD_BACKOFF_INITIAL,
            queue_capacity: 0,
        }
    }
}

impl HarvestConfig {
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_backoff_initial(mut self, delay: Duration) -> Self {
        self.backoff_initial = delay;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Effective work queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            self.workers
        } else {
            self.queue_capacity
        }
    }

    /// Check the configuration once before a run.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(HarvesterError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.format.trim().is_empty() {
            return Err(HarvesterError::InvalidConfig(
                "metadata format must not be empty".to_string(),
            ));
        }
        if self.max_elapsed.is_zero() {
            return Err(HarvesterError::InvalidConfig(
                "max elapsed time must be greater than zero".to_string(),
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(HarvesterError::InvalidConfig(
                "HTTP timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
