//! Error types for the harvester.
//!
//! A single `HarvesterError` covers every failure the engine can report. The
//! variants follow the retry taxonomy: transport and decode failures are retried
//! by the fetch layers, protocol errors are classified by the workers, and
//! pagination and output failures always end the run.

use thiserror::Error;

use crate::response::ProtocolError;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Endpoint is not an absolute http(s) URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Duration argument could not be parsed.
    #[error("Invalid duration '{0}'. Expected e.g. 500ms, 12s, 2m or 1h")]
    InvalidDuration(String),

    /// HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure that survived every retry.
    #[error("Request to {url} failed after {attempts} attempt(s): {message}")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Response body could not be decoded.
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Repository answered with a protocol error.
    #[error("{url} returned {error}")]
    Protocol { url: String, error: ProtocolError },

    /// Listing pages could not be walked to the end.
    #[error("Pagination failed after {pages} page(s): {source}")]
    Pagination {
        pages: usize,
        #[source]
        source: Box<HarvesterError>,
    },

    /// A single record could not be fetched within its time budget.
    #[error("Record {identifier} failed after {attempts} attempt(s) in {elapsed_ms}ms: {source}")]
    RecordFailed {
        identifier: String,
        attempts: u32,
        elapsed_ms: u128,
        #[source]
        source: Box<HarvesterError>,
    },

    /// Writing to the output sink failed.
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// A pipeline thread could not be started.
    #[error("Failed to start {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread went away without reporting.
    #[error("Harvest {0} thread terminated unexpectedly")]
    ThreadPanicked(&'static str),
}

impl HarvesterError {
    /// Whether this error ends the whole run regardless of best-effort mode.
    #[must_use]
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::Pagination { .. } | Self::Output(_) | Self::Spawn { .. } | Self::ThreadPanicked(_)
        )
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
