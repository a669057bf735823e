//! Record fetchers.
//!
//! A worker takes identifiers off the work queue and fetches each record with
//! `GetRecord`. Every attempt goes through the transport retries first; on top
//! of that an elapsed-time backoff retries transport, decode and protocol
//! failures until the record's time budget is spent. `idDoesNotExist` is not a
//! failure: repositories list identifiers they no longer hold records for.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::config::{Endpoint, HarvestConfig, RECORD_BACKOFF_MAX_INTERVAL};
use crate::error::{HarvesterError, Result};
use crate::http::RetryingFetcher;
use crate::response::{decode, ErrorCode, Verb};
use crate::retry::ElapsedBackoff;
use crate::types::{FetchResult, WorkItem, WorkerStats};

/// How often each worker logs progress, in records.
const LOG_EVERY_RECORDS: usize = 100;

/// What a successful fetch produced.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Record(Vec<u8>),
    /// The repository no longer knows the identifier.
    Missing,
}

/// Settings of the per-record elapsed-time backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordBackoff {
    pub initial: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl RecordBackoff {
    #[must_use]
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            initial: config.backoff_initial,
            max_interval: RECORD_BACKOFF_MAX_INTERVAL,
            max_elapsed: config.max_elapsed,
        }
    }

    fn start(&self) -> ElapsedBackoff {
        ElapsedBackoff::new(self.initial, self.max_interval, self.max_elapsed)
    }
}

pub struct Worker<'a> {
    name: String,
    endpoint: &'a Endpoint,
    format: &'a str,
    fetcher: RetryingFetcher<'a>,
    backoff: RecordBackoff,
}

impl<'a> Worker<'a> {
    pub fn new(
        name: impl Into<String>,
        endpoint: &'a Endpoint,
        format: &'a str,
        fetcher: RetryingFetcher<'a>,
        backoff: RecordBackoff,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            format,
            fetcher,
            backoff,
        }
    }

    /// Process work items until the queue is closed and empty.
    ///
    /// Stops early when the results channel is closed, which happens when the
    /// writer aborted the run.
    pub fn run(&self, queue: Receiver<WorkItem>, results: Sender<FetchResult>) -> WorkerStats {
        tracing::debug!(worker = %self.name, "started");
        let mut stats = WorkerStats::default();

        for item in queue.iter() {
            let result = match self.fetch_record(&item.identifier) {
                Ok(Outcome::Record(payload)) => {
                    stats.fetched += 1;
                    if stats.fetched % LOG_EVERY_RECORDS == 0 {
                        tracing::debug!(worker = %self.name, completed = stats.fetched, "progress");
                    }
                    FetchResult::Record {
                        identifier: item.identifier,
                        payload,
                    }
                }
                Ok(Outcome::Missing) => {
                    stats.skipped += 1;
                    tracing::debug!(worker = %self.name, identifier = %item.identifier, "skipping id");
                    continue;
                }
                Err(error) => {
                    stats.failed += 1;
                    FetchResult::Failed {
                        identifier: item.identifier,
                        error,
                    }
                }
            };

            if results.send(result).is_err() {
                tracing::debug!(worker = %self.name, "results channel closed");
                break;
            }
        }

        tracing::debug!(worker = %self.name, ?stats, "shut down");
        stats
    }

    fn fetch_record(&self, identifier: &str) -> Result<Outcome> {
        let url = self.endpoint.get_record_url(identifier, self.format);
        let mut backoff = self.backoff.start();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let error = match self.attempt(&url) {
                Ok(outcome) => return Ok(outcome),
                Err(error) => error,
            };

            let Some(delay) = backoff.next_delay() else {
                return Err(HarvesterError::RecordFailed {
                    identifier: identifier.to_string(),
                    attempts,
                    elapsed_ms: backoff.elapsed().as_millis(),
                    source: Box::new(error),
                });
            };

            tracing::warn!(
                worker = %self.name,
                identifier,
                attempt = attempts,
                ?delay,
                reason = %error,
                "retry"
            );
            thread::sleep(delay);
        }
    }

    /// One fetch + decode + protocol check.
    fn attempt(&self, url: &str) -> Result<Outcome> {
        let body = self.fetcher.fetch(url)?;
        let response = decode(&body, Verb::GetRecord).map_err(|e| HarvesterError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        match response.error {
            None => Ok(Outcome::Record(body)),
            Some(error) if error.code == ErrorCode::IdDoesNotExist => Ok(Outcome::Missing),
            Some(error) => Err(HarvesterError::Protocol {
                url: url.to_string(),
                error,
            }),
        }
    }
}
