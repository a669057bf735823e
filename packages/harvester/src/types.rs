//! Messages passed between the harvest stages, and run statistics.

use std::time::Duration;

use crate::error::HarvesterError;

/// One identifier waiting to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub identifier: String,
}

impl WorkItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

/// Outcome of fetching one identifier.
#[derive(Debug)]
pub enum FetchResult {
    /// Raw response body of the `GetRecord` request.
    Record { identifier: String, payload: Vec<u8> },
    /// The record could not be fetched within its time budget.
    Failed {
        identifier: String,
        error: HarvesterError,
    },
}

impl FetchResult {
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Record { identifier, .. } | Self::Failed { identifier, .. } => identifier,
        }
    }
}

/// Counters a worker reports when it shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub fetched: usize,
    /// Identifiers the repository no longer knows.
    pub skipped: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// What the writer did with the results it received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub written: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Statistics of a completed harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// `ListIdentifiers` requests issued.
    pub pages: usize,
    /// Identifiers discovered and queued.
    pub identifiers: usize,
    /// Records written to the sink.
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}
