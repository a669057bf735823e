//! Main harvester service that ties all components together.
//!
//! The run is a bounded fan-out/fan-in pipeline:
//!
//! ```text
//! walker ──work queue──▶ worker-00 … worker-NN ──results──▶ writer ──done──▶ coordinator
//! ```
//!
//! The three channels are the only shared state. Shutdown is strictly ordered:
//! close the work queue, join the workers, close the results channel, wait for
//! the writer's done signal. Records reach the sink in completion order, which
//! generally differs from listing order.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;
use indicatif::ProgressBar;

use crate::config::{Endpoint, HarvestConfig};
use crate::error::{HarvesterError, Result};
use crate::http::{ReqwestTransport, RetryingFetcher, Transport};
use crate::paginate::PaginationWalker;
use crate::retry::TransportRetry;
use crate::types::{FetchResult, HarvestSummary, WorkItem, WorkerStats, WriterReport};
use crate::worker::{RecordBackoff, Worker};
use crate::writer::ResultWriter;

/// Harvests one repository endpoint.
pub struct Harvester {
    endpoint: Endpoint,
    config: HarvestConfig,
    transport: Arc<dyn Transport>,
    progress: ProgressBar,
}

impl Harvester {
    /// Create a harvester that talks HTTP through `reqwest`.
    pub fn new(endpoint: Endpoint, config: HarvestConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.http_timeout)?;
        Self::with_transport(endpoint, config, Arc::new(transport))
    }

    /// Create a harvester on top of a custom transport.
    pub fn with_transport(
        endpoint: Endpoint,
        config: HarvestConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            endpoint,
            config,
            transport,
            progress: ProgressBar::hidden(),
        })
    }

    /// Report pages and written records on a progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvest every record of the endpoint into `sink`.
    ///
    /// Returns the first fatal error: a listing page that could not be walked,
    /// a failing sink, or (unless best-effort mode is on) a record that could
    /// not be fetched within its time budget.
    ///
    /// A pagination failure stops the listing at once, but identifiers already
    /// on the queue are still fetched and written before the error is returned.
    pub fn run<W: Write + Send>(&self, sink: W) -> Result<HarvestSummary> {
        let started = Instant::now();
        let retry = TransportRetry::new(self.config.max_retries, self.config.retry_base_delay);
        let backoff = RecordBackoff::from_config(&self.config);
        let transport: &dyn Transport = self.transport.as_ref();
        let format = self.config.format.as_str();

        tracing::info!(
            endpoint = %self.endpoint.as_str(),
            format,
            workers = self.config.workers,
            best_effort = self.config.best_effort,
            "starting harvest"
        );

        let (queue_tx, queue_rx) = bounded::<WorkItem>(self.config.queue_capacity());
        let (results_tx, results_rx) = bounded::<FetchResult>(self.config.workers);
        let (done_tx, done_rx) = bounded::<Result<WriterReport>>(1);

        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(self.config.workers);
            for i in 0..self.config.workers {
                let name = format!("worker-{i:02}");
                let fetcher = RetryingFetcher::new(transport, retry, name.as_str());
                let worker = Worker::new(name.as_str(), &self.endpoint, format, fetcher, backoff);
                let queue = queue_rx.clone();
                let results = results_tx.clone();
                let handle = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || worker.run(queue, results))
                    .map_err(|source| HarvesterError::Spawn { name, source })?;
                workers.push(handle);
            }
            // Workers hold the only receivers of the queue and senders of the results.
            drop(queue_rx);
            drop(results_tx);

            let writer = ResultWriter::new(sink, self.config.best_effort)
                .with_progress(self.progress.clone());
            let writer_handle = thread::Builder::new()
                .name("writer".to_string())
                .spawn_scoped(scope, move || writer.run(results_rx, done_tx))
                .map_err(|source| HarvesterError::Spawn {
                    name: "writer".to_string(),
                    source,
                })?;

            let walker = PaginationWalker::new(
                &self.endpoint,
                format,
                RetryingFetcher::new(transport, retry, "main"),
            )
            .with_progress(self.progress.clone());
            let pagination = walker.walk(&queue_tx);

            tracing::debug!("shutting down workers");
            drop(queue_tx);

            let mut worker_stats = WorkerStats::default();
            let mut worker_panicked = false;
            for handle in workers {
                match handle.join() {
                    Ok(stats) => worker_stats += stats,
                    Err(_) => worker_panicked = true,
                }
            }

            // All result senders are gone now, so the writer finishes its drain.
            let writer_outcome = done_rx.recv();
            if writer_handle.join().is_err() {
                return Err(HarvesterError::ThreadPanicked("writer"));
            }
            let writer_outcome =
                writer_outcome.map_err(|_| HarvesterError::ThreadPanicked("writer"))?;

            let pagination = pagination?;
            let report = writer_outcome?;
            if worker_panicked {
                return Err(HarvesterError::ThreadPanicked("worker"));
            }

            let summary = HarvestSummary {
                pages: pagination.pages,
                identifiers: pagination.identifiers,
                written: report.written,
                skipped: worker_stats.skipped,
                failed: report.failed,
                bytes: report.bytes,
                elapsed: started.elapsed(),
            };

            tracing::info!(
                identifiers = summary.identifiers,
                requests = summary.pages,
                written = summary.written,
                skipped = summary.skipped,
                failed = summary.failed,
                elapsed = ?summary.elapsed,
                "harvest finished"
            );

            Ok(summary)
        })
    }
}
