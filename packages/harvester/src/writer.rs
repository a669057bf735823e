//! Single consumer of fetch results.
//!
//! Payloads are written verbatim in the order they arrive, which is the order
//! in which workers finish, not the order identifiers were listed. Failed
//! records are logged in best-effort mode and abort the run otherwise. A
//! failing sink always aborts the run.

use std::io::Write;

use crossbeam_channel::{Receiver, Sender};
use indicatif::ProgressBar;

use crate::error::Result;
use crate::types::{FetchResult, WriterReport};

/// How often to log writer progress, in records.
const LOG_EVERY_RECORDS: usize = 1000;

pub struct ResultWriter<W> {
    sink: W,
    best_effort: bool,
    progress: ProgressBar,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(sink: W, best_effort: bool) -> Self {
        Self {
            sink,
            best_effort,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Drain `results` and report the outcome on `done`.
    pub fn run(self, results: Receiver<FetchResult>, done: Sender<Result<WriterReport>>) {
        let outcome = self.drain(results);
        if done.send(outcome).is_err() {
            tracing::error!("writer outcome could not be delivered");
        }
    }

    /// Write every successful payload until the channel is closed and empty.
    ///
    /// Returns on the first fatal error without touching the sink again; the
    /// receiver is dropped on return, which stops the workers.
    pub fn drain(mut self, results: Receiver<FetchResult>) -> Result<WriterReport> {
        let mut report = WriterReport::default();

        for result in results.iter() {
            match result {
                FetchResult::Record {
                    identifier,
                    payload,
                } => {
                    self.sink.write_all(&payload).inspect_err(|e| {
                        tracing::error!(identifier = %identifier, error = %e, "write failed");
                    })?;
                    report.written += 1;
                    report.bytes += payload.len() as u64;
                    self.progress.inc(1);
                    if report.written % LOG_EVERY_RECORDS == 0 {
                        tracing::debug!(written = report.written, "writer progress");
                    }
                }
                FetchResult::Failed { identifier, error } => {
                    if !self.best_effort {
                        tracing::error!(identifier = %identifier, error = %error, "record failed, aborting");
                        return Err(error);
                    }
                    report.failed += 1;
                    tracing::warn!(identifier = %identifier, error = %error, "record failed, skipping");
                }
            }
        }

        self.sink.flush()?;
        Ok(report)
    }
}
