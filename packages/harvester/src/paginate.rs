//! Walks the `ListIdentifiers` pages of a repository.
//!
//! Each discovered identifier becomes a [`WorkItem`] on the bounded work queue.
//! The walk ends when a page carries no resumption token. A page that cannot be
//! fetched or decoded ends the whole run.

use crossbeam_channel::Sender;
use indicatif::ProgressBar;

use crate::config::Endpoint;
use crate::error::{HarvesterError, Result};
use crate::http::RetryingFetcher;
use crate::response::{decode, ErrorCode, Payload, Verb};
use crate::types::WorkItem;

/// How often to log listing progress, in pages.
const LOG_EVERY_PAGES: usize = 10;

/// Result of a walk that did not fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationStats {
    /// Listing requests that returned a page.
    pub pages: usize,
    /// Identifiers placed on the work queue.
    pub identifiers: usize,
    /// The queue was closed by its consumers before the last page.
    pub interrupted: bool,
}

/// Producer side of the harvest pipeline.
pub struct PaginationWalker<'a> {
    endpoint: &'a Endpoint,
    format: &'a str,
    fetcher: RetryingFetcher<'a>,
    progress: ProgressBar,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(endpoint: &'a Endpoint, format: &'a str, fetcher: RetryingFetcher<'a>) -> Self {
        Self {
            endpoint,
            format,
            fetcher,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Enqueue every identifier of the repository.
    ///
    /// Blocks while the queue is full. Returns early with `interrupted` set when
    /// all receivers are gone.
    pub fn walk(&self, queue: &Sender<WorkItem>) -> Result<PaginationStats> {
        let mut stats = PaginationStats::default();
        let mut url = self.endpoint.list_identifiers_url(self.format);

        loop {
            tracing::debug!(url = %url, "requesting identifiers");
            let pages = stats.pages;
            let fail = |source: HarvesterError| HarvesterError::Pagination {
                pages,
                source: Box::new(source),
            };

            let body = self.fetcher.fetch(&url).map_err(fail)?;
            stats.pages += 1;

            let response = decode(&body, Verb::ListIdentifiers).map_err(|e| {
                fail(HarvesterError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })
            })?;

            if let Some(error) = response.error {
                // An empty repository (or format) answers with noRecordsMatch.
                if error.code == ErrorCode::NoRecordsMatch {
                    tracing::debug!(url = %url, message = %error.message, "no records match");
                    break;
                }
                return Err(fail(HarvesterError::Protocol { url, error }));
            }

            let Payload::ListIdentifiers(page) = response.payload else {
                return Err(fail(HarvesterError::Decode {
                    url,
                    message: "response carries no identifier list".to_string(),
                }));
            };

            for header in &page.headers {
                if header.identifier.is_empty() {
                    tracing::warn!(url = %url, "skipping header without identifier");
                    continue;
                }
                if queue.send(WorkItem::new(header.identifier.as_str())).is_err() {
                    tracing::debug!(pages = stats.pages, "work queue closed, stopping pagination");
                    stats.interrupted = true;
                    return Ok(stats);
                }
                stats.identifiers += 1;
            }

            self.progress.set_message(format!(
                "{} identifiers from {} pages",
                stats.identifiers, stats.pages
            ));

            let Some(token) = page.next_token() else {
                break;
            };

            if stats.pages % LOG_EVERY_PAGES == 0 {
                let (cursor, size) = page
                    .resumption_token
                    .as_ref()
                    .map(|t| (t.cursor, t.complete_list_size))
                    .unwrap_or_default();
                tracing::debug!(
                    pages = stats.pages,
                    identifiers = stats.identifiers,
                    cursor = ?cursor,
                    complete_list_size = ?size,
                    "listing progress"
                );
            }

            url = self.endpoint.resume_list_identifiers_url(token);
        }

        Ok(stats)
    }
}
