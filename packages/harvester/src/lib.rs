//! OAI Harvester - Download every record of an OAI-PMH repository.
//!
//! The harvester lists all identifiers of a repository with `ListIdentifiers`,
//! following resumption tokens until the last page, and fetches each record
//! individually with `GetRecord` using a pool of worker threads. Raw responses
//! are written to a single output sink in the order they complete.
//!
//! # Example
//!
//! ```
//! use oai_harvester::config::{Endpoint, HarvestConfig};
//!
//! let endpoint = Endpoint::parse("http://export.arxiv.org/oai2").unwrap();
//! assert_eq!(
//!     endpoint.list_identifiers_url("oai_dc"),
//!     "http://export.arxiv.org/oai2?verb=ListIdentifiers&metadataPrefix=oai_dc"
//! );
//! assert!(HarvestConfig::default().with_workers(0).validate().is_err());
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Defaults, validation and request URLs
//! - [`error`]: Error types and Result alias
//! - [`response`]: OAI-PMH response decoding
//! - [`xml`]: XML utilities
//! - [`retry`]: Transport and per-record retry policies
//! - [`http`]: Transport seam and retrying fetcher
//! - [`paginate`]: Identifier listing walker
//! - [`worker`]: Record fetchers
//! - [`writer`]: Output sink consumer
//! - [`harvester`]: Run coordinator
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod harvester;
pub mod http;
pub mod paginate;
pub mod response;
pub mod retry;
pub mod types;
pub mod worker;
pub mod writer;
pub mod xml;

pub use harvester::Harvester;

pub use config::{Endpoint, HarvestConfig};
pub use error::{HarvesterError, Result};
pub use types::{FetchResult, HarvestSummary, WorkItem};
