//! Command-line interface for the harvester.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{
    default_workers, parse_duration, Endpoint, HarvestConfig, DEFAULT_FORMAT, DEFAULT_MAX_RETRIES,
};
use crate::error::{HarvesterError, Result};
use crate::harvester::Harvester;
use crate::types::HarvestSummary;

/// Harvest a complete OAI-PMH endpoint by requesting records one by one.
///
/// Records are written to stdout (or --output) in the order they are fetched.
#[derive(Debug, Parser)]
#[command(name = "oaicrawl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// OAI-PMH endpoint (e.g., http://export.arxiv.org/oai2)
    pub endpoint: String,

    /// Metadata format
    #[arg(short, long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    /// Max number of attempts per HTTP request
    #[arg(short = 'r', long = "retry", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Max time spent on a single record, retries included
    #[arg(short = 'e', long = "max-elapsed", default_value = "12s", value_parser = parse_duration)]
    pub max_elapsed: Duration,

    /// Number of parallel connections
    #[arg(short, long, default_value_t = default_workers())]
    pub workers: usize,

    /// Skip records that keep failing instead of aborting
    #[arg(short, long)]
    pub best_effort: bool,

    /// Write records to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// More logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Harvest options selected on the command line.
    #[must_use]
    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig::default()
            .with_format(self.format.as_str())
            .with_max_retries(self.max_retries)
            .with_max_elapsed(self.max_elapsed)
            .with_workers(self.workers)
            .with_best_effort(self.best_effort)
    }
}

/// Run the CLI with parsed arguments.
pub fn run(cli: Cli) -> Result<()> {
    let endpoint = Endpoint::parse(&cli.endpoint)?;
    let progress = create_progress(cli.verbose);
    let harvester = Harvester::new(endpoint, cli.harvest_config())?.with_progress(progress.clone());

    let outcome = match &cli.output {
        Some(path) => File::create(path)
            .map_err(HarvesterError::from)
            .and_then(|file| harvester.run(BufWriter::new(file))),
        None => harvester.run(BufWriter::new(io::stdout())),
    };
    progress.finish_and_clear();

    let summary = outcome?;
    print_summary(&summary);
    Ok(())
}

/// Spinner on stderr, only for interactive non-verbose runs.
fn create_progress(verbose: bool) -> ProgressBar {
    if verbose || !Term::stderr().is_term() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {pos} records written, {msg} [{elapsed}]")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_summary(summary: &HarvestSummary) {
    let mut line = format!(
        "{} {} records from {} identifiers ({} requests) in {:.1?}",
        style("Harvested").green().bold(),
        summary.written,
        summary.identifiers,
        summary.pages,
        summary.elapsed,
    );
    if summary.skipped > 0 {
        line.push_str(&format!(", {} skipped", summary.skipped));
    }
    if summary.failed > 0 {
        line.push_str(&format!(", {}", style(format!("{} failed", summary.failed)).yellow().bold()));
    }
    eprintln!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::parse_from(["oaicrawl", "http://export.arxiv.org/oai2"]);

        assert_eq!(cli.endpoint, "http://export.arxiv.org/oai2");
        assert_eq!(cli.format, "oai_dc");
        assert_eq!(cli.max_retries, 3);
        assert_eq!(cli.max_elapsed, Duration::from_secs(12));
        assert_eq!(cli.workers, default_workers());
        assert!(!cli.best_effort);
        assert!(!cli.verbose);
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_parse_options() {
        let cli = Cli::parse_from([
            "oaicrawl",
            "-f",
            "marc21",
            "--retry",
            "5",
            "-e",
            "500ms",
            "-w",
            "8",
            "-b",
            "-v",
            "-o",
            "out.xml",
            "http://example.org/oai",
        ]);

        let config = cli.harvest_config();
        assert_eq!(config.format, "marc21");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_elapsed, Duration::from_millis(500));
        assert_eq!(config.workers, 8);
        assert!(config.best_effort);
        assert!(cli.verbose);
        assert_eq!(cli.output, Some(PathBuf::from("out.xml")));
    }

    #[test]
    fn test_cli_requires_endpoint() {
        assert!(Cli::try_parse_from(["oaicrawl"]).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["oaicrawl", "-e", "forever", "http://example.org/oai"]).is_err());
    }
}
