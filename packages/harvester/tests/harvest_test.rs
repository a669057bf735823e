//! End-to-end harvests against a mock OAI-PMH repository.
//!
//! The harvester uses blocking HTTP, so each run happens on `spawn_blocking`
//! while wiremock serves requests on the async runtime.

use std::time::Duration;

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oai_harvester::{Endpoint, HarvestConfig, HarvestSummary, Harvester, HarvesterError};

fn page(ids: &[&str], token: &str) -> String {
    let headers: String = ids
        .iter()
        .map(|id| format!("<header><identifier>{id}</identifier><datestamp>2017-09-11</datestamp></header>"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2017-09-11T07:23:49Z</responseDate>
<request verb="ListIdentifiers">http://example.org/oai</request>
<ListIdentifiers>{headers}<resumptionToken completeListSize="4" cursor="0">{token}</resumptionToken></ListIdentifiers>
</OAI-PMH>"#
    )
}

fn record(id: &str) -> String {
    format!(
        "<OAI-PMH><GetRecord><record><header><identifier>{id}</identifier></header><metadata><dc/></metadata></record></GetRecord></OAI-PMH>\n"
    )
}

const MISSING: &str =
    r#"<OAI-PMH><error code="idDoesNotExist">No matching identifier in repository</error></OAI-PMH>"#;

fn config() -> HarvestConfig {
    HarvestConfig::default()
        .with_workers(3)
        .with_max_retries(2)
        .with_max_elapsed(Duration::from_millis(300))
        .with_retry_base_delay(Duration::from_millis(10))
        .with_backoff_initial(Duration::from_millis(20))
}

/// Page 1: [a, b, c] with token T1; page 2: [d] with an empty token.
async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListIdentifiers"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a", "b", "c"], "T1")))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListIdentifiers"))
        .and(query_param("resumptionToken", "T1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["d"], "")))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_record(server: &MockServer, id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "GetRecord"))
        .and(query_param("identifier", id))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn run_harvest(
    server: &MockServer,
    config: HarvestConfig,
) -> (Result<HarvestSummary, HarvesterError>, String) {
    let endpoint = format!("{}/oai", server.uri());
    tokio::task::spawn_blocking(move || {
        let endpoint = Endpoint::parse(&endpoint).unwrap();
        let harvester = Harvester::new(endpoint, config).unwrap();
        let mut sink = Vec::new();
        let result = harvester.run(&mut sink);
        (result, String::from_utf8(sink).unwrap())
    })
    .await
    .unwrap()
}

fn sorted_lines(output: &str) -> Vec<String> {
    let mut lines: Vec<String> = output.lines().map(str::to_string).collect();
    lines.sort();
    lines
}

#[tokio::test(flavor = "multi_thread")]
async fn test_harvest_two_pages_writes_every_record() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    for id in ["a", "b", "c", "d"] {
        mount_record(&server, id, ResponseTemplate::new(200).set_body_string(record(id))).await;
    }

    let (result, output) = run_harvest(&server, config()).await;
    let summary = result.unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.identifiers, 4);
    assert_eq!(summary.written, 4);

    let expected: Vec<String> = ["a", "b", "c", "d"]
        .iter()
        .map(|id| record(id).trim_end().to_string())
        .collect();
    assert_eq!(sorted_lines(&output), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_identifier_is_skipped() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    for id in ["a", "c", "d"] {
        mount_record(&server, id, ResponseTemplate::new(200).set_body_string(record(id))).await;
    }
    Mock::given(method("GET"))
        .and(query_param("verb", "GetRecord"))
        .and(query_param("identifier", "b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MISSING))
        .expect(1)
        .mount(&server)
        .await;

    let (result, output) = run_harvest(&server, config()).await;
    let summary = result.unwrap();

    assert_eq!(summary.written, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(output.lines().count(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_best_effort_completes_with_failures() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    mount_record(&server, "a", ResponseTemplate::new(200).set_body_string(record("a"))).await;
    mount_record(&server, "b", ResponseTemplate::new(500)).await;
    mount_record(
        &server,
        "c",
        ResponseTemplate::new(200)
            .set_body_string(r#"<OAI-PMH><error code="badArgument">broken</error></OAI-PMH>"#),
    )
    .await;
    mount_record(&server, "d", ResponseTemplate::new(200).set_body_string(record("d"))).await;

    let (result, output) = run_harvest(&server, config().with_best_effort(true)).await;
    let summary = result.unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(output.lines().count(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_persistent_failure_aborts_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListIdentifiers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["a", "b"], "")))
        .mount(&server)
        .await;
    mount_record(&server, "a", ResponseTemplate::new(200).set_body_string(record("a"))).await;
    mount_record(&server, "b", ResponseTemplate::new(503)).await;

    let (result, output) = run_harvest(&server, config().with_workers(1)).await;

    match result.unwrap_err() {
        HarvesterError::RecordFailed {
            identifier, source, ..
        } => {
            assert_eq!(identifier, "b");
            assert!(source.to_string().contains("HTTP status 503"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(output.lines().count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListIdentifiers"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let (result, output) = run_harvest(&server, config().with_best_effort(true)).await;
    let err = result.unwrap_err();

    assert!(matches!(err, HarvesterError::Pagination { pages: 0, .. }));
    assert!(err.to_string().contains("verb=ListIdentifiers"));
    assert!(output.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_record_hits_timeout_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListIdentifiers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&["slow"], "")))
        .mount(&server)
        .await;
    mount_record(
        &server,
        "slow",
        ResponseTemplate::new(200)
            .set_body_string(record("slow"))
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let config = config()
        .with_best_effort(true)
        .with_max_retries(1)
        .with_http_timeout(Duration::from_millis(100));
    let started = std::time::Instant::now();
    let (result, output) = run_harvest(&server, config).await;
    let summary = result.unwrap();

    assert_eq!(summary.failed, 1);
    assert!(output.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}
