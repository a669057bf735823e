//! Exit behaviour of the `oaicrawl` binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::query_param;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_missing_endpoint_fails() {
    Command::cargo_bin("oaicrawl")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("<ENDPOINT>"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("oaicrawl")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_endpoint_fails() {
    Command::cargo_bin("oaicrawl")
        .unwrap()
        .arg("not-a-url")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid endpoint"));
}

#[test]
fn test_zero_workers_rejected() {
    Command::cargo_bin("oaicrawl")
        .unwrap()
        .args(["-w", "0", "http://127.0.0.1:9/oai"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("worker count must be at least 1"));
}

#[test]
fn test_unreachable_endpoint_fails() {
    Command::cargo_bin("oaicrawl")
        .unwrap()
        .args(["-r", "1", "http://127.0.0.1:9/oai"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Pagination failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_harvest_to_output_file() {
    let server = MockServer::start().await;
    Mock::given(query_param("verb", "ListIdentifiers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><ListIdentifiers><header><identifier>x</identifier></header>\
             <resumptionToken/></ListIdentifiers></OAI-PMH>",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("verb", "GetRecord"))
        .and(query_param("identifier", "x"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><GetRecord><record><header><identifier>x</identifier></header></record></GetRecord></OAI-PMH>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("records.xml");
    let endpoint = format!("{}/oai", server.uri());
    let output_arg = output.clone();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("oaicrawl")
            .unwrap()
            .args(["-w", "2", "-o"])
            .arg(&output_arg)
            .arg(&endpoint)
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    })
    .await
    .unwrap();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("<identifier>x</identifier>"));
    assert!(written.starts_with("<OAI-PMH><GetRecord>"));
}
