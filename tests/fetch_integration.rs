//! Integration tests for the registry client and paginator.
//!
//! These tests drive the real HTTP client against mock servers; backoff
//! delays are recorded instead of slept.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ctgov_ingest::fetch::{
    Delay, FetchError, PageSource, PaginationLimits, Paginator, RegistryClient, StopReason,
    StudyQuery,
};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn studies_page(ids: std::ops::Range<usize>, next: Option<&str>, total: Option<usize>) -> Value {
    let studies: Vec<Value> = ids
        .map(|i| {
            json!({
                "protocolSection": {
                    "identificationModule": { "nctId": format!("NCT{i:08}") }
                }
            })
        })
        .collect();
    let mut body = json!({ "studies": studies });
    if let Some(token) = next {
        body["nextPageToken"] = json!(token);
    }
    if let Some(total) = total {
        body["totalCount"] = json!(total);
    }
    body
}

fn client(server: &MockServer, page_size: u32, timeout: Duration) -> (RegistryClient, Arc<RecordingDelay>) {
    let delay = Arc::new(RecordingDelay::default());
    let base = Url::parse(&format!("{}/api/v2/studies", server.uri())).unwrap();
    let client = RegistryClient::new(base, StudyQuery::new(page_size, "2015-01-01", "MAX"), timeout)
        .unwrap()
        .with_delay(delay.clone());
    (client, delay)
}

#[tokio::test]
async fn test_fetch_page_sends_search_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/studies"))
        .and(query_param("pageSize", "100"))
        .and(query_param("countTotal", "true"))
        .and(query_param("sort", "LastUpdatePostDate:desc"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(0..2, None, Some(2))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, delay) = client(&server, 100, Duration::from_secs(5));
    let page = client.fetch_page(None).await.unwrap();

    assert_eq!(page.studies.len(), 2);
    assert_eq!(page.total_count, Some(2));
    assert_eq!(page.studies[0].nct_id(), Some("NCT00000000"));
    assert!(page.next_page_token.is_none());
    assert!(delay.waits().is_empty());
}

#[tokio::test]
async fn test_fetch_page_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(0..1, None, None)))
        .mount(&server)
        .await;

    let (client, delay) = client(&server, 100, Duration::from_secs(5));
    let page = client.fetch_page(None).await.unwrap();

    assert_eq!(page.studies.len(), 1);
    assert_eq!(delay.waits(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_fetch_page_exhausts_after_three_attempts() {
    let server = MockServer::start().await;
    let long_body = "x".repeat(2000);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string(long_body))
        .expect(3)
        .mount(&server)
        .await;

    let (client, delay) = client(&server, 100, Duration::from_secs(5));
    let err = client.fetch_page(None).await.unwrap_err();

    match err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            match *last {
                FetchError::HttpStatus {
                    status,
                    body_preview,
                    ..
                } => {
                    assert_eq!(status, 500);
                    assert_eq!(body_preview.chars().count(), 500);
                }
                other => panic!("expected HttpStatus, got {other:?}"),
            }
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    // No wait after the final attempt.
    assert_eq!(delay.waits(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_fetch_page_timeout_is_per_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(studies_page(0..1, None, None))
                .set_delay(Duration::from_millis(1500)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let (client, _delay) = client(&server, 100, Duration::from_millis(300));
    let err = client.fetch_page(None).await.unwrap_err();

    match err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, FetchError::Timeout { .. }), "got {last:?}");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_page_retries_malformed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(0..3, None, None)))
        .mount(&server)
        .await;

    let (client, delay) = client(&server, 100, Duration::from_secs(5));
    let page = client.fetch_page(None).await.unwrap();
    assert_eq!(page.studies.len(), 3);
    assert_eq!(delay.waits(), vec![Duration::from_secs(1)]);
}

async fn mount_three_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(0..100, Some("p2"), Some(250))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(100..200, Some("p3"), Some(250))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("pageToken", "p3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(200..250, None, Some(250))))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_paginator_follows_tokens_to_end_of_data() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let (client, _delay) = client(&server, 100, Duration::from_secs(5));
    let outcome = Paginator::new(PaginationLimits::unlimited())
        .fetch_all(&client)
        .await;

    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.records.len(), 250);
    assert_eq!(outcome.stop_reason, StopReason::EndOfData);
    assert_eq!(outcome.records[249].nct_id(), Some("NCT00000249"));
}

#[tokio::test]
async fn test_paginator_max_pages_ignores_remaining_token() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let (client, _delay) = client(&server, 100, Duration::from_secs(5));
    let outcome = Paginator::new(PaginationLimits {
        max_pages: 1,
        max_records: 0,
    })
    .fetch_all(&client)
    .await;

    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.records.len(), 100);
    assert_eq!(outcome.stop_reason, StopReason::MaxPages);
}

#[tokio::test]
async fn test_paginator_keeps_partial_results_when_later_page_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(studies_page(0..100, Some("p2"), None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let (client, _delay) = client(&server, 100, Duration::from_secs(5));
    let outcome = Paginator::new(PaginationLimits::unlimited())
        .fetch_all(&client)
        .await;

    assert_eq!(outcome.records.len(), 100);
    assert_eq!(outcome.stop_reason, StopReason::FetchFailed);
}

#[tokio::test]
async fn test_fetch_page_is_repeatable() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let (client, _delay) = client(&server, 100, Duration::from_secs(5));
    let first = client.fetch_page(None).await.unwrap();
    let first_again = client.fetch_page(None).await.unwrap();
    let second = client.fetch_page(Some("p2")).await.unwrap();
    let second_again = client.fetch_page(Some("p2")).await.unwrap();

    assert_eq!(first, first_again);
    assert_eq!(second, second_again);
    assert_ne!(first, second);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].url, requests[1].url);
    assert_eq!(requests[2].url, requests[3].url);
    assert_ne!(requests[0].url, requests[2].url);
}
