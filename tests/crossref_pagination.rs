//! End-to-end pagination against a mock Crossref server

use futures::{StreamExt, TryStreamExt};
use rustcrossref::{
    paginate, ClientConfig, CrossrefClient, CrossrefError, PaginateOptions, RateLimiter,
    RateLimiterConfig, Record,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn works_page(total: u64, dois: &[&str], next_cursor: Option<&str>, start_index: Option<u64>) -> serde_json::Value {
    let items: Vec<_> = dois.iter().map(|doi| json!({ "DOI": doi })).collect();
    let mut message = json!({ "total-results": total, "items": items });
    if let Some(cursor) = next_cursor {
        message["next-cursor"] = json!(cursor);
    }
    if let Some(start) = start_index {
        message["query"] = json!({ "start-index": start });
    }
    json!({ "status": "ok", "message-type": "work-list", "message": message })
}

fn client_for(server: &MockServer) -> Arc<CrossrefClient> {
    let config = ClientConfig::default()
        .base_url(server.uri())
        .rate_limit(RateLimiterConfig::per_second(1000));
    Arc::new(CrossrefClient::new(config).unwrap())
}

fn fast_options() -> PaginateOptions {
    PaginateOptions::default()
        .batch_size(2)
        .backoff_unit(Duration::from_millis(5))
}

fn dois(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["DOI"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_offset_pagination_over_http() {
    let server = MockServer::start().await;

    for (offset, page) in [
        ("0", works_page(3, &["10.1/a", "10.1/b"], None, Some(0))),
        ("2", works_page(3, &["10.1/c"], None, Some(2))),
        ("3", works_page(3, &[], None, Some(3))),
    ] {
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("offset", offset))
            .and(query_param("rows", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .expect(1)
            .mount(&server)
            .await;
    }

    let records: Vec<Record> = paginate(client_for(&server), fast_options())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(dois(&records), vec!["10.1/a", "10.1/b", "10.1/c"]);
}

#[tokio::test]
async fn test_cursor_pagination_over_http() {
    let server = MockServer::start().await;

    for (cursor, page) in [
        ("*", works_page(4, &["10.1/a", "10.1/b"], Some("AoJ1"), None)),
        ("AoJ1", works_page(4, &["10.1/c", "10.1/d"], Some("AoJ2"), None)),
        ("AoJ2", works_page(4, &[], Some("AoJ2"), None)),
    ] {
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("cursor", cursor))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .expect(1)
            .mount(&server)
            .await;
    }

    let records: Vec<Record> = paginate(client_for(&server), fast_options().cursor("*"))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(dois(&records), vec!["10.1/a", "10.1/b", "10.1/c", "10.1/d"]);
}

#[tokio::test]
async fn test_server_error_shrinks_page_then_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("rows", "4"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("rows", "3"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(works_page(
            3,
            &["10.1/a", "10.1/b", "10.1/c"],
            None,
            Some(0),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("rows", "4"))
        .and(query_param("offset", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(works_page(3, &[], None, Some(3))))
        .expect(1)
        .mount(&server)
        .await;

    let records: Vec<Record> = paginate(client_for(&server), fast_options().batch_size(4))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_max_items_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(works_page(1000, &["10.1/a", "10.1/b"], Some("next"), None)),
        )
        .mount(&server)
        .await;

    let records: Vec<Record> = paginate(client_for(&server), fast_options().cursor("*").max_items(3))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_start_index_mismatch_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(works_page(10, &["10.1/a", "10.1/b"], None, Some(0))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(works_page(10, &["10.1/e", "10.1/f"], None, Some(4))))
        .mount(&server)
        .await;

    let results: Vec<_> = paginate(client_for(&server), fast_options()).collect().await;

    assert_eq!(results.len(), 3);
    assert!(matches!(
        results[2],
        Err(CrossrefError::PaginationConsistency { expected: 2, actual: 4 })
    ));
}

#[tokio::test]
async fn test_clients_share_one_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(works_page(0, &[], None, None)))
        .mount(&server)
        .await;

    // One call per second
    let limiter = RateLimiter::new(&RateLimiterConfig::new(2, Duration::from_secs(2))).unwrap();
    let config = ClientConfig::default().base_url(server.uri());
    let first = Arc::new(CrossrefClient::with_rate_limiter(config.clone(), limiter.clone()).unwrap());
    let second = Arc::new(CrossrefClient::with_rate_limiter(config, limiter.clone()).unwrap());

    let start = std::time::Instant::now();
    let a: Vec<Record> = paginate(first, fast_options()).try_collect().await.unwrap();
    let b: Vec<Record> = paginate(second, fast_options()).try_collect().await.unwrap();
    assert!(a.is_empty() && b.is_empty());

    // The second client waited for the first client's call to free the budget
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert!(!limiter.try_acquire());
}
