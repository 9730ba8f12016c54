// tests/fetch_http.rs
//
// HttpFetcher against a local axum server standing in for listing sites.
//
// Covered:
// - 200 -> body returned
// - 503 twice then 200 -> success after retries
// - 404 -> no retry, typed failure
// - retries exhausted -> failure carrying the last status
// - invalid URL -> failure without a request
// - fetch_all keeps one result per URL, in order

use axum::{extract::State, http::StatusCode, routing::get, Router};
use scholarship_watcher::fetch::{fetch_all, HttpFetcher, PageFetcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Hits {
    flaky: Arc<AtomicUsize>,
    missing: Arc<AtomicUsize>,
    down: Arc<AtomicUsize>,
}

async fn listing() -> &'static str {
    "<html><body><article><h2>Oslo Data Science Scholarship</h2><a href=\"/s/1\">More</a></article></body></html>"
}

async fn flaky(State(hits): State<Hits>) -> (StatusCode, &'static str) {
    let n = hits.flaky.fetch_add(1, Ordering::SeqCst);
    if n < 2 {
        (StatusCode::SERVICE_UNAVAILABLE, "busy")
    } else {
        (StatusCode::OK, "<html>finally</html>")
    }
}

async fn missing(State(hits): State<Hits>) -> StatusCode {
    hits.missing.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn down(State(hits): State<Hits>) -> StatusCode {
    hits.down.fetch_add(1, Ordering::SeqCst);
    StatusCode::BAD_GATEWAY
}

/// Bind an ephemeral port and serve `app` in the background.
async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

async fn server() -> (String, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/listing", get(listing))
        .route("/flaky", get(flaky))
        .route("/missing", get(missing))
        .route("/down", get(down))
        .with_state(hits.clone());
    (spawn(app).await, hits)
}

fn fast_fetcher() -> HttpFetcher {
    HttpFetcher::new()
        .expect("client")
        .with_timeout(Duration::from_secs(5))
        .with_retries(3)
        .with_backoff(Duration::from_millis(5))
}

#[tokio::test]
async fn ok_page_returns_body() {
    let (base, _) = server().await;
    let r = fast_fetcher().fetch(&format!("{base}/listing")).await;
    assert!(r.success, "expected success, got {r:?}");
    assert_eq!(r.status_code, Some(200));
    assert!(r.html_content.as_deref().unwrap_or_default().contains("Oslo Data Science"));
    assert!(r.error_message.is_none());
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let (base, hits) = server().await;
    let r = fast_fetcher().fetch(&format!("{base}/flaky")).await;
    assert!(r.success, "third attempt should succeed: {r:?}");
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 3, "two 503s then a 200");
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let (base, hits) = server().await;
    let r = fast_fetcher().fetch(&format!("{base}/missing")).await;
    assert!(!r.success);
    assert_eq!(r.status_code, Some(404));
    assert!(r.html_content.is_none());
    assert!(
        r.error_message.as_deref().unwrap_or_default().contains("404"),
        "message should name the status: {:?}",
        r.error_message
    );
    assert_eq!(hits.missing.load(Ordering::SeqCst), 1, "4xx other than 429 is final");
}

#[tokio::test]
async fn exhausted_retries_report_last_status() {
    let (base, hits) = server().await;
    let r = fast_fetcher().with_retries(2).fetch(&format!("{base}/down")).await;
    assert!(!r.success);
    assert_eq!(r.status_code, Some(502));
    assert_eq!(hits.down.load(Ordering::SeqCst), 3, "first attempt + 2 retries");
}

#[tokio::test]
async fn invalid_url_fails_without_request() {
    let r = fast_fetcher().fetch("not a url").await;
    assert!(!r.success);
    assert!(r.status_code.is_none());
    assert!(r.error_message.as_deref().unwrap_or_default().contains("invalid URL"));
}

#[tokio::test]
async fn fetch_all_keeps_one_result_per_url_in_order() {
    let (base, _) = server().await;
    let urls = vec![
        format!("{base}/listing"),
        format!("{base}/missing"),
        "ftp://example.org/listing".to_string(),
    ];
    let fetcher = fast_fetcher();
    let results = fetch_all(&fetcher, &urls, Duration::ZERO).await;
    assert_eq!(results.len(), 3);
    let got: Vec<(&str, bool)> = results.iter().map(|r| (r.source_url.as_str(), r.success)).collect();
    assert_eq!(
        got,
        vec![(urls[0].as_str(), true), (urls[1].as_str(), false), (urls[2].as_str(), false)]
    );
}
