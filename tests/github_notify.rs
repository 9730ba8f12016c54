// tests/github_notify.rs
//
// GitHub issue channel against a local axum server mimicking the REST API.
//
// Covered:
// - 201 -> issue number/url returned, payload carries title/body/labels and auth header
// - 401 / 404 / 422 -> typed errors
// - 403 with an exhausted rate limit -> wait, then retry succeeds
// - Notifier impl: grouped batch produces a per-country issue body

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use scholarship_watcher::entry::ScholarshipEntry;
use scholarship_watcher::notify::github::{GitHubError, GitHubNotifier};
use scholarship_watcher::notify::{NotificationBatch, Notifier, NotifyOutcome};
use scholarship_watcher::relevance::CountryBuckets;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Api {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    limited_calls: Arc<AtomicUsize>,
}

fn created(number: u64) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({
            "number": number,
            "html_url": format!("https://github.com/octo/watch/issues/{number}"),
        })),
    )
        .into_response()
}

async fn create_issue(
    State(api): State<Api>,
    Path((_owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    api.requests.lock().expect("lock").push((auth, body));

    match repo.as_str() {
        "watch" => created(42),
        "unauthorized" => (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"}))).into_response(),
        "gone" => (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response(),
        "invalid" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Validation Failed",
                "errors": [{"resource": "Issue", "field": "title", "code": "missing_field", "message": "title is too long"}]
            })),
        )
            .into_response(),
        "limited" => {
            if api.limited_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                (
                    StatusCode::FORBIDDEN,
                    [
                        ("x-ratelimit-remaining", "0".to_string()),
                        ("x-ratelimit-reset", Utc::now().timestamp().to_string()),
                    ],
                    Json(json!({"message": "API rate limit exceeded"})),
                )
                    .into_response()
            } else {
                created(7)
            }
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn user() -> Json<Value> {
    Json(json!({"login": "octo"}))
}

async fn spawn(api: Api) -> String {
    let app = Router::new()
        .route("/user", get(user))
        .route("/repos/{owner}/{repo}/issues", post(create_issue))
        .with_state(api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn notifier(base: &str, repo: &str) -> GitHubNotifier {
    GitHubNotifier::new("test-token", repo)
        .expect("notifier")
        .with_api_base(base)
        .with_rate_limit_wait(Duration::from_millis(20))
}

#[tokio::test]
async fn created_issue_is_returned_and_payload_is_complete() {
    let api = Api::default();
    let base = spawn(api.clone()).await;
    let gh = notifier(&base, "octo/watch");

    assert!(gh.check_connection().await, "GET /user is 200");
    let issue = gh.create_issue("title here", "body here").await.expect("created");
    assert_eq!(issue.number, 42);
    assert_eq!(issue.html_url, "https://github.com/octo/watch/issues/42");

    let requests = api.requests.lock().expect("lock");
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-token"));
    assert_eq!(body["title"], "title here");
    assert_eq!(body["body"], "body here");
    assert_eq!(body["labels"], json!(["scholarship", "automated"]));
}

#[tokio::test]
async fn error_statuses_map_to_typed_errors() {
    let base = spawn(Api::default()).await;

    let err = notifier(&base, "octo/unauthorized").create_issue("t", "b").await.unwrap_err();
    assert_eq!(err, GitHubError::Unauthorized);

    let err = notifier(&base, "octo/gone").create_issue("t", "b").await.unwrap_err();
    assert_eq!(err, GitHubError::NotFound("octo/gone".into()));

    let err = notifier(&base, "octo/invalid").create_issue("t", "b").await.unwrap_err();
    match err {
        GitHubError::Validation(msg) => {
            assert!(msg.contains("Validation Failed"), "{msg}");
            assert!(msg.contains("title is too long"), "field details included: {msg}");
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    let err = notifier(&base, "octo/exploding").create_issue("t", "b").await.unwrap_err();
    assert_eq!(err, GitHubError::Http(500));
}

#[tokio::test]
async fn rate_limit_is_waited_out_then_retried() {
    let api = Api::default();
    let base = spawn(api.clone()).await;
    let issue = notifier(&base, "octo/limited")
        .create_issue("t", "b")
        .await
        .expect("second attempt succeeds");
    assert_eq!(issue.number, 7);
    assert_eq!(api.limited_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn notifier_posts_grouped_issue() {
    let api = Api::default();
    let base = spawn(api.clone()).await;
    let gh = notifier(&base, "octo/watch");

    let mut buckets = CountryBuckets::new();
    buckets.push(
        "NO",
        "Norway",
        ScholarshipEntry::new("Oslo AI Scholarship", "https://uio.example.no/ai").annotated("NO", "Norway"),
    );
    buckets.push(
        "SE",
        "Sweden",
        ScholarshipEntry::new("KTH Cloud Grant", "https://kth.example.se/cloud").annotated("SE", "Sweden"),
    );
    let outcome = gh
        .notify(&NotificationBatch::ByCountry(buckets))
        .await
        .expect("notify ok");
    assert_eq!(
        outcome,
        NotifyOutcome::Sent {
            reference: Some("https://github.com/octo/watch/issues/42".into())
        }
    );

    let requests = api.requests.lock().expect("lock");
    let body = &requests[0].1;
    let title = body["title"].as_str().unwrap_or_default();
    let text = body["body"].as_str().unwrap_or_default();
    assert!(title.contains("2 New Scholarships Found in 2 Countries"), "title: {title}");
    assert!(text.contains("Norway"), "body lists Norway: {text}");
    assert!(text.contains("Sweden"), "body lists Sweden: {text}");
    assert!(text.contains("https://kth.example.se/cloud"));
}

#[tokio::test]
async fn failed_delivery_surfaces_as_error() {
    let base = spawn(Api::default()).await;
    let gh = notifier(&base, "octo/unauthorized");
    let batch = NotificationBatch::Flat(vec![ScholarshipEntry::new("A", "https://x.example.org/a")]);
    let err = gh.notify(&batch).await.expect_err("401 must fail the channel");
    assert!(format!("{err:#}").contains("authentication failed"), "{err:#}");
}
