// tests/metrics.rs
//
// Prometheus recorder wired to a real run: counters show up in the
// exposition and the textfile is written atomically.

use async_trait::async_trait;
use scholarship_watcher::config::WatcherConfig;
use scholarship_watcher::country::CountryProfile;
use scholarship_watcher::fetch::{FetchResult, PageFetcher};
use scholarship_watcher::metrics::{Metrics, ENTRIES_NEW, LAST_RUN_TS, PAGES_FAILED, PAGES_FETCHED};
use scholarship_watcher::notify::NotifierMux;
use scholarship_watcher::pipeline::Pipeline;
use std::time::Duration;
use tempfile::tempdir;

const OK_PAGE: &str = "https://listings.example.org/norway";

struct OnePage;

#[async_trait]
impl PageFetcher for OnePage {
    async fn fetch(&self, url: &str) -> FetchResult {
        if url == OK_PAGE {
            FetchResult::ok(
                url,
                r#"<article><h2>Bergen Cloud Computing Scholarship</h2><a href="/s/bergen-cloud">More</a></article>"#
                    .to_string(),
            )
        } else {
            FetchResult::failed(url, "HTTP 503: Service Unavailable", Some(503))
        }
    }

    fn name(&self) -> &'static str {
        "one-page"
    }
}

#[tokio::test]
async fn run_counters_reach_the_textfile() {
    let metrics = Metrics::install().expect("install recorder");
    let dir = tempdir().expect("tempdir");

    let cfg = WatcherConfig {
        urls: vec![OK_PAGE.to_string(), "https://down.example.org/".to_string()],
        data_path: dir.path().join("last_results.json"),
        multi_country: Some(false),
        request_delay: Duration::ZERO,
        ..WatcherConfig::default()
    };
    let report = Pipeline::new(cfg, vec![CountryProfile::norway()], Box::new(OnePage), NotifierMux::new())
        .run()
        .await;
    assert_eq!(report.new_count(), 1);

    let text = metrics.render();
    for needle in [PAGES_FETCHED, PAGES_FAILED, ENTRIES_NEW, LAST_RUN_TS] {
        assert!(text.contains(needle), "exposition missing '{needle}'\n{text}");
    }
    assert!(
        text.lines().any(|l| l.starts_with(ENTRIES_NEW) && l.trim_end().ends_with(" 1")),
        "one new entry counted\n{text}"
    );

    let out = dir.path().join("metrics/watcher.prom");
    metrics.write_textfile(&out).expect("write textfile");
    let written = std::fs::read_to_string(&out).expect("read textfile");
    assert!(written.contains(PAGES_FETCHED));
}
