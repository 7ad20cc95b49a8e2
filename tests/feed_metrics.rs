mod support;

use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use postlist::application::{feed::AppendOutcome, source::SourceError};
use uuid::Uuid;

use support::{CatalogueSource, catalogue, feed_service};

#[tokio::test]
async fn feed_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let source = Arc::new(CatalogueSource::new(catalogue(24)));
    let feed = feed_service(source.clone());

    let page = feed.page_context().await.expect("first page");
    let session = page
        .close_path
        .as_deref()
        .and_then(support::session_id)
        .and_then(|id| Uuid::parse_str(&id).ok())
        .expect("registered session");

    source.fail_next(SourceError::Transport("reset by peer".to_string()));
    let failed = feed.append_payload(session).await.expect("outcome");
    assert!(matches!(failed, AppendOutcome::Loader(_)));

    let retried = feed.append_payload(session).await.expect("outcome");
    assert!(matches!(retried, AppendOutcome::Appended(_)));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "postlist_feed_fetch_total",
        "postlist_feed_fetch_failed_total",
        "postlist_feed_fetch_ms",
        "postlist_feed_sessions_active",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
