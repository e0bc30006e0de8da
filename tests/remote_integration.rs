//! Integration tests for the ledger client and the existence filter
//! against a mock HTTP server.

use std::sync::Arc;

use harvester_core::remote::{LedgerEntry, SERVICE_DOWN_MESSAGE, ServiceClient};
use harvester_core::{
    ContentId, DownloadMetadata, ExistenceCheck, ExistenceFilter, Ledger, LedgerClient,
    LedgerError, ResourceDescriptor, ResourceKind,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::RecordingNotifier;
use support::services::service_or_skip;

macro_rules! mock_service {
    ($service:literal) => {{
        let Some(mock_server) = service_or_skip($service).await else {
            return;
        };
        mock_server
    }};
}

fn ids(raw: &[&str]) -> Vec<ContentId> {
    raw.iter().map(|id| ContentId::new(*id)).collect()
}

fn ledger(base_url: &str) -> LedgerClient {
    LedgerClient::new(ServiceClient::new().unwrap(), base_url, "douyin")
}

fn existence(endpoint: String, notifier: Arc<RecordingNotifier>) -> ExistenceFilter {
    ExistenceFilter::new(
        ServiceClient::new().unwrap(),
        endpoint,
        "/data/downloads",
        notifier,
    )
}

fn descriptor(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::Video,
        format!("https://cdn.example.com/{name}.mp4"),
        format!("author/{name}.mp4"),
    )
}

// ==================== Ledger Tests ====================

#[tokio::test]
async fn test_find_missing_ids_posts_note_ids() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/findMissingIds"))
        .and(body_json(json!({ "noteIds": ["1", "2", "3"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["2"])))
        .expect(1)
        .mount(&server)
        .await;

    let missing = ledger(&server.uri())
        .find_missing_ids(&ids(&["1", "2", "3"]))
        .await;

    assert_eq!(missing, Some(ids(&["2"])));
}

#[tokio::test]
async fn test_find_missing_ids_empty_answer_is_not_unknown() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/findMissingIds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let missing = ledger(&server.uri()).find_missing_ids(&ids(&["1"])).await;

    assert_eq!(missing, Some(Vec::new()));
}

#[tokio::test]
async fn test_find_missing_ids_server_error_is_none() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/findMissingIds"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let missing = ledger(&server.uri()).find_missing_ids(&ids(&["1"])).await;

    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_find_missing_ids_malformed_body_is_none() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/findMissingIds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ids": ["1"] })))
        .mount(&server)
        .await;

    let missing = ledger(&server.uri()).find_missing_ids(&ids(&["1"])).await;

    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_includes_posts_raw_array() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/includes"))
        .and(body_json(json!(["7", "8"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["8"])))
        .expect(1)
        .mount(&server)
        .await;

    let included = ledger(&server.uri()).includes(&ids(&["7", "8"])).await;

    assert_eq!(included, Some(ids(&["8"])));
}

#[tokio::test]
async fn test_save_one_posts_entry() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/saveOne"))
        .and(body_json(json!({
            "noteId": "42",
            "name": "author",
            "title": "title",
            "url": "https://www.example.com/video/42",
            "download": true,
            "files": []
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let entry = LedgerEntry {
        note_id: ContentId::new("42"),
        name: "author".to_string(),
        title: "title".to_string(),
        url: "https://www.example.com/video/42".to_string(),
        download: true,
        files: Vec::new(),
    };

    ledger(&server.uri()).save_one(&entry).await.unwrap();
}

#[tokio::test]
async fn test_save_file_non_2xx_is_metadata_error() {
    let server = mock_service!("ledger");
    Mock::given(method("POST"))
        .and(path("/douyin/saveFile"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let metadata = DownloadMetadata {
        source_url: "https://cdn.example.com/1.mp4".to_string(),
        source_platform: "douyin".to_string(),
        ..DownloadMetadata::default()
    };
    let error = ledger(&server.uri())
        .save_file(&metadata)
        .await
        .unwrap_err();

    match error {
        LedgerError::SaveMetadataFailed { source_url, .. } => {
            assert_eq!(source_url, "https://cdn.example.com/1.mp4");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_ledger_base_url_trailing_slash_is_ignored() {
    let client = ledger("http://localhost:3000/");
    assert_eq!(
        client.endpoint("saveOne"),
        "http://localhost:3000/douyin/saveOne"
    );
}

// ==================== Existence Filter Tests ====================

#[tokio::test]
async fn test_existence_returns_absent_subset() {
    let server = mock_service!("existence");
    let absent = descriptor("b");
    Mock::given(method("POST"))
        .and(path("/pathExists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [absent] })))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let filter = existence(format!("{}/pathExists", server.uri()), notifier.clone());
    let result = filter
        .filter_existing(vec![descriptor("a"), descriptor("b")])
        .await;

    assert_eq!(result, vec![absent]);
    assert!(notifier.messages().is_empty());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body[0]["downloadsLocation"], "/data/downloads");
    assert_eq!(body[1]["filename"], "author/b.mp4");
}

#[tokio::test]
async fn test_existence_service_down_returns_empty_and_notifies() {
    let server = mock_service!("existence");
    Mock::given(method("POST"))
        .and(path("/pathExists"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let filter = existence(format!("{}/pathExists", server.uri()), notifier.clone());
    let result = filter.filter_existing(vec![descriptor("a")]).await;

    assert!(result.is_empty());
    assert_eq!(notifier.messages(), vec![SERVICE_DOWN_MESSAGE.to_string()]);
}

#[tokio::test]
async fn test_existence_non_array_result_is_empty() {
    let server = mock_service!("existence");
    Mock::given(method("POST"))
        .and(path("/pathExists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "nope" })))
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let filter = existence(format!("{}/pathExists", server.uri()), notifier.clone());

    assert!(filter.filter_existing(vec![descriptor("a")]).await.is_empty());
}

#[tokio::test]
async fn test_existence_empty_input_sends_no_request() {
    let server = mock_service!("existence");
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let filter = existence(format!("{}/pathExists", server.uri()), notifier);

    assert!(filter.filter_existing(Vec::new()).await.is_empty());
}
