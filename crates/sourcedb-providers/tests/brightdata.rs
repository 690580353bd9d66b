//! Wiremock tests for the Bright Data client: discovery triggers, snapshot
//! polling (202 = still materializing), and the request-id/view two-hop.

use serde_json::json;
use sourcedb_providers::{
    BrightDataClient, DiscoveryFilters, ProviderError, SnapshotState,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BrightDataClient {
    BrightDataClient::with_base_url("bd-key", 5, 3, 0, &server.uri()).unwrap()
}

#[tokio::test]
async fn trigger_builds_one_input_per_keyword() {
    let server = MockServer::start().await;
    let expected_body = json!([
        {"keyword": "rust", "num_of_posts": "20", "start_date": "", "end_date": "", "country": ""},
        {"keyword": "tokio", "num_of_posts": "20", "start_date": "", "end_date": "", "country": ""}
    ]);

    Mock::given(method("POST"))
        .and(path("/datasets/v3/trigger"))
        .and(query_param("dataset_id", "gd_test"))
        .and(query_param("type", "discover_new"))
        .and(query_param("discover_by", "keyword"))
        .and(header("authorization", "Bearer bd-key"))
        .and(body_json(&expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"snapshot_id": "s_new1"})))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot_id = client(&server)
        .trigger_keyword_discovery(
            "gd_test",
            &["rust".to_string(), "tokio".to_string()],
            20,
            &DiscoveryFilters::default(),
        )
        .await
        .unwrap();
    assert_eq!(snapshot_id.as_deref(), Some("s_new1"));
}

#[tokio::test]
async fn snapshot_202_reports_pending() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasets/v3/snapshot/s_abc"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let state = client(&server).fetch_snapshot("s_abc").await.unwrap();
    assert!(matches!(state, SnapshotState::Pending));
}

#[tokio::test]
async fn snapshot_ready_returns_rows_from_either_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasets/v3/snapshot/s_flat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"url": "u1"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/datasets/v3/snapshot/s_wrapped"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"url": "u1"}, {"url": "u2"}]})),
        )
        .mount(&server)
        .await;

    let c = client(&server);
    let SnapshotState::Ready(flat) = c.fetch_snapshot("s_flat").await.unwrap() else {
        panic!("expected ready");
    };
    assert_eq!(flat.len(), 1);
    let SnapshotState::Ready(wrapped) = c.fetch_snapshot("s_wrapped").await.unwrap() else {
        panic!("expected ready");
    };
    assert_eq!(wrapped.len(), 2);
}

#[tokio::test]
async fn snapshot_polling_gives_up_as_pending() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasets/v3/snapshot/s_slow"))
        .respond_with(ResponseTemplate::new(202))
        // poll budget is 3 attempts
        .expect(3)
        .mount(&server)
        .await;

    let state = client(&server).fetch_snapshot_polling("s_slow").await.unwrap();
    assert!(matches!(state, SnapshotState::Pending));
}

#[tokio::test]
async fn resolve_request_reads_status_and_view() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasets/request_collection"))
        .and(query_param("request_id", "j_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "done", "view_id": "v77", "dataset_id": "gd_test"
        })))
        .mount(&server)
        .await;

    let resolved = client(&server).resolve_request("j_123").await.unwrap();
    assert!(resolved.is_done());
    assert_eq!(resolved.view_id, "v77");
}

#[tokio::test]
async fn view_items_falls_back_to_unversioned_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasets/v3/view/v77/items"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/datasets/view/v77/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"url": "u1"}])))
        .mount(&server)
        .await;

    let items = client(&server).fetch_view_items("v77").await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn list_snapshots_normalizes_and_sorts_newest_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/datasets/v3/snapshots"))
        .and(query_param("dataset_id", "gd_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"snapshot_id": "s_old", "created_at": "2024-01-01", "state": "ready"},
            {"id": "s_new", "created": "2024-06-01", "status": "ready"},
            {"created": "2024-07-01"}
        ])))
        .mount(&server)
        .await;

    let snapshots = client(&server).list_snapshots("gd_test").await.unwrap();
    assert_eq!(snapshots.len(), 2, "entries without an id are dropped");
    assert_eq!(snapshots[0].id, "s_new");
    assert_eq!(snapshots[1].id, "s_old");
}

#[tokio::test]
async fn trigger_failure_surfaces_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/datasets/v3/trigger"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad dataset"))
        .mount(&server)
        .await;

    let result = client(&server)
        .trigger_keyword_discovery(
            "gd_bad",
            &["rust".to_string()],
            20,
            &DiscoveryFilters::default(),
        )
        .await;
    assert!(matches!(
        result,
        Err(ProviderError::Api { status: 400, ref message }) if message.contains("bad dataset")
    ));
}
