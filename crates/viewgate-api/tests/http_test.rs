//! Integration tests for the status and health endpoints.

mod helpers;

use http::StatusCode;

use viewgate_core::types::{ParticipantId, ResourceId};

#[tokio::test]
async fn test_health_check() {
    let app = helpers::TestApp::new();

    let response = app.get("/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_detailed_health_check() {
    let app = helpers::TestApp::new();

    let response = app.get("/api/health/detailed").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["queues"], 0);
    assert_eq!(response.body["sessions"], 0);
    assert!(response.body["metrics"]["joins"].is_number());
}

#[tokio::test]
async fn test_status_of_unknown_resource_is_vacant() {
    let app = helpers::TestApp::new();

    let response = app.get("/api/queues/lot-404/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["is_occupied"], false);
    assert_eq!(response.body["queue_length"], 0);
    assert!(response.body["current_occupant_id"].is_null());
}

#[tokio::test]
async fn test_status_reports_occupant_and_waiters() {
    let app = helpers::TestApp::new();
    let resource = ResourceId::parse("lot-5", 128).unwrap();
    for id in ["A", "B", "C"] {
        app.engine
            .open_session(resource.clone(), ParticipantId::parse(id, 128).unwrap())
            .await
            .unwrap();
    }
    app.engine
        .registry
        .leave(
            &resource,
            &ParticipantId::parse("B", 128).unwrap(),
            viewgate_realtime::queue::RemovalReason::Left,
        )
        .await
        .unwrap();

    let response = app.get("/api/queues/lot-5/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["is_occupied"], true);
    assert_eq!(response.body["queue_length"], 1);
    assert_eq!(response.body["current_occupant_id"], "A");
    assert_eq!(response.body["waiting_participants"][0], "C");

    let listing = app.get("/api/queues").await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body[0]["resource_id"], "lot-5");
    assert_eq!(listing.body[0]["queue_length"], 1);
}

#[tokio::test]
async fn test_status_rejects_oversized_resource_id() {
    let app = helpers::TestApp::new();
    let long = "x".repeat(200);

    let response = app.get(&format!("/api/queues/{long}/status")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "CONNECTION_REJECTED");
}
