//! End-to-end tests for WebSocket queue sessions.

mod helpers;

use futures::SinkExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;

use helpers::{connect, expect_type, send, wait_for_occupant};

#[tokio::test]
async fn test_session_without_participant_is_rejected() {
    let app = helpers::TestApp::new();
    let addr = app.spawn().await;

    let err = connect_async(format!("ws://{addr}/queue/lot-1"))
        .await
        .expect_err("Handshake should be refused");

    match err {
        WsError::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("Unexpected handshake error: {other}"),
    }
    assert!(app.engine.registry.is_empty());
}

#[tokio::test]
async fn test_leave_promotes_next_waiter() {
    let app = helpers::TestApp::new();
    let addr = app.spawn().await;

    let mut a = connect(addr, "lot-1", "A").await;
    let init = expect_type(&mut a, "init").await;
    assert_eq!(init["success"], true);
    assert_eq!(init["position"], 0);

    let mut b = connect(addr, "lot-1", "B").await;
    let init = expect_type(&mut b, "init").await;
    assert_eq!(init["success"], false);
    assert_eq!(init["position"], 1);

    send(&mut a, r#"{"type":"leave"}"#).await;
    expect_type(&mut a, "left").await;

    let entered = expect_type(&mut b, "enter_allowed").await;
    assert_eq!(entered["resource_id"], "lot-1");
    wait_for_occupant(&app.engine, "lot-1", Some("B")).await;
}

#[tokio::test]
async fn test_disconnect_counts_as_leave() {
    let app = helpers::TestApp::new();
    let addr = app.spawn().await;

    let mut a = connect(addr, "lot-2", "A").await;
    expect_type(&mut a, "init").await;
    let mut b = connect(addr, "lot-2", "B").await;
    expect_type(&mut b, "init").await;
    let mut c = connect(addr, "lot-2", "C").await;
    expect_type(&mut c, "init").await;

    a.close(None).await.expect("Close failed");

    expect_type(&mut b, "enter_allowed").await;
    let update = expect_type(&mut c, "queue_update").await;
    assert_eq!(update["position"], 1);
}

#[tokio::test]
async fn test_heartbeat_and_queue_list() {
    let app = helpers::TestApp::new();
    let addr = app.spawn().await;

    let mut a = connect(addr, "lot-3", "A").await;
    expect_type(&mut a, "init").await;
    let mut b = connect(addr, "lot-3", "B").await;
    expect_type(&mut b, "init").await;

    send(&mut b, r#"{"type":"heartbeat"}"#).await;
    let ack = expect_type(&mut b, "heartbeat").await;
    assert_eq!(ack["status"], "ok");

    // Garbage is dropped without ending the session.
    send(&mut b, "not json").await;
    send(&mut b, r#"{"type":"get_queue_list"}"#).await;
    let listing = expect_type(&mut b, "queue_list").await;
    assert_eq!(listing["data"]["total_count"], 2);
    assert_eq!(listing["data"]["viewers"][0]["participant_id"], "A");
    assert_eq!(listing["data"]["viewers"][0]["status"], "viewing");
    assert_eq!(listing["data"]["viewers"][1]["position"], 1);
    assert_eq!(listing["data"]["viewers"][1]["status"], "waiting");
}

#[tokio::test]
async fn test_rejoin_replaces_old_session() {
    let app = helpers::TestApp::new();
    let addr = app.spawn().await;

    let mut a = connect(addr, "lot-4", "A").await;
    expect_type(&mut a, "init").await;
    let mut b1 = connect(addr, "lot-4", "B").await;
    expect_type(&mut b1, "init").await;

    let mut b2 = connect(addr, "lot-4", "B").await;
    let init = expect_type(&mut b2, "init").await;
    assert_eq!(init["position"], 1);

    // The superseded session is closed by the server and does not count as leave.
    drop(b1);
    send(&mut a, r#"{"type":"leave"}"#).await;
    expect_type(&mut b2, "enter_allowed").await;
}
