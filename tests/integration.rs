//! Integration tests for ocpp-rpc.
//!
//! A charge point client and a central system server talk through the
//! public API, first over an in-memory pair, then over real WebSockets.

mod common;

use std::time::Duration;

use common::*;
use ocpp_rpc::transport::mem;
use ocpp_rpc::{
    Client, ConnectionInfo, ErrorCode, OcppError, Profile, ProtocolVersion, Server,
};

const WAIT: Duration = Duration::from_secs(5);

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn reset_profile(name: &str) -> Profile {
    Profile::new(name).handle(|_: ResetRequest, _ctx| async move { Ok(ResetConfirmation::accepted()) })
}

// ==================== In-memory pair ====================

#[tokio::test]
async fn test_boot_notification_roundtrip() {
    let server = central_system();
    let client = charge_point();
    let (recorder, mut lifecycle) = Recorder::new();
    let (cp_link, cs_link) = mem::pair();

    let id = server
        .accept(
            cs_link,
            ProtocolVersion::Ocpp16,
            ConnectionInfo::from_path("/ocpp/CP001"),
            recorder.clone(),
        )
        .unwrap();
    assert_eq!(
        lifecycle.recv().await,
        Some(Lifecycle::New(id, Some("CP001".to_string())))
    );

    client
        .connect_link(cp_link, ProtocolVersion::Ocpp16, ())
        .unwrap();

    let boot = client
        .send(BootNotificationRequest::new("VendorX", "ModelY"))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(boot.status, "Accepted");
    assert_eq!(boot.interval, 300);
}

#[tokio::test]
async fn test_server_initiated_reset() {
    let server = central_system();
    let client = charge_point();
    let (recorder, _lifecycle) = Recorder::new();
    let (cp_link, cs_link) = mem::pair();

    let id = server
        .accept(cs_link, ProtocolVersion::Ocpp16, ConnectionInfo::default(), recorder)
        .unwrap();
    client
        .connect_link(cp_link, ProtocolVersion::Ocpp16, ())
        .unwrap();

    let reset = server.send(id, ResetRequest::hard()).unwrap().await.unwrap();
    assert_eq!(reset, ResetConfirmation::accepted());
}

#[tokio::test]
async fn test_unhandled_action_answers_not_supported() {
    let server = central_system();
    let client = charge_point();
    let (recorder, _lifecycle) = Recorder::new();
    let (cp_link, cs_link) = mem::pair();

    server
        .accept(cs_link, ProtocolVersion::Ocpp16, ConnectionInfo::default(), recorder)
        .unwrap();
    client
        .connect_link(cp_link, ProtocolVersion::Ocpp16, ())
        .unwrap();

    let err = client
        .send(HeartbeatRequest::default())
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.call_error_code(), Some(&ErrorCode::NotSupported));
}

#[tokio::test]
async fn test_invalid_request_is_not_sent() {
    let client = charge_point();
    let (link, mut remote) = mem::channel();
    client.connect_link(link, ProtocolVersion::Ocpp16, ()).unwrap();
    remote.connect();

    let err = client
        .send(BootNotificationRequest::new("A vendor name far too long", "M"))
        .err()
        .unwrap();
    assert!(matches!(err, OcppError::OccurenceConstraint(_)));
    assert!(remote.try_next_sent().is_none());
}

#[tokio::test]
async fn test_transaction_call_waits_for_connection() {
    let client = charge_point();
    let (link, mut remote) = mem::channel();
    client.connect_link(link, ProtocolVersion::Ocpp16, ()).unwrap();

    let pending = client.send(StartTransactionRequest::new("TAG1")).unwrap();
    let unique_id = pending.unique_id().to_string();
    assert_eq!(client.session().queued_count(), 1);

    // Non-transaction calls fail fast while offline.
    let err = client
        .send(HeartbeatRequest::default())
        .unwrap()
        .await
        .unwrap_err();
    assert!(err.is_not_connected());

    remote.connect();
    let frame = remote.next_sent().await.unwrap();
    let sent: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(sent[0], 2);
    assert_eq!(sent[1], unique_id.as_str());
    assert_eq!(sent[2], "StartTransaction");
    assert_eq!(sent[3]["idTag"], "TAG1");

    remote.deliver(format!(r#"[3,"{}",{{"transactionId":7}}]"#, unique_id));
    assert_eq!(pending.await.unwrap().transaction_id, 7);
    assert_eq!(client.session().queued_count(), 0);
}

#[tokio::test]
async fn test_offline_transactions_reach_server_across_reconnects() {
    let server = central_system();
    let client = charge_point();
    let (recorder, mut lifecycle) = Recorder::new();

    let before_connect = client.send(StartTransactionRequest::new("TAG1")).unwrap();

    let (cp_link, cs_link) = mem::pair();
    let first = server
        .accept(cs_link, ProtocolVersion::Ocpp16, ConnectionInfo::default(), recorder.clone())
        .unwrap();
    client.connect_link(cp_link, ProtocolVersion::Ocpp16, ()).unwrap();
    assert_eq!(before_connect.await.unwrap().transaction_id, 7);

    server.close_session(first);
    assert!(matches!(lifecycle.recv().await, Some(Lifecycle::New(..))));
    assert_eq!(lifecycle.recv().await, Some(Lifecycle::Lost(first)));
    eventually(|| !client.session().is_open()).await;

    let between = client.send(StartTransactionRequest::new("TAG2")).unwrap();
    assert_eq!(client.session().queued_count(), 1);

    let (cp_link, cs_link) = mem::pair();
    server
        .accept(cs_link, ProtocolVersion::Ocpp16, ConnectionInfo::default(), recorder)
        .unwrap();
    client.connect_link(cp_link, ProtocolVersion::Ocpp16, ()).unwrap();
    assert_eq!(between.await.unwrap().transaction_id, 7);
    assert_eq!(client.session().queued_count(), 0);
}

#[tokio::test]
async fn test_closing_server_session_reports_lost() {
    let server = central_system();
    let client = charge_point();
    let (recorder, mut lifecycle) = Recorder::new();
    let (cp_link, cs_link) = mem::pair();

    let id = server
        .accept(cs_link, ProtocolVersion::Ocpp16, ConnectionInfo::default(), recorder)
        .unwrap();
    client
        .connect_link(cp_link, ProtocolVersion::Ocpp16, ())
        .unwrap();
    assert!(matches!(lifecycle.recv().await, Some(Lifecycle::New(..))));

    server.close_session(id);
    assert_eq!(lifecycle.recv().await, Some(Lifecycle::Lost(id)));
    assert!(!server.is_session_open(id));
    assert!(matches!(
        server.send(id, ResetRequest::hard()),
        Err(OcppError::NotConnected)
    ));

    eventually(|| !client.is_connected()).await;
}

#[tokio::test]
async fn test_send_to_unknown_session() {
    let server = central_system();
    assert!(matches!(
        server.send(ocpp_rpc::Uuid::new_v4(), ResetRequest::hard()),
        Err(OcppError::NotConnected)
    ));
}

#[test]
fn test_duplicate_reset_fails_build() {
    let err = Client::builder()
        .install(ProtocolVersion::Ocpp16, reset_profile("core"))
        .install(ProtocolVersion::Ocpp16, reset_profile("firmware"))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, OcppError::DuplicateAction(_)));

    let err = Server::builder()
        .install(
            ProtocolVersion::Ocpp16,
            Profile::new("a").send::<ResetRequest>(),
        )
        .install(
            ProtocolVersion::Ocpp16,
            Profile::new("b").send::<ResetRequest>(),
        )
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, OcppError::DuplicateAction(_)));
}

// ==================== WebSocket ====================

#[tokio::test]
async fn test_websocket_session_lifecycle() {
    let server = central_system();
    let (recorder, mut lifecycle) = Recorder::new();
    let addr = server
        .open("127.0.0.1", 0, Shared(recorder.clone()))
        .await
        .unwrap();

    let client = charge_point();
    let version = client
        .connect(&format!("ws://{}/ocpp/CP042", addr), ())
        .await
        .unwrap();
    assert_eq!(version, ProtocolVersion::Ocpp16);

    let id = match lifecycle.recv().await {
        Some(Lifecycle::New(id, identity)) => {
            assert_eq!(identity.as_deref(), Some("CP042"));
            id
        }
        other => panic!("expected a new session, got {:?}", other),
    };

    let boot = client
        .send(BootNotificationRequest::new("VendorX", "ModelY"))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(boot.interval, 300);

    let reset = server.send(id, ResetRequest::hard()).unwrap().await.unwrap();
    assert_eq!(reset.status, "Accepted");

    client.disconnect();
    assert_eq!(
        tokio::time::timeout(WAIT, lifecycle.recv()).await.unwrap(),
        Some(Lifecycle::Lost(id))
    );
    assert!(matches!(
        server.send(id, ResetRequest::hard()),
        Err(OcppError::NotConnected)
    ));

    server.close();
}

#[tokio::test]
async fn test_websocket_authentication_refused() {
    let server = central_system();
    let (recorder, mut lifecycle) = Recorder::new();
    recorder.denied.lock().push("CP666".to_string());
    let addr = server
        .open("127.0.0.1", 0, Shared(recorder.clone()))
        .await
        .unwrap();

    let client = charge_point();
    let err = client
        .connect(&format!("ws://{}/ocpp/CP666", addr), ())
        .await
        .unwrap_err();
    assert!(matches!(err, OcppError::Rejected(_)));
    assert!(!client.is_connected());

    // Other identities still get in.
    client
        .connect(&format!("ws://{}/ocpp/CP001", addr), ())
        .await
        .unwrap();
    assert!(matches!(lifecycle.recv().await, Some(Lifecycle::New(_, Some(identity))) if identity == "CP001"));

    server.close();
}

#[tokio::test]
async fn test_websocket_no_common_version() {
    let server = Server::builder()
        .install(ProtocolVersion::Ocpp201, reset_profile("core"))
        .build()
        .unwrap();
    let (recorder, _lifecycle) = Recorder::new();
    let addr = server.open("127.0.0.1", 0, Shared(recorder)).await.unwrap();

    let client = charge_point();
    let err = client
        .connect(&format!("ws://{}/ocpp/CP001", addr), ())
        .await
        .unwrap_err();
    assert!(matches!(err, OcppError::NoCommonProtocol(_)));
    assert!(server.session_ids().is_empty());

    server.close();
}

#[tokio::test]
async fn test_websocket_server_priority_wins() {
    let server = Server::builder()
        .install(ProtocolVersion::Ocpp201, Profile::new("core").send::<ResetRequest>())
        .install(ProtocolVersion::Ocpp16, Profile::new("core").send::<ResetRequest>())
        .build()
        .unwrap();
    let (recorder, _lifecycle) = Recorder::new();
    let addr = server.open("127.0.0.1", 0, Shared(recorder)).await.unwrap();

    let client = Client::builder()
        .install(ProtocolVersion::Ocpp16, reset_profile("core"))
        .install(ProtocolVersion::Ocpp201, reset_profile("core"))
        .build()
        .unwrap();
    assert_eq!(
        client.supported_versions(),
        &[ProtocolVersion::Ocpp16, ProtocolVersion::Ocpp201]
    );

    let version = client
        .connect(&format!("ws://{}/ocpp/CP001", addr), ())
        .await
        .unwrap();
    assert_eq!(version, ProtocolVersion::Ocpp201);
    assert_eq!(client.version(), Some(ProtocolVersion::Ocpp201));

    server.close();
}
