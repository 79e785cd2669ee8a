//! OCPP 1.6 payloads and endpoint fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ocpp_rpc::model::{max_length, Confirmation, Request, Validate, ValidationError};
use ocpp_rpc::{Client, ConnectionInfo, Profile, ProtocolVersion, Server, ServerEvents, Uuid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
}

impl BootNotificationRequest {
    pub fn new(vendor: &str, model: &str) -> Self {
        Self {
            charge_point_vendor: vendor.to_string(),
            charge_point_model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationConfirmation {
    pub current_time: String,
    pub interval: u32,
    pub status: String,
}

impl Validate for BootNotificationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        max_length("chargePointVendor", &self.charge_point_vendor, 20)?;
        max_length("chargePointModel", &self.charge_point_model, 20)
    }
}
impl Validate for BootNotificationConfirmation {}
impl Confirmation for BootNotificationConfirmation {}

impl Request for BootNotificationRequest {
    const ACTION: &'static str = "BootNotification";
    type Confirmation = BootNotificationConfirmation;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: String,
}

impl StartTransactionRequest {
    pub fn new(id_tag: &str) -> Self {
        Self {
            connector_id: 1,
            id_tag: id_tag.to_string(),
            meter_start: 0,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionConfirmation {
    pub transaction_id: i32,
}

impl Validate for StartTransactionRequest {}
impl Validate for StartTransactionConfirmation {}
impl Confirmation for StartTransactionConfirmation {}

impl Request for StartTransactionRequest {
    const ACTION: &'static str = "StartTransaction";
    type Confirmation = StartTransactionConfirmation;

    fn transaction_related(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResetRequest {
    pub fn hard() -> Self {
        Self {
            kind: "Hard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetConfirmation {
    pub status: String,
}

impl ResetConfirmation {
    pub fn accepted() -> Self {
        Self {
            status: "Accepted".to_string(),
        }
    }
}

impl Validate for ResetRequest {}
impl Validate for ResetConfirmation {}
impl Confirmation for ResetConfirmation {}

impl Request for ResetRequest {
    const ACTION: &'static str = "Reset";
    type Confirmation = ResetConfirmation;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfirmation {
    pub current_time: String,
}

impl Validate for HeartbeatRequest {}
impl Validate for HeartbeatConfirmation {}
impl Confirmation for HeartbeatConfirmation {}

impl Request for HeartbeatRequest {
    const ACTION: &'static str = "Heartbeat";
    type Confirmation = HeartbeatConfirmation;
}

/// Charge point: sends boot, heartbeat and transactions; answers Reset.
pub fn charge_point() -> Client {
    Client::builder()
        .install(
            ProtocolVersion::Ocpp16,
            Profile::new("core")
                .send::<BootNotificationRequest>()
                .send::<HeartbeatRequest>()
                .send::<StartTransactionRequest>()
                .handle(|_: ResetRequest, _ctx| async move { Ok(ResetConfirmation::accepted()) }),
        )
        .build()
        .unwrap()
}

/// Central system: answers boot and transactions, sends Reset. Does not
/// handle Heartbeat.
pub fn central_system() -> Server {
    Server::builder()
        .install(
            ProtocolVersion::Ocpp16,
            Profile::new("core")
                .handle(|req: BootNotificationRequest, _ctx| async move {
                    assert_eq!(req.charge_point_vendor, "VendorX");
                    Ok(BootNotificationConfirmation {
                        current_time: "2024-01-01T00:00:00Z".to_string(),
                        interval: 300,
                        status: "Accepted".to_string(),
                    })
                })
                .handle(|_: StartTransactionRequest, _ctx| async move {
                    Ok(StartTransactionConfirmation { transaction_id: 7 })
                })
                .send::<ResetRequest>(),
        )
        .build()
        .unwrap()
}

/// Session lifecycle as seen by the server application.
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    New(Uuid, Option<String>),
    Lost(Uuid),
}

pub struct Recorder {
    pub denied: Mutex<Vec<String>>,
    tx: mpsc::UnboundedSender<Lifecycle>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Lifecycle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                denied: Mutex::new(Vec::new()),
                tx,
            }),
            rx,
        )
    }
}

impl ServerEvents for Recorder {
    fn authenticate(&self, info: &ConnectionInfo) -> bool {
        self.denied
            .lock()
            .iter()
            .all(|identity| info.identity.as_deref() != Some(identity.as_str()))
    }

    fn new_session(&self, session_id: Uuid, info: &ConnectionInfo) {
        let _ = self.tx.send(Lifecycle::New(session_id, info.identity.clone()));
    }

    fn lost_session(&self, session_id: Uuid) {
        let _ = self.tx.send(Lifecycle::Lost(session_id));
    }
}

/// Forwards to a shared [`Recorder`] so `Server::open` can take it by value.
pub struct Shared(pub Arc<Recorder>);

impl ServerEvents for Shared {
    fn authenticate(&self, info: &ConnectionInfo) -> bool {
        self.0.authenticate(info)
    }

    fn new_session(&self, session_id: Uuid, info: &ConnectionInfo) {
        self.0.new_session(session_id, info)
    }

    fn lost_session(&self, session_id: Uuid) {
        self.0.lost_session(session_id)
    }
}
