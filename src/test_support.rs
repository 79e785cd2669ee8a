//! Small OCPP 1.6 payloads shared by the unit tests.

use serde::{Deserialize, Serialize};

use crate::model::{is_among, max_length, Confirmation, Request, Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationConfirmation {
    pub status: String,
    pub interval: u32,
}

impl BootNotificationRequest {
    pub fn new(vendor: &str, model: &str) -> Self {
        Self {
            charge_point_vendor: vendor.to_string(),
            charge_point_model: model.to_string(),
        }
    }
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
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionConfirmation {
    pub transaction_id: i32,
}

impl StartTransactionRequest {
    pub fn new(id_tag: &str) -> Self {
        Self {
            connector_id: 1,
            id_tag: id_tag.to_string(),
            meter_start: 0,
        }
    }
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetConfirmation {
    pub status: String,
}

impl Validate for ResetRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        let allowed = [Some("Hard".to_string()), Some("Soft".to_string())];
        if is_among(Some(&self.kind), &allowed) {
            Ok(())
        } else {
            Err(ValidationError::new("type", "must be Hard or Soft"))
        }
    }
}

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
