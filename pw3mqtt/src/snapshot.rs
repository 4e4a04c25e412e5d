use std::sync::Arc;

use chrono::{DateTime, Local};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregated vitals, keyed by synthesized component identifiers such as
/// `PVAC--<vin>`, `PVS--<vin>`, `TEPINV--<vin>` and `TEPOD--<vin>`.
pub type Vitals = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayPart {
    pub part_number: String,
    pub serial_number: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub text: String,
    pub githash: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WirelessDevice {
    pub company: String,
    pub model: String,
    pub fcc_id: String,
    pub ic: String,
}

/// Decoded firmware response of the gateway.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub gateway: GatewayPart,
    pub din: String,
    pub version: VersionInfo,
    /// Unnamed fields 5 and 6 of the firmware record.
    pub five: GatewayPart,
    pub six: i32,
    pub wireless: Vec<WirelessDevice>,
}

/// Everything a publisher needs to render one refresh.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub firmware: Arc<FirmwareInfo>,
    pub config: Arc<Value>,
    pub status: Arc<Value>,
    pub vitals: Option<Arc<Vitals>>,
    pub fetched_at: DateTime<Local>,
}
