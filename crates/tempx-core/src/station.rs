//! Station metadata returned by the REST API

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: i64,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub device_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationItem {
    pub location_item_id: i64,
    pub location_id: i64,
    pub device_id: i64,
    pub item: String,
    pub sort: Option<i64>,
    pub station_id: i64,
    pub station_item_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationMeta {
    pub share_with_wf: bool,
    pub share_with_wu: bool,
    pub elevation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub location_id: i64,
    pub station_id: i64,
    pub name: String,
    #[serde(default)]
    pub public_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    #[serde(default)]
    pub station_meta: StationMeta,
    #[serde(default)]
    pub created_epoch: i64,
    #[serde(default)]
    pub last_modified_epoch: i64,
    #[serde(default)]
    pub is_local_mode: bool,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub station_items: Vec<StationItem>,
}

impl Station {
    /// Whether the given device belongs to this station
    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices
            .iter()
            .any(|device| device.device_id.to_string() == device_id)
    }
}
