//! The per-tick payload sent to the collector.
//! Keep this module minimal and stable: it defines the wire format.

use serde::Serialize;

use crate::probe::IpFamily;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online4: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online6: Option<bool>,
    pub uptime: u64,
    pub load: f64,
    // KiB
    pub memory_total: u64,
    pub memory_used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    // MiB
    pub hdd_total: u64,
    pub hdd_used: u64,
    pub cpu: f64,
    // bytes/sec averaged over the throughput window
    pub network_rx: i64,
    pub network_tx: i64,
    // cumulative bytes
    pub network_in: u64,
    pub network_out: u64,
}

impl Snapshot {
    pub fn set_online(&mut self, family: IpFamily, up: bool) {
        match family {
            IpFamily::V4 => self.online4 = Some(up),
            IpFamily::V6 => self.online6 = Some(up),
        }
    }

    /// `update <json>\n`, written to the collector as a single line.
    pub fn to_update_line(&self) -> serde_json::Result<String> {
        Ok(format!("update {}\n", serde_json::to_string(self)?))
    }
}
