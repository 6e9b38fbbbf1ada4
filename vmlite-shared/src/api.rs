//! Wire types of the VMM control API (HTTP/1.1 over a Unix socket).

use serde::{Deserialize, Serialize};

pub const API_PREFIX: &str = "/api/v1";

pub mod endpoints {
    pub const VMM_PING: &str = "/api/v1/vmm.ping";
    pub const VMM_SHUTDOWN: &str = "/api/v1/vmm.shutdown";
    pub const VM_INFO: &str = "/api/v1/vm.info";
    pub const VM_PAUSE: &str = "/api/v1/vm.pause";
    pub const VM_RESUME: &str = "/api/v1/vm.resume";
    pub const VM_REBOOT: &str = "/api/v1/vm.reboot";
    pub const VM_SHUTDOWN: &str = "/api/v1/vm.shutdown";
}

/// Response body of `GET /api/v1/vmm.ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub build_version: String,
    pub version: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Guest state as reported by the VMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmmState {
    Created,
    Running,
    Shutdown,
    Paused,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpusInfo {
    pub boot_vcpus: u8,
    pub max_vcpus: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Bytes.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoConfig {
    pub cpus: CpusInfo,
    pub memory: MemoryInfo,
}

/// Response body of `GET /api/v1/vm.info`.
///
/// Only the fields vmlite reads are modelled; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub state: VmmState,
    pub config: InfoConfig,
    #[serde(default)]
    pub memory_actual_size: Option<u64>,
}
