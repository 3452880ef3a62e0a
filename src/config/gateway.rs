use serde::{Deserialize, Serialize};

use super::{device::Eui64, Location};

/// Gateway identifier, assigned by the simulator
pub type GatewayId = u32;

/// Default interval between PULL_DATA keep-alives, in seconds
pub const DEFAULT_KEEP_ALIVE: u64 = 30;

fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE
}

/// Persisted description of a simulated gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    /// Identifier, ignored on add and assigned by the simulator
    #[serde(default)]
    pub id: GatewayId,
    /// Gateway EUI, must be non-zero
    pub mac_address: Eui64,
    /// Display name, unique among gateways
    pub name: String,
    /// Whether the gateway should take part in the simulation
    pub active: bool,
    /// Native UDP gateway reached at `address:port` (true), or relayed
    /// through the shared bridge (false)
    pub type_gateway: bool,
    /// Host of a native gateway's packet forwarder endpoint
    #[serde(default)]
    pub address: String,
    /// Port of a native gateway's packet forwarder endpoint
    #[serde(default)]
    pub port: u16,
    /// Seconds between keep-alives
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    /// Position of the gateway
    #[serde(default)]
    pub location: Location,
}

impl GatewayInfo {
    /// A relayed gateway with default settings
    pub fn new(mac_address: Eui64, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            mac_address,
            name: name.into(),
            active: false,
            type_gateway: false,
            address: String::new(),
            port: 0,
            keep_alive: DEFAULT_KEEP_ALIVE,
            location: Location::default(),
        }
    }

    /// Whether the gateway talks UDP to its own endpoint instead of the bridge
    pub fn is_native(&self) -> bool {
        self.type_gateway
    }

    /// Endpoint of a native gateway
    pub fn native_endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
