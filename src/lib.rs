//! LoRaWAN network emulator in Rust
//!
//! This crate emulates a LoRaWAN radio network so that a real network
//! server can be exercised without radio hardware. Simulated gateways speak
//! the Semtech UDP packet-forwarder protocol to the network server, either
//! directly or through a shared bridge; simulated ABP end-devices build real
//! LoRaWAN frames and honour the MAC commands sent back to them.
//!
//! # Features
//! - Regional parameters for EU868, EU433, CN779, RU864, KR920, AS923,
//!   EU868-FSK and a narrowband 256 MHz plan, including LinkADRReq
//! - In-memory forwarder binding devices to the gateways in their range
//! - Gateway tasks with cooperative shutdown
//! - Persisted gateway registry and simulator state
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use lorawan_sim::{
//!     config::{DeviceConfig, GatewayInfo, SimulatorConfig},
//!     device::Device,
//!     lorawan::RegionCode,
//!     simulator::{MemoryStore, Simulator},
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let sim = Simulator::new(SimulatorConfig::default(), Arc::new(MemoryStore::new()))?;
//!
//! let mut gateway = GatewayInfo::new("0102030405060708".parse()?, "gw-1");
//! gateway.type_gateway = true;
//! gateway.address = "127.0.0.1".into();
//! gateway.port = 1700;
//! gateway.active = true;
//! sim.add_gateway(gateway).await?;
//! sim.run().await?;
//!
//! let config = DeviceConfig::new_abp(
//!     "1112131415161718".parse()?,
//!     "26011BDA".parse()?,
//!     "2B7E151628AED2A6ABF7158809CF4F3C".parse()?,
//!     "2B7E151628AED2A6ABF7158809CF4F3C".parse()?,
//!     RegionCode::Eu868,
//! );
//! let mut device = Device::new(config, sim.forwarder())?;
//! device.send_uplink(1, b"Hello, LoRaWAN!", false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Device, gateway and simulator configuration
pub mod config;

/// Cryptographic functions
pub mod crypto;

/// Simulated end-device
pub mod device;

/// Result codes and simulator errors
pub mod error;

/// In-memory message routing
pub mod forwarder;

/// Simulated gateways
pub mod gateway;

/// Tracing subscriber setup
pub mod logging;

/// LoRaWAN protocol implementation
pub mod lorawan;

/// Simulation orchestrator
pub mod simulator;

pub use device::{Device, DeviceError};
pub use error::{PersistenceError, ResultCode, SimulatorError};
pub use forwarder::Forwarder;
pub use simulator::{BridgeAddress, SimEvent, Simulator};
