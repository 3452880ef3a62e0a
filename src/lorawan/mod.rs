//! LoRaWAN protocol layer
//!
//! This module contains what a simulated device needs to speak LoRaWAN:
//! - Regional parameters (frequency plans, data rates, ADR)
//! - MAC command encoding and decoding
//! - Data-frame sealing and opening
//! - Receive-window and beacon timing

/// MAC command handling
pub mod commands;

/// Data-frame codec
pub mod frame;

/// Regional parameters and channel tables
pub mod region;

/// Receive-window and Class B timing
pub mod timing;

pub use commands::{CommandError, MacCommand};
pub use frame::{DataFrame, FCtrl, FrameError, FrameHeader, MType};
pub use region::{Region, RegionCode, RegionError, RegionalParameters};
