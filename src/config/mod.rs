//! Simulator, device and gateway configuration
//!
//! This module contains the identifiers and records shared by the rest of
//! the crate:
//! - Device identity, keys and session state
//! - Gateway records as persisted by the simulator
//! - Runtime settings of the simulator itself

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Device configuration and session state
pub mod device;

/// Gateway records
pub mod gateway;

pub use device::{AesKey, DevAddr, DeviceConfig, Eui64, SessionState};
pub use gateway::{GatewayId, GatewayInfo};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: i32,
}

impl Location {
    /// Create a location from coordinates
    pub fn new(latitude: f64, longitude: f64, altitude: i32) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_to(&self, other: &Location) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Error loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`SimulatorConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime settings of the simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Directory holding `gateways.json` and `simulator.json`
    pub data_dir: PathBuf,
    /// Number of live events buffered per subscriber
    pub event_capacity: usize,
    /// Local address gateway sockets bind to
    pub bind_address: IpAddr,
    /// Default `tracing` filter directive
    pub log_filter: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("lwnsim-data"),
            event_capacity: 256,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            log_filter: "info".to_string(),
        }
    }
}

impl SimulatorConfig {
    /// Parse settings from TOML; missing keys take their default value
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SimulatorConfig::from_toml_str("data_dir = \"/tmp/sim\"\n").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sim"));
        assert_eq!(config.event_capacity, SimulatorConfig::default().event_capacity);
        assert!(SimulatorConfig::from_toml_str("event_capacity = \"many\"").is_err());
    }

    #[test]
    fn distance_between_nearby_points() {
        let a = Location::new(45.0, 9.0, 0);
        let b = Location::new(45.0, 9.01, 0);
        let d = a.distance_to(&b);
        assert!((780.0..800.0).contains(&d), "distance was {d}");
        assert_eq!(a.distance_to(&a), 0.0);
    }
}
