//! Error types surfaced by the simulator
//!
//! Every [`SimulatorError`] maps to exactly one [`ResultCode`]; callers
//! should branch on the code, not on the message text.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{Eui64, GatewayId};

/// Outcome of a simulator operation, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// Success
    Ok,
    /// Gateway name already used by another gateway
    ErrorName,
    /// All-zero or malformed gateway address
    ErrorAddress,
    /// Gateway address already used by another gateway
    ErrorAddressInUse,
    /// Gateway is transmitting
    ErrorDeviceActive,
    /// Relayed gateway requires a bridge address first
    NoBridge,
    /// No gateway with that identifier
    NotFound,
    /// Run/stop requested in the wrong state
    ErrorState,
    /// Malformed bridge address
    ErrorBridgeAddress,
    /// Mutation applied in memory but not written to the store
    PersistenceError,
}

impl ResultCode {
    /// Code of an operation result
    pub fn of<T>(result: &Result<T, SimulatorError>) -> Self {
        match result {
            Ok(_) => ResultCode::Ok,
            Err(e) => e.code(),
        }
    }
}

/// Failure reading or writing persisted state
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// Stored JSON could not be read or written
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
    /// Store refused the operation
    #[error("state store unavailable")]
    Unavailable,
}

/// Simulator operation failure
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// Gateway address is all zeros
    #[error("gateway address must not be zero")]
    InvalidAddress,
    /// Gateway is transmitting
    #[error("gateway {0} is active")]
    GatewayActive(GatewayId),
    /// Name already taken
    #[error("gateway name {0:?} already in use")]
    NameInUse(String),
    /// Address already taken
    #[error("gateway address {0} already in use")]
    AddressInUse(Eui64),
    /// No bridge configured for a relayed gateway
    #[error("no bridge address configured")]
    NoBridge,
    /// Unknown identifier
    #[error("gateway {0} not found")]
    GatewayNotFound(GatewayId),
    /// `run` while running
    #[error("simulator already running")]
    AlreadyRunning,
    /// `stop` while stopped
    #[error("simulator already stopped")]
    AlreadyStopped,
    /// Bridge address is not `host:port`
    #[error("invalid bridge address {0:?}")]
    InvalidBridgeAddress(String),
    /// Simulator state could not be persisted
    #[error("state not persisted: {0}")]
    Persistence(#[from] PersistenceError),
    /// Gateway change applied but not persisted
    #[error("gateway {id} not persisted: {source}")]
    NotPersisted {
        /// Gateway that was changed
        id: GatewayId,
        /// Underlying failure
        source: PersistenceError,
    },
}

impl SimulatorError {
    /// Result code reported to callers
    pub fn code(&self) -> ResultCode {
        match self {
            SimulatorError::InvalidAddress => ResultCode::ErrorAddress,
            SimulatorError::GatewayActive(_) => ResultCode::ErrorDeviceActive,
            SimulatorError::NameInUse(_) => ResultCode::ErrorName,
            SimulatorError::AddressInUse(_) => ResultCode::ErrorAddressInUse,
            SimulatorError::NoBridge => ResultCode::NoBridge,
            SimulatorError::GatewayNotFound(_) => ResultCode::NotFound,
            SimulatorError::AlreadyRunning | SimulatorError::AlreadyStopped => ResultCode::ErrorState,
            SimulatorError::InvalidBridgeAddress(_) => ResultCode::ErrorBridgeAddress,
            SimulatorError::Persistence(_) | SimulatorError::NotPersisted { .. } => {
                ResultCode::PersistenceError
            }
        }
    }
}
