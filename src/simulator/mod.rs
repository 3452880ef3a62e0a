//! Simulation orchestrator
//!
//! The [`Simulator`] owns the gateway registry, the set of gateways desired
//! on, the bridge address and the run state. All of it sits behind one
//! `tokio::sync::Mutex`, so registry-mutating operations are serialized even
//! when called concurrently. The forwarder has its own lock and is shared
//! with gateway tasks and devices.
//!
//! After every registry mutation both snapshots are written to the
//! [`StateStore`]. A failed write does not roll the mutation back: the error
//! is returned and the next successful write persists the full state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::config::{GatewayId, GatewayInfo, SimulatorConfig};
use crate::error::{PersistenceError, SimulatorError};
use crate::forwarder::Forwarder;
use crate::gateway::{Gateway, GatewayLink};

/// Live notifications
pub mod events;

/// Persistence backends
pub mod store;

pub use events::SimEvent;
pub use store::{
    GatewaySnapshot, JsonFileStore, MemoryStore, SimulatorSnapshot, SimulatorState, StateStore,
    StoredState,
};

/// Endpoint of the bridge relaying non-native gateways
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BridgeAddress {
    /// Host name or IP address
    pub address: String,
    /// UDP port
    pub port: u16,
}

impl BridgeAddress {
    /// Create a bridge address
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Whether no bridge is configured
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    fn validate(&self) -> Result<(), SimulatorError> {
        let host = &self.address;
        let invalid = host.is_empty()
            || self.port == 0
            || host.contains(':')
            || host.chars().any(char::is_whitespace);
        if invalid {
            Err(SimulatorError::InvalidBridgeAddress(self.to_string()))
        } else {
            Ok(())
        }
    }
}

/// `host:port`, or the empty string when unset
impl fmt::Display for BridgeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            Ok(())
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl FromStr for BridgeAddress {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || SimulatorError::InvalidBridgeAddress(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse().map_err(|_| invalid())?;
        let bridge = Self::new(host, port);
        bridge.validate()?;
        Ok(bridge)
    }
}

/// A gateway record together with its run state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStatus {
    /// Persisted record
    #[serde(flatten)]
    pub info: GatewayInfo,
    /// Whether the gateway task is alive
    pub running: bool,
}

struct SimulatorInner {
    state: SimulatorState,
    gateways: BTreeMap<GatewayId, Gateway>,
    active_gateways: BTreeSet<GatewayId>,
    next_id: GatewayId,
    bridge_address: String,
}

impl SimulatorInner {
    fn from_stored(stored: StoredState) -> Self {
        let next_from_registry = stored
            .gateways
            .keys()
            .next_back()
            .map_or(0, |id| id.saturating_add(1));
        let active_gateways = stored
            .gateways
            .values()
            .filter(|g| g.active)
            .map(|g| g.id)
            .collect();
        let (bridge_address, next_id) = match stored.simulator {
            Some(s) => (s.bridge_address, s.next_id.max(next_from_registry)),
            None => (String::new(), next_from_registry),
        };
        Self {
            state: SimulatorState::Stopped,
            gateways: stored
                .gateways
                .into_iter()
                .map(|(id, mut info)| {
                    info.id = id;
                    (id, Gateway::new(info))
                })
                .collect(),
            active_gateways,
            next_id,
            bridge_address,
        }
    }

    fn gateway_snapshot(&self) -> GatewaySnapshot {
        self.gateways
            .iter()
            .map(|(id, g)| (*id, g.info.clone()))
            .collect()
    }

    fn simulator_snapshot(&self) -> SimulatorSnapshot {
        SimulatorSnapshot {
            state: self.state,
            bridge_address: self.bridge_address.clone(),
            active_gateways: self.active_gateways.clone(),
            next_id: self.next_id,
        }
    }

    fn gateway_mut(&mut self, id: GatewayId) -> Result<&mut Gateway, SimulatorError> {
        self.gateways
            .get_mut(&id)
            .ok_or(SimulatorError::GatewayNotFound(id))
    }
}

/// Orchestrator of a simulation
pub struct Simulator {
    inner: Mutex<SimulatorInner>,
    forwarder: Arc<Forwarder>,
    events: broadcast::Sender<SimEvent>,
    store: Arc<dyn StateStore>,
    config: SimulatorConfig,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Create a simulator, loading any state `store` holds
    ///
    /// The simulator always starts stopped, whatever state was persisted.
    pub fn new(config: SimulatorConfig, store: Arc<dyn StateStore>) -> Result<Self, SimulatorError> {
        let stored = store.load()?;
        info!(
            gateways = stored.gateways.len(),
            "simulator state loaded"
        );
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            inner: Mutex::new(SimulatorInner::from_stored(stored)),
            forwarder: Arc::new(Forwarder::new()),
            events,
            store,
            config,
        })
    }

    /// Create a simulator persisting to JSON files in `config.data_dir`
    pub fn with_file_store(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
        Self::new(config, store)
    }

    /// Router shared with gateways and devices
    pub fn forwarder(&self) -> Arc<Forwarder> {
        Arc::clone(&self.forwarder)
    }

    /// Receive live events
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    fn console(&self, message: &str) {
        let _ = self.events.send(SimEvent::console(message));
    }

    fn link(&self, inner: &SimulatorInner) -> GatewayLink {
        GatewayLink {
            forwarder: Arc::clone(&self.forwarder),
            bridge_address: inner.bridge_address.clone(),
            bind_address: self.config.bind_address,
            events: self.events.clone(),
        }
    }

    fn persist(&self, inner: &SimulatorInner) -> Result<(), PersistenceError> {
        self.store.save_gateways(&inner.gateway_snapshot())?;
        self.store.save_simulator(&inner.simulator_snapshot())
    }

    fn persist_gateway(&self, inner: &SimulatorInner, id: GatewayId) -> Result<(), SimulatorError> {
        self.persist(inner).map_err(|source| {
            warn!(id, error = %source, "gateway change not persisted");
            SimulatorError::NotPersisted { id, source }
        })
    }

    /// Start the simulation
    ///
    /// Clears the forwarder and starts every gateway in the active set.
    /// Devices must be registered after this call.
    pub async fn run(&self) -> Result<(), SimulatorError> {
        let mut inner = self.inner.lock().await;
        if inner.state == SimulatorState::Running {
            return Err(SimulatorError::AlreadyRunning);
        }
        self.forwarder.reset();
        inner.state = SimulatorState::Running;

        let link = self.link(&inner);
        let active: Vec<GatewayId> = inner.active_gateways.iter().copied().collect();
        for id in active {
            if let Some(gateway) = inner.gateways.get_mut(&id) {
                gateway.turn_on(link.clone());
            }
        }
        info!(gateways = inner.active_gateways.len(), "simulation started");
        self.console("START");
        Ok(())
    }

    /// Stop the simulation
    ///
    /// Returns once every gateway task has exited.
    pub async fn stop(&self) -> Result<(), SimulatorError> {
        let mut inner = self.inner.lock().await;
        if inner.state == SimulatorState::Stopped {
            return Err(SimulatorError::AlreadyStopped);
        }
        inner.state = SimulatorState::Stopped;

        let handles: Vec<_> = inner
            .gateways
            .values_mut()
            .filter_map(Gateway::request_stop)
            .collect();
        let count = handles.len();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "gateway task ended abnormally");
            }
        }

        let persisted = self.persist(&inner);
        self.forwarder.reset();
        info!(gateways = count, "simulation stopped");
        self.console("STOPPED");
        Ok(persisted?)
    }

    /// Whether the simulation is running
    pub async fn status(&self) -> bool {
        self.inner.lock().await.state == SimulatorState::Running
    }

    /// Switch one gateway on or off
    ///
    /// While running this starts or stops the gateway task. While stopped it
    /// only flips the `active` flag that decides whether the next `run`
    /// starts it. Returns the new `active` flag.
    pub async fn toggle_state_gateway(&self, id: GatewayId) -> Result<bool, SimulatorError> {
        let mut inner = self.inner.lock().await;
        let running = inner.state == SimulatorState::Running;
        let link = self.link(&inner);
        let gateway = inner.gateway_mut(id)?;

        let active = if running {
            if gateway.is_on() {
                gateway.turn_off().await;
                false
            } else {
                if !gateway.info.is_native() && link.bridge_address.is_empty() {
                    return Err(SimulatorError::NoBridge);
                }
                gateway.turn_on(link);
                true
            }
        } else {
            !gateway.info.active
        };
        gateway.info.active = active;

        if active {
            inner.active_gateways.insert(id);
        } else {
            inner.active_gateways.remove(&id);
        }
        info!(id, active, "gateway toggled");
        self.persist_gateway(&inner, id)?;
        Ok(active)
    }

    /// Add a gateway; its identifier is assigned here
    pub async fn add_gateway(&self, info: GatewayInfo) -> Result<GatewayId, SimulatorError> {
        let mut inner = self.inner.lock().await;
        self.set_gateway(&mut inner, info, false)
    }

    /// Replace the record of an existing gateway
    pub async fn update_gateway(&self, info: GatewayInfo) -> Result<(), SimulatorError> {
        let mut inner = self.inner.lock().await;
        self.set_gateway(&mut inner, info, true).map(|_| ())
    }

    fn set_gateway(
        &self,
        inner: &mut SimulatorInner,
        mut info: GatewayInfo,
        is_update: bool,
    ) -> Result<GatewayId, SimulatorError> {
        if info.mac_address.is_zero() {
            return Err(SimulatorError::InvalidAddress);
        }
        let existing = inner.gateways.get(&info.id).filter(|_| is_update);
        if existing.is_some_and(Gateway::is_on) {
            return Err(SimulatorError::GatewayActive(info.id));
        }
        let target = info.id;
        let gateways = &inner.gateways;
        let others = || {
            gateways
                .values()
                .filter(move |g| !is_update || g.info.id != target)
        };
        if others().any(|g| g.info.name == info.name) {
            return Err(SimulatorError::NameInUse(info.name));
        }
        if others().any(|g| g.info.mac_address == info.mac_address) {
            return Err(SimulatorError::AddressInUse(info.mac_address));
        }
        if !info.is_native() && inner.bridge_address.is_empty() {
            return Err(SimulatorError::NoBridge);
        }
        if is_update && existing.is_none() {
            return Err(SimulatorError::GatewayNotFound(info.id));
        }

        let id = if is_update {
            info.id
        } else {
            let id = inner.next_id;
            inner.next_id += 1;
            info.id = id;
            id
        };
        let active = info.active;
        match inner.gateways.get_mut(&id) {
            Some(gateway) => gateway.info = info,
            None => {
                inner.gateways.insert(id, Gateway::new(info));
            }
        }

        if active {
            inner.active_gateways.insert(id);
            if inner.state == SimulatorState::Running {
                let link = self.link(inner);
                if let Some(gateway) = inner.gateways.get_mut(&id) {
                    gateway.turn_on(link);
                }
            }
        } else {
            inner.active_gateways.remove(&id);
        }
        info!(id, is_update, active, "gateway saved");

        self.persist_gateway(inner, id)?;
        Ok(id)
    }

    /// Remove a gateway that is not transmitting
    pub async fn delete_gateway(&self, id: GatewayId) -> Result<(), SimulatorError> {
        let mut inner = self.inner.lock().await;
        let gateway = inner
            .gateways
            .get(&id)
            .ok_or(SimulatorError::GatewayNotFound(id))?;
        if gateway.is_on() {
            return Err(SimulatorError::GatewayActive(id));
        }
        inner.gateways.remove(&id);
        inner.active_gateways.remove(&id);
        info!(id, "gateway deleted");
        self.persist_gateway(&inner, id)
    }

    /// Store the bridge endpoint used by relayed gateways
    ///
    /// Gateways already running keep the address they started with.
    pub async fn save_bridge_address(&self, bridge: BridgeAddress) -> Result<(), SimulatorError> {
        bridge.validate()?;
        let mut inner = self.inner.lock().await;
        inner.bridge_address = bridge.to_string();
        info!(bridge = %inner.bridge_address, "bridge address saved");
        Ok(self.store.save_simulator(&inner.simulator_snapshot())?)
    }

    /// Current bridge endpoint; empty when never saved
    pub async fn get_bridge_address(&self) -> BridgeAddress {
        let inner = self.inner.lock().await;
        inner.bridge_address.parse().unwrap_or_default()
    }

    /// Every gateway with its run state, ordered by identifier
    pub async fn get_gateways(&self) -> Vec<GatewayStatus> {
        let inner = self.inner.lock().await;
        inner
            .gateways
            .values()
            .map(|g| GatewayStatus {
                info: g.info.clone(),
                running: g.is_on(),
            })
            .collect()
    }

    /// One gateway with its run state
    pub async fn get_gateway(&self, id: GatewayId) -> Option<GatewayStatus> {
        let inner = self.inner.lock().await;
        inner.gateways.get(&id).map(|g| GatewayStatus {
            info: g.info.clone(),
            running: g.is_on(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_address_parsing() {
        let bridge: BridgeAddress = "localhost:1700".parse().unwrap();
        assert_eq!(bridge, BridgeAddress::new("localhost", 1700));
        assert_eq!(bridge.to_string(), "localhost:1700");
        assert_eq!("".parse::<BridgeAddress>().unwrap(), BridgeAddress::default());
        assert!("localhost".parse::<BridgeAddress>().is_err());
        assert!("localhost:0".parse::<BridgeAddress>().is_err());
        assert!(":1700".parse::<BridgeAddress>().is_err());
    }

    #[test]
    fn next_id_survives_reload() {
        let mut gateways = GatewaySnapshot::new();
        let mut info = GatewayInfo::new(crate::config::Eui64::new([1; 8]), "a");
        info.id = 7;
        info.active = true;
        gateways.insert(7, info);
        let inner = SimulatorInner::from_stored(StoredState {
            gateways,
            simulator: Some(SimulatorSnapshot {
                state: SimulatorState::Running,
                next_id: 3,
                ..Default::default()
            }),
        });
        assert_eq!(inner.next_id, 8);
        assert_eq!(inner.state, SimulatorState::Stopped);
        assert!(inner.active_gateways.contains(&7));
    }
}
