use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GatewayId, GatewayInfo};
use crate::error::PersistenceError;

/// File holding the gateway registry
pub const GATEWAYS_FILE: &str = "gateways.json";

/// File holding the simulator state
pub const SIMULATOR_FILE: &str = "simulator.json";

/// Run state of the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimulatorState {
    /// No gateway task runs
    #[default]
    Stopped,
    /// Active gateways run
    Running,
}

/// Gateway registry record
pub type GatewaySnapshot = BTreeMap<GatewayId, GatewayInfo>;

/// Simulator-state record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorSnapshot {
    /// Run state when written
    pub state: SimulatorState,
    /// Bridge `host:port`, empty when unset
    pub bridge_address: String,
    /// Gateways desired on
    pub active_gateways: BTreeSet<GatewayId>,
    /// Identifier the next added gateway receives
    pub next_id: GatewayId,
}

/// Everything a store holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredState {
    /// Gateway registry
    pub gateways: GatewaySnapshot,
    /// Simulator state, `None` if never written
    pub simulator: Option<SimulatorSnapshot>,
}

/// Persistence backend for simulator snapshots
pub trait StateStore: Send + Sync {
    /// Read both records; missing records load as empty
    fn load(&self) -> Result<StoredState, PersistenceError>;

    /// Replace the gateway registry record
    fn save_gateways(&self, gateways: &GatewaySnapshot) -> Result<(), PersistenceError>;

    /// Replace the simulator-state record
    fn save_simulator(&self, snapshot: &SimulatorSnapshot) -> Result<(), PersistenceError>;
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

/// Store writing pretty-printed JSON files into a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PersistenceError> {
        let path = self.dir.join(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Json { path, source })
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PersistenceError> {
        let path = self.dir.join(name);
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_error(&path))?;
        debug!(path = %path.display(), "state written");
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<StoredState, PersistenceError> {
        Ok(StoredState {
            gateways: self.read(GATEWAYS_FILE)?.unwrap_or_default(),
            simulator: self.read(SIMULATOR_FILE)?,
        })
    }

    fn save_gateways(&self, gateways: &GatewaySnapshot) -> Result<(), PersistenceError> {
        self.write(GATEWAYS_FILE, gateways)
    }

    fn save_simulator(&self, snapshot: &SimulatorSnapshot) -> Result<(), PersistenceError> {
        self.write(SIMULATOR_FILE, snapshot)
    }
}

/// In-memory store; can be told to fail every write
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoredState>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `state`
    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Copy of what was last written
    pub fn snapshot(&self) -> StoredState {
        self.state.lock().clone()
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<StoredState, PersistenceError> {
        Ok(self.snapshot())
    }

    fn save_gateways(&self, gateways: &GatewaySnapshot) -> Result<(), PersistenceError> {
        self.check()?;
        self.state.lock().gateways = gateways.clone();
        Ok(())
    }

    fn save_simulator(&self, snapshot: &SimulatorSnapshot) -> Result<(), PersistenceError> {
        self.check()?;
        self.state.lock().simulator = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Eui64;

    #[test]
    fn json_store_round_trips_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state"));
        assert_eq!(store.load().unwrap(), StoredState::default());

        let mut gateways = GatewaySnapshot::new();
        let mut info = GatewayInfo::new(Eui64::new([1; 8]), "gw-1");
        info.id = 4;
        gateways.insert(4, info);
        store.save_gateways(&gateways).unwrap();
        let snapshot = SimulatorSnapshot {
            bridge_address: "127.0.0.1:1700".into(),
            next_id: 5,
            ..Default::default()
        };
        store.save_simulator(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.gateways, gateways);
        assert_eq!(loaded.simulator, Some(snapshot));
        assert!(!store.dir().join("gateways.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SIMULATOR_FILE), b"{not json").unwrap();
        let err = JsonFileStore::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, PersistenceError::Json { .. }));
    }

    #[test]
    fn failing_memory_store_keeps_last_state() {
        let store = MemoryStore::new();
        store.save_simulator(&SimulatorSnapshot::default()).unwrap();
        store.set_failing(true);
        let snapshot = SimulatorSnapshot {
            next_id: 9,
            ..Default::default()
        };
        assert!(store.save_simulator(&snapshot).is_err());
        assert_eq!(store.snapshot().simulator.unwrap().next_id, 0);
    }
}
