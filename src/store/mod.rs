//! Known-network credential store
//!
//! The station core only reads from the store; writes come from the
//! outside (first-time setup, a provisioning flow). Entries are unique
//! by ssid and ordered; adding an existing ssid replaces its entry.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::StoreResult;

/// One remembered network identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownNetwork {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    /// Portal or EAP username; absent for plain PSK networks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Ordered, ssid-unique credential collection consumed by the station core
pub trait CredentialStore: Send + Sync + 'static {
    /// Snapshot of the known networks, in stored order
    fn list_known_networks(&self) -> Vec<KnownNetwork>;

    /// Remember an ssid/password pair, replacing any existing entry
    fn add_network(&self, ssid: &str, password: &str);
}

fn upsert(networks: &mut Vec<KnownNetwork>, entry: KnownNetwork) {
    match networks.iter_mut().find(|n| n.ssid == entry.ssid) {
        Some(existing) => *existing = entry,
        None => networks.push(entry),
    }
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryStore {
    networks: Mutex<Vec<KnownNetwork>>,
}

impl MemoryStore {
    pub fn new(networks: Vec<KnownNetwork>) -> Self {
        Self {
            networks: Mutex::new(networks),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn list_known_networks(&self) -> Vec<KnownNetwork> {
        self.networks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn add_network(&self, ssid: &str, password: &str) {
        let mut networks = self.networks.lock().unwrap_or_else(|e| e.into_inner());
        upsert(
            &mut networks,
            KnownNetwork {
                ssid: ssid.to_string(),
                password: password.to_string(),
                username: None,
            },
        );
    }
}

/// JSON-file-backed credential store.
///
/// Loaded once at construction; additions are persisted best-effort (a
/// write failure keeps the in-memory entry and logs a warning).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    networks: Mutex<Vec<KnownNetwork>>,
}

impl FileStore {
    /// Load the store from `path`. A missing file is an empty store, not
    /// an error; malformed content is.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let networks = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            networks: Mutex::new(networks),
        })
    }

    fn persist(&self, networks: &[KnownNetwork]) -> StoreResult<()> {
        let raw = serde_json::to_string_pretty(networks)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn list_known_networks(&self) -> Vec<KnownNetwork> {
        self.networks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn add_network(&self, ssid: &str, password: &str) {
        let mut networks = self.networks.lock().unwrap_or_else(|e| e.into_inner());
        upsert(
            &mut networks,
            KnownNetwork {
                ssid: ssid.to_string(),
                password: password.to_string(),
                username: None,
            },
        );
        if let Err(e) = self.persist(&networks) {
            warn!(path = %self.path.display(), error = %e, "failed to persist credential store");
        }
    }
}
