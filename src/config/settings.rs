//! Persisted station settings

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::types::PowerSaveLevel;

const DEFAULT_BACKOFF_MIN_SECS: u64 = 10;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Station configuration read once at construction and applied
/// idempotently. Every field has a "no override" default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Transmit power ceiling in dBm; 0 keeps the driver default
    pub max_tx_power: i8,
    /// Pin reconnects to the BSSID/channel seen during the scan
    pub remember_bssid: bool,
    /// Rescan backoff floor in seconds
    pub scan_backoff_min_secs: u64,
    /// Rescan backoff ceiling in seconds
    pub scan_backoff_max_secs: u64,
    /// Modem sleep aggressiveness
    pub power_save: PowerSaveLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_tx_power: 0,
            remember_bssid: false,
            scan_backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            scan_backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            power_save: PowerSaveLevel::Balanced,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// A missing file or malformed content falls back to defaults with a
    /// warning; absence of overrides is not an error.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Settings>(&raw) {
                Ok(settings) => settings.sanitized(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Keep the backoff range ordered; an inverted range collapses to
    /// the floor.
    fn sanitized(mut self) -> Self {
        if self.scan_backoff_max_secs < self.scan_backoff_min_secs {
            warn!(
                min = self.scan_backoff_min_secs,
                max = self.scan_backoff_max_secs,
                "scan backoff range inverted, clamping"
            );
            self.scan_backoff_max_secs = self.scan_backoff_min_secs;
        }
        self
    }

    pub fn backoff_min(&self) -> Duration {
        Duration::from_secs(self.scan_backoff_min_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.scan_backoff_max_secs)
    }
}
