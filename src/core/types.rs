//! Domain types for WiFi station management

use serde::{Deserialize, Serialize};

/// Hardware address of an access point
pub type Bssid = [u8; 6];

/// Format a BSSID in the usual colon-separated notation
pub fn format_bssid(bssid: &Bssid) -> String {
    bssid
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse a colon-separated BSSID string
pub fn parse_bssid(s: &str) -> Option<Bssid> {
    let bytes = hex::decode(s.replace(':', "")).ok()?;
    bytes.try_into().ok()
}

/// Authentication mode reported for an access point
///
/// `Unknown` covers backends that do not expose auth flags in scan
/// results; it is treated as non-enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    Wpa2Personal,
    Wpa3Personal,
    Wpa2Enterprise,
    Wpa2Wpa3Enterprise,
    #[default]
    Unknown,
}

impl AuthMode {
    /// Enterprise modes authenticate through the driver's EAP machinery,
    /// never through a captive portal.
    pub fn is_enterprise(self) -> bool {
        matches!(self, AuthMode::Wpa2Enterprise | AuthMode::Wpa2Wpa3Enterprise)
    }
}

/// A single access point observed during one scan cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Network SSID
    pub ssid: String,
    /// Hardware address
    pub bssid: Bssid,
    /// Primary channel
    pub channel: u8,
    /// Signal strength in dBm
    pub rssi: i16,
    /// Advertised authentication mode
    pub auth_mode: AuthMode,
}

/// A scan result joined with its credential store entry, eligible for a
/// connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ssid: String,
    pub password: String,
    /// Portal or EAP username, when the stored entry carries one
    pub username: Option<String>,
    pub bssid: Bssid,
    pub channel: u8,
    pub rssi: i16,
    pub auth_mode: AuthMode,
}

impl Candidate {
    pub fn is_enterprise(&self) -> bool {
        self.auth_mode.is_enterprise()
    }

    /// A stored username on a non-enterprise network means the network
    /// gates egress behind an HTTP login form.
    pub fn wants_portal_login(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty()) && !self.is_enterprise()
    }

    /// Build the driver command for one attempt at this access point
    pub fn connect_request(&self, remember_bssid: bool) -> ConnectRequest {
        let auth = if self.is_enterprise() {
            AuthMaterial::Enterprise {
                username: self.username.clone().unwrap_or_default(),
                password: self.password.clone(),
            }
        } else if self.auth_mode == AuthMode::Open || self.password.is_empty() {
            AuthMaterial::Open
        } else {
            AuthMaterial::Psk(self.password.clone())
        };

        ConnectRequest {
            ssid: self.ssid.clone(),
            auth,
            bssid: remember_bssid.then_some((self.bssid, self.channel)),
        }
    }
}

/// Authentication material carried by a connect command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    Open,
    Psk(String),
    Enterprise { username: String, password: String },
}

/// One connect command issued to the radio driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub ssid: String,
    pub auth: AuthMaterial,
    /// Pin the attempt to the BSSID/channel seen during the scan
    pub bssid: Option<(Bssid, u8)>,
}

/// Station state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StationState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
}

/// Snapshot of the station published to the device layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StationStatus {
    pub state: StationState,
    /// SSID of the joined network (if connected)
    pub ssid: Option<String>,
    /// Assigned IPv4 address (if connected)
    pub ip_address: Option<String>,
    /// Signal strength at join time, refreshed from the driver when possible
    pub rssi: Option<i16>,
    /// Channel of the joined access point
    pub channel: Option<u8>,
    /// Set once the manager has been stopped; no further transitions follow
    pub stopped: bool,
}

/// Modem sleep aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerSaveLevel {
    LowPower,
    #[default]
    Balanced,
    Performance,
}
