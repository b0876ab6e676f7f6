//! wifi-ctrl (wpa_supplicant) radio driver

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};
use wifi_ctrl::sta::{Broadcast, BroadcastReceiver, RequestClient, WifiSetup};

use crate::backend::radio_driver::{
    RadioDriver, RadioEvent, RadioEventReceiver, RadioEventSender,
};
use crate::core::error::{RadioError, RadioResult};
use crate::core::types::{AuthMaterial, ConnectRequest, PowerSaveLevel, ScanResult, parse_bssid};

const EVENT_CHANNEL_CAPACITY: usize = 32;
const IP_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);
const IP_POLL_RETRIES: usize = 30; // 30 * 200ms = 6 seconds

/// Radio driver backed by wpa_supplicant through the wifi-ctrl crate.
///
/// wpa_supplicant's broadcast events are translated into [`RadioEvent`]s
/// on a pump task; IPv4 address and default gateway are discovered with
/// the `ip` tool after link-up, power knobs are applied with `iw`.
pub struct WifiCtrlDriver {
    interface: String,
    client: Arc<RequestClient>,
    events: RadioEventSender,
}

impl WifiCtrlDriver {
    /// Connect to the wpa_supplicant control socket for `interface` and
    /// return the driver plus the event stream it feeds.
    pub async fn new(interface: &str) -> RadioResult<(Self, RadioEventReceiver)> {
        let path = format!("/var/run/wpa_supplicant/{interface}");
        let mut setup =
            WifiSetup::new().map_err(|e| RadioError::CommandFailed(e.to_string()))?;
        setup.set_socket_path(path);

        let client = Arc::new(setup.get_request_client());
        let broadcast_receiver = setup.get_broadcast_receiver();
        let station = setup.complete();

        // Spawn the station runtime
        tokio::spawn(async move {
            if let Err(e) = station.run().await {
                error!(error = %e, "wpa_supplicant station runtime failed");
            }
        });

        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self::spawn_event_pump(broadcast_receiver, events.clone(), interface.to_string());

        Ok((
            Self {
                interface: interface.to_string(),
                client,
                events,
            },
            receiver,
        ))
    }

    fn spawn_event_pump(
        mut receiver: BroadcastReceiver,
        events: RadioEventSender,
        interface: String,
    ) {
        tokio::spawn(async move {
            if events.send(RadioEvent::Started).await.is_err() {
                return;
            }
            loop {
                match receiver.recv().await {
                    Ok(Broadcast::Connected) => {
                        debug!("link up, waiting for address configuration");
                        match wait_for_ipv4(&interface).await {
                            Some(ip) => {
                                let gateway = default_gateway(&interface).await;
                                if events
                                    .send(RadioEvent::IpAcquired { ip, gateway })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            None => warn!("link up but no IPv4 address appeared"),
                        }
                    }
                    Ok(
                        Broadcast::Disconnected | Broadcast::WrongPsk | Broadcast::NetworkNotFound,
                    ) => {
                        if events.send(RadioEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "radio broadcast receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("radio event pump stopped");
        });
    }

    /// Convert frequency (MHz) to channel number
    fn frequency_to_channel(freq_str: &str) -> u8 {
        let freq = freq_str.parse::<u16>().unwrap_or(0);
        match freq {
            2412 => 1,
            2417 => 2,
            2422 => 3,
            2427 => 4,
            2432 => 5,
            2437 => 6,
            2442 => 7,
            2447 => 8,
            2452 => 9,
            2457 => 10,
            2462 => 11,
            2467 => 12,
            2472 => 13,
            2484 => 14,
            // 5GHz channels (simplified)
            5180 => 36,
            5200 => 40,
            5220 => 44,
            5240 => 48,
            5260 => 52,
            5280 => 56,
            5300 => 60,
            5320 => 64,
            5500 => 100,
            5520 => 104,
            5540 => 108,
            5560 => 112,
            5580 => 116,
            5660 => 132,
            5680 => 136,
            5700 => 140,
            5745 => 149,
            5765 => 153,
            5785 => 157,
            5805 => 161,
            5825 => 165,
            _ => 0,
        }
    }

    async fn run_iw(args: &[&str]) -> RadioResult<()> {
        let output = Command::new("iw")
            .args(args)
            .output()
            .await
            .map_err(|e| RadioError::CommandFailed(format!("iw: {e}")))?;
        if !output.status.success() {
            return Err(RadioError::CommandFailed(format!(
                "iw {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Poll for an IPv4 address on the interface after link-up
async fn wait_for_ipv4(interface: &str) -> Option<Ipv4Addr> {
    for _ in 0..IP_POLL_RETRIES {
        if let Some(ip) = interface_ipv4(interface).await {
            return Some(ip);
        }
        tokio::time::sleep(IP_POLL_INTERVAL).await;
    }
    None
}

/// Get the interface address using the ip command
async fn interface_ipv4(interface: &str) -> Option<Ipv4Addr> {
    let output = Command::new("ip")
        .args(["-4", "addr", "show", interface])
        .output()
        .await
        .ok()?;
    parse_inet_addr(&String::from_utf8_lossy(&output.stdout))
}

fn parse_inet_addr(output: &str) -> Option<Ipv4Addr> {
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("inet ") {
            let addr = rest.split_whitespace().next()?.split('/').next()?;
            if let Ok(ip) = addr.parse() {
                return Some(ip);
            }
        }
    }
    None
}

/// Get the default gateway using the ip command
async fn default_gateway(interface: &str) -> Option<Ipv4Addr> {
    let output = Command::new("ip")
        .args(["route", "show", "default", "dev", interface])
        .output()
        .await
        .ok()?;
    parse_default_gateway(&String::from_utf8_lossy(&output.stdout))
}

fn parse_default_gateway(output: &str) -> Option<Ipv4Addr> {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word == "via" {
            return words.next()?.parse().ok();
        }
    }
    None
}

impl RadioDriver for WifiCtrlDriver {
    async fn start_scan(&self, _show_hidden: bool) -> RadioResult<()> {
        // wpa_supplicant includes hidden networks in its scan results on
        // its own; the flag has no control-socket equivalent.
        debug!(interface = %self.interface, "starting scan");

        let client = self.client.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let results = match client.get_scan().await {
                Ok(results) => results
                    .iter()
                    .map(|result| ScanResult {
                        ssid: result.name.clone(),
                        bssid: parse_bssid(&result.mac).unwrap_or_default(),
                        channel: Self::frequency_to_channel(&result.frequency),
                        rssi: result.signal as i16,
                        // wpa_supplicant scan entries carry no parsed auth
                        // flags through wifi-ctrl
                        auth_mode: Default::default(),
                    })
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "scan failed, reporting an empty cycle");
                    Vec::new()
                }
            };
            debug!(count = results.len(), "scan complete");
            let _ = events.send(RadioEvent::ScanDone(results)).await;
        });

        Ok(())
    }

    async fn connect(&self, request: &ConnectRequest) -> RadioResult<()> {
        debug!(ssid = %request.ssid, "connecting");

        if request.bssid.is_some() {
            // wifi-ctrl exposes no typed bssid setter
            debug!("bssid pinning not supported by this backend, ignoring");
        }

        let network_id = self
            .client
            .add_network()
            .await
            .map_err(|e| RadioError::ConnectFailed(format!("failed to add network: {e}")))?;

        self.client
            .set_network_ssid(network_id, request.ssid.clone())
            .await
            .map_err(|e| RadioError::ConnectFailed(format!("failed to set SSID: {e}")))?;

        match &request.auth {
            AuthMaterial::Open => {}
            AuthMaterial::Psk(passphrase) => {
                // wifi-ctrl handles quoting internally via conf_escape
                self.client
                    .set_network_psk(network_id, passphrase.clone())
                    .await
                    .map_err(|e| RadioError::ConnectFailed(format!("failed to set PSK: {e}")))?;
            }
            AuthMaterial::Enterprise { .. } => {
                return Err(RadioError::Unsupported(
                    "WPA2-Enterprise via the wpa_supplicant control socket",
                ));
            }
        }

        self.client
            .select_network(network_id)
            .await
            .map_err(|e| RadioError::ConnectFailed(format!("failed to select network: {e}")))?;

        Ok(())
    }

    async fn disconnect(&self) -> RadioResult<()> {
        debug!("disconnecting");
        self.client
            .send_custom("DISCONNECT".to_string())
            .await
            .map_err(|e| RadioError::CommandFailed(format!("failed to disconnect: {e}")))?;
        Ok(())
    }

    async fn set_max_tx_power(&self, dbm: i8) -> RadioResult<()> {
        let mbm = i32::from(dbm) * 100;
        Self::run_iw(&[
            "dev",
            &self.interface,
            "set",
            "txpower",
            "fixed",
            &mbm.to_string(),
        ])
        .await
    }

    async fn set_power_save(&self, level: PowerSaveLevel) -> RadioResult<()> {
        let mode = match level {
            PowerSaveLevel::LowPower | PowerSaveLevel::Balanced => "on",
            PowerSaveLevel::Performance => "off",
        };
        Self::run_iw(&["dev", &self.interface, "set", "power_save", mode]).await
    }

    async fn signal_strength(&self) -> RadioResult<Option<i16>> {
        // wpa_supplicant's STATUS reply carries no RSSI
        Ok(None)
    }

    async fn channel(&self) -> RadioResult<Option<u8>> {
        let status = self
            .client
            .get_status()
            .await
            .map_err(|e| RadioError::CommandFailed(format!("failed to get status: {e}")))?;

        Ok(status
            .get("freq")
            .map(|freq| Self::frequency_to_channel(freq))
            .filter(|channel| *channel != 0))
    }
}
