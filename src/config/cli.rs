//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "wifi-station-service", version)]
#[clap(about = "WiFi station manager with credential-ranked association and captive portal login")]
pub struct CliArgs {
    /// Wireless network interface name
    #[clap(short, long, default_value = "wlan0")]
    pub interface: String,

    /// Path to the persisted station settings (JSON)
    #[clap(long, default_value = "/var/lib/wifi-station/settings.json")]
    pub settings: String,

    /// Path to the known-networks credential file (JSON)
    #[clap(long, default_value = "/var/lib/wifi-station/networks.json")]
    pub networks: String,

    /// Seconds to wait for the first connection before logging a warning
    #[clap(long)]
    pub wait_connected: Option<u64>,
}
