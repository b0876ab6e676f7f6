//! Lifecycle event notifications for the device layer

use tracing::info;

/// Callbacks fired by the station state machine.
///
/// Callbacks run on the state machine's event loop and must return
/// quickly; hand anything slow off to a task. All methods default to
/// no-ops so implementors subscribe only to what they need.
pub trait EventNotifier: Send + Sync + 'static {
    /// A scan cycle is about to start
    fn on_scan_begin(&self) {}

    /// A connect attempt to `ssid` was issued
    fn on_connecting(&self, _ssid: &str) {}

    /// The station acquired an IP address on `ssid`
    fn on_connected(&self, _ssid: &str) {}

    /// The link dropped after a successful join
    fn on_disconnected(&self) {}
}

/// Notifier that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl EventNotifier for NullNotifier {}

/// Notifier that logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
    fn on_scan_begin(&self) {
        info!("scan started");
    }

    fn on_connecting(&self, ssid: &str) {
        info!(ssid, "connecting");
    }

    fn on_connected(&self, ssid: &str) {
        info!(ssid, "connected");
    }

    fn on_disconnected(&self) {
        info!("disconnected");
    }
}
