//! Radio driver abstraction
//!
//! The driver is a command sink plus an event source. Commands go through
//! the [`RadioDriver`] trait; events come back on an mpsc channel handed
//! out when the driver is constructed, so the station consumes them from
//! a single task without any cross-context locking.

use std::net::Ipv4Addr;

use tokio::sync::mpsc;
use trait_variant::make;

use crate::core::error::RadioResult;
use crate::core::types::{ConnectRequest, PowerSaveLevel, ScanResult};

/// Events pushed by the radio driver from its own execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// The link layer is up and ready for scan/connect commands.
    /// Drivers must emit this exactly once after their runtime starts.
    Started,
    /// A scan cycle finished with these results
    ScanDone(Vec<ScanResult>),
    /// The link to the current access point dropped (also covers failed
    /// handshakes and out-of-range targets; the driver cannot always
    /// tell them apart)
    Disconnected,
    /// Address configuration completed; the link is usable
    IpAcquired {
        ip: Ipv4Addr,
        /// Default gateway, when the driver can determine it
        gateway: Option<Ipv4Addr>,
    },
}

pub type RadioEventSender = mpsc::Sender<RadioEvent>;
pub type RadioEventReceiver = mpsc::Receiver<RadioEvent>;

/// Abstraction over the wireless control interface
///
/// This trait enables testing by allowing mock implementations while
/// providing a standard interface for radio operations. Commands must
/// not block on link activity; completion is reported via [`RadioEvent`].
#[make(Send)]
pub trait RadioDriver: Sync + 'static {
    /// Kick off an asynchronous scan cycle; results arrive as
    /// [`RadioEvent::ScanDone`]
    async fn start_scan(&self, show_hidden: bool) -> RadioResult<()>;

    /// Begin associating with an access point; progress arrives as
    /// [`RadioEvent::IpAcquired`] or [`RadioEvent::Disconnected`]
    async fn connect(&self, request: &ConnectRequest) -> RadioResult<()>;

    /// Drop the current association, if any
    async fn disconnect(&self) -> RadioResult<()>;

    /// Cap the transmit power, in dBm
    async fn set_max_tx_power(&self, dbm: i8) -> RadioResult<()>;

    /// Select modem sleep aggressiveness
    async fn set_power_save(&self, level: PowerSaveLevel) -> RadioResult<()>;

    /// Live signal strength of the joined access point, when available
    async fn signal_strength(&self) -> RadioResult<Option<i16>>;

    /// Channel of the joined access point, when available
    async fn channel(&self) -> RadioResult<Option<u8>>;
}
