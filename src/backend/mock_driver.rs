//! Mock radio driver for testing

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::backend::radio_driver::{
    RadioDriver, RadioEvent, RadioEventReceiver, RadioEventSender,
};
use crate::core::error::{RadioError, RadioResult};
use crate::core::types::{ConnectRequest, PowerSaveLevel};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Commands recorded by the mock, in issue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommand {
    Scan { show_hidden: bool },
    Connect(ConnectRequest),
    Disconnect,
    MaxTxPower(i8),
    PowerSave(PowerSaveLevel),
}

#[derive(Debug)]
struct MockState {
    commands: Vec<MockCommand>,
    should_fail_connect: bool,
    rssi: Option<i16>,
    channel: Option<u8>,
}

/// Mock radio driver for testing
///
/// Records every command and lets tests inject [`RadioEvent`]s as if the
/// hardware produced them, without requiring an actual radio.
#[derive(Debug, Clone)]
pub struct MockRadioDriver {
    inner: Arc<Mutex<MockState>>,
    events: RadioEventSender,
}

impl MockRadioDriver {
    /// Create a mock and the event receiver the station will consume
    pub fn new() -> (Self, RadioEventReceiver) {
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let driver = Self {
            inner: Arc::new(Mutex::new(MockState {
                commands: Vec::new(),
                should_fail_connect: false,
                rssi: None,
                channel: None,
            })),
            events,
        };
        (driver, receiver)
    }

    /// Inject a radio event as if the hardware reported it
    pub async fn emit(&self, event: RadioEvent) {
        let _ = self.events.send(event).await;
    }

    /// Everything issued to the driver so far
    pub async fn commands(&self) -> Vec<MockCommand> {
        self.inner.lock().await.commands.clone()
    }

    /// SSIDs of the connect commands issued so far, in order
    pub async fn connect_ssids(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .commands
            .iter()
            .filter_map(|command| match command {
                MockCommand::Connect(request) => Some(request.ssid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of scan commands issued so far
    pub async fn scan_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .commands
            .iter()
            .filter(|command| matches!(command, MockCommand::Scan { .. }))
            .count()
    }

    /// Configure mock to reject connect commands
    pub async fn set_connect_failure(&self, should_fail: bool) {
        self.inner.lock().await.should_fail_connect = should_fail;
    }

    /// Configure the live readings reported for a joined access point
    pub async fn set_link_readings(&self, rssi: Option<i16>, channel: Option<u8>) {
        let mut state = self.inner.lock().await;
        state.rssi = rssi;
        state.channel = channel;
    }
}

impl RadioDriver for MockRadioDriver {
    async fn start_scan(&self, show_hidden: bool) -> RadioResult<()> {
        self.inner
            .lock()
            .await
            .commands
            .push(MockCommand::Scan { show_hidden });
        Ok(())
    }

    async fn connect(&self, request: &ConnectRequest) -> RadioResult<()> {
        let mut state = self.inner.lock().await;
        state.commands.push(MockCommand::Connect(request.clone()));
        if state.should_fail_connect {
            Err(RadioError::ConnectFailed("mock connect failure".into()))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&self) -> RadioResult<()> {
        self.inner.lock().await.commands.push(MockCommand::Disconnect);
        Ok(())
    }

    async fn set_max_tx_power(&self, dbm: i8) -> RadioResult<()> {
        self.inner
            .lock()
            .await
            .commands
            .push(MockCommand::MaxTxPower(dbm));
        Ok(())
    }

    async fn set_power_save(&self, level: PowerSaveLevel) -> RadioResult<()> {
        self.inner
            .lock()
            .await
            .commands
            .push(MockCommand::PowerSave(level));
        Ok(())
    }

    async fn signal_strength(&self) -> RadioResult<Option<i16>> {
        Ok(self.inner.lock().await.rssi)
    }

    async fn channel(&self) -> RadioResult<Option<u8>> {
        Ok(self.inner.lock().await.channel)
    }
}
