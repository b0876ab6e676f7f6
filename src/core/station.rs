//! Connection state machine and station manager
//!
//! A single worker task owns all connection state and consumes radio
//! events in delivery order, so per-attempt races (a disconnect arriving
//! for a candidate the machine already moved past) cannot occur. The
//! [`Station`] handle only reads snapshots published through a watch
//! channel.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{RadioDriver, RadioEvent, RadioEventReceiver},
    config::Settings,
    core::{
        error::StationResult,
        notifier::EventNotifier,
        portal::{self, PortalHttp, PortalOutcome, PortalPolicy, PortalSession},
        ranker,
        types::{Candidate, ConnectRequest, ScanResult, StationState, StationStatus},
    },
    store::CredentialStore,
};

/// Same-candidate reconnect budget before moving on.
///
/// Large enough to ride out transient handshake failures and weak-signal
/// drops, small enough that a truly failed join advances quickly.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Rescan delay, doubling on every unproductive scan cycle
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self { current: min, min, max }
    }

    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    pub(crate) fn advance(&mut self) {
        self.current = (self.current * 2).min(self.max);
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.min;
    }
}

/// The single in-flight connection attempt
#[derive(Debug)]
struct ConnectionContext {
    candidate: Candidate,
    request: ConnectRequest,
    attempts: u32,
}

/// Handle to a running station manager.
///
/// Queries are cheap snapshot reads; the state machine itself runs on its
/// own task fed by radio driver events. Dropping the handle without
/// calling [`Station::stop`] leaves the worker running detached.
pub struct Station {
    status: watch::Receiver<StationStatus>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Station {
    /// Start the manager with the default captive portal policy.
    ///
    /// Applies the configured power knobs before spawning the worker; a
    /// driver rejecting them is a configuration defect and fails the
    /// whole start.
    pub async fn start<D, H>(
        driver: Arc<D>,
        events: RadioEventReceiver,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn EventNotifier>,
        http: Arc<H>,
        settings: Settings,
    ) -> StationResult<Self>
    where
        D: RadioDriver + Send,
        H: PortalHttp + Send,
    {
        Self::start_with_policy(
            driver,
            events,
            store,
            notifier,
            http,
            settings,
            PortalPolicy::default(),
        )
        .await
    }

    /// Start the manager with an explicit captive portal policy
    pub async fn start_with_policy<D, H>(
        driver: Arc<D>,
        events: RadioEventReceiver,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn EventNotifier>,
        http: Arc<H>,
        settings: Settings,
        portal_policy: PortalPolicy,
    ) -> StationResult<Self>
    where
        D: RadioDriver + Send,
        H: PortalHttp + Send,
    {
        driver.set_power_save(settings.power_save).await?;
        if settings.max_tx_power != 0 {
            driver.set_max_tx_power(settings.max_tx_power).await?;
        }

        let (status_tx, status_rx) = watch::channel(StationStatus::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let backoff = Backoff::new(settings.backoff_min(), settings.backoff_max());

        let worker = StationWorker {
            driver,
            store,
            notifier,
            http,
            settings,
            portal_policy,
            status: status_tx,
            state: StationState::Idle,
            queue: VecDeque::new(),
            context: None,
            backoff,
            rescan_at: None,
            was_connected: false,
            portal_task: None,
        };
        let task = tokio::spawn(worker.run(events, stop_rx));

        Ok(Self {
            status: status_rx,
            stop: stop_tx,
            task,
        })
    }

    /// Current status snapshot
    pub fn status(&self) -> StationStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().state == StationState::Connected
    }

    pub fn current_ssid(&self) -> Option<String> {
        self.status.borrow().ssid.clone()
    }

    pub fn ip_address(&self) -> Option<String> {
        self.status.borrow().ip_address.clone()
    }

    pub fn signal_strength(&self) -> Option<i16> {
        self.status.borrow().rssi
    }

    pub fn channel(&self) -> Option<u8> {
        self.status.borrow().channel
    }

    /// Block until the station is connected or stopped, bounded by
    /// `timeout`. Returns whether the station ended up connected.
    pub async fn wait_for_connected(&self, timeout: Duration) -> bool {
        let mut status = self.status.clone();
        let connected_or_stopped = status.wait_for(|s| s.stopped || s.state == StationState::Connected);
        match time::timeout(timeout, connected_or_stopped).await {
            Ok(Ok(status)) => status.state == StationState::Connected,
            _ => false,
        }
    }

    /// Tear the station down: the worker unsubscribes from driver events,
    /// cancels any pending rescan, disconnects the link and publishes the
    /// stopped status. Returns only after the worker has exited, so
    /// dependent state may be destroyed safely afterwards. A running
    /// portal login task is left to finish on its own; it holds no
    /// station state.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "station worker ended abnormally");
        }
    }
}

/// Worker task: sole owner and writer of connection state
struct StationWorker<D, H> {
    driver: Arc<D>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn EventNotifier>,
    http: Arc<H>,
    settings: Settings,
    portal_policy: PortalPolicy,
    status: watch::Sender<StationStatus>,

    state: StationState,
    queue: VecDeque<Candidate>,
    context: Option<ConnectionContext>,
    backoff: Backoff,
    rescan_at: Option<Instant>,
    was_connected: bool,
    portal_task: Option<JoinHandle<PortalOutcome>>,
}

impl<D, H> StationWorker<D, H>
where
    D: RadioDriver + Send,
    H: PortalHttp + Send,
{
    async fn run(mut self, mut events: RadioEventReceiver, mut stop: watch::Receiver<bool>) {
        debug!("station worker started");
        loop {
            let rescan_at = self.rescan_at;
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("radio event channel closed");
                        break;
                    }
                },
                _ = async {
                    match rescan_at {
                        Some(at) => time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.rescan_at = None;
                    if self.state != StationState::Connected {
                        self.request_scan().await;
                    }
                }
            }
        }
        self.shutdown().await;
    }

    async fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Started => self.request_scan().await,
            RadioEvent::ScanDone(results) => self.handle_scan_done(results).await,
            RadioEvent::Disconnected => self.handle_disconnected().await,
            RadioEvent::IpAcquired { ip, gateway } => self.handle_ip_acquired(ip, gateway).await,
        }
    }

    async fn request_scan(&mut self) {
        self.notifier.on_scan_begin();
        self.set_state(StationState::Scanning);
        if let Err(e) = self.driver.start_scan(true).await {
            error!(error = %e, "scan request failed");
            self.schedule_rescan();
        }
    }

    async fn handle_scan_done(&mut self, results: Vec<ScanResult>) {
        if self.state == StationState::Connected {
            // A cycle that was in flight when the join completed; the
            // queue stays cleared.
            debug!("scan finished after successful join, discarding");
            return;
        }

        let known = self.store.list_known_networks();
        self.queue = ranker::rank(&results, &known);
        info!(
            access_points = results.len(),
            candidates = self.queue.len(),
            "scan finished"
        );

        if self.queue.is_empty() {
            self.schedule_rescan();
        } else {
            self.connect_next().await;
        }
    }

    /// Pop the strongest remaining candidate and issue a connect. A
    /// rejected connect command consumes the candidate and moves on; an
    /// exhausted queue starts a fresh scan.
    async fn connect_next(&mut self) {
        loop {
            let Some(candidate) = self.queue.pop_front() else {
                debug!("candidate queue exhausted, starting a new scan");
                self.request_scan().await;
                return;
            };

            info!(ssid = %candidate.ssid, rssi = candidate.rssi, "connecting");
            self.notifier.on_connecting(&candidate.ssid);
            self.set_state(StationState::Connecting);

            // Drop whatever association the driver still holds before
            // retargeting
            if let Err(e) = self.driver.disconnect().await {
                debug!(error = %e, "pre-connect disconnect failed");
            }

            let request = candidate.connect_request(self.settings.remember_bssid);
            match self.driver.connect(&request).await {
                Ok(()) => {
                    self.context = Some(ConnectionContext {
                        candidate,
                        request,
                        attempts: 0,
                    });
                    return;
                }
                Err(e) => {
                    error!(ssid = %candidate.ssid, error = %e, "connect command rejected");
                    self.context = None;
                }
            }
        }
    }

    async fn handle_disconnected(&mut self) {
        if self.was_connected {
            self.was_connected = false;
            self.notifier.on_disconnected();
        }
        self.clear_link_status();

        let retry = match self.context.as_mut() {
            None => {
                debug!("disconnect event with no attempt in flight, ignoring");
                return;
            }
            Some(ctx) if ctx.attempts < MAX_RECONNECT_ATTEMPTS => {
                ctx.attempts += 1;
                Some((ctx.candidate.ssid.clone(), ctx.attempts, ctx.request.clone()))
            }
            Some(_) => None,
        };

        if let Some((ssid, attempt, request)) = retry {
            info!(
                ssid = %ssid,
                attempt,
                limit = MAX_RECONNECT_ATTEMPTS,
                "link lost, reconnecting"
            );
            self.set_state(StationState::Connecting);
            match self.driver.connect(&request).await {
                Ok(()) => return,
                Err(e) => warn!(ssid = %ssid, error = %e, "reconnect command rejected"),
            }
        } else if let Some(ctx) = &self.context {
            info!(ssid = %ctx.candidate.ssid, "retry budget exhausted, moving on");
        }

        self.context = None;
        if self.queue.is_empty() {
            self.schedule_rescan();
        } else {
            self.connect_next().await;
        }
    }

    async fn handle_ip_acquired(&mut self, ip: Ipv4Addr, gateway: Option<Ipv4Addr>) {
        let candidate = match self.context.as_mut() {
            Some(ctx) => {
                ctx.attempts = 0;
                ctx.candidate.clone()
            }
            None => {
                debug!(%ip, "ip acquired with no attempt in flight, ignoring");
                return;
            }
        };

        self.state = StationState::Connected;
        self.was_connected = true;
        // A successful join invalidates the lower-priority leftovers
        self.queue.clear();
        self.backoff.reset();
        self.rescan_at = None;

        let rssi = match self.driver.signal_strength().await {
            Ok(Some(live)) => Some(live),
            _ => Some(candidate.rssi),
        };
        let channel = match self.driver.channel().await {
            Ok(Some(live)) => Some(live),
            _ => Some(candidate.channel),
        };

        self.status.send_modify(|s| {
            s.state = StationState::Connected;
            s.ssid = Some(candidate.ssid.clone());
            s.ip_address = Some(ip.to_string());
            s.rssi = rssi;
            s.channel = channel;
        });

        info!(ssid = %candidate.ssid, %ip, "connected");
        self.notifier.on_connected(&candidate.ssid);

        if candidate.wants_portal_login() {
            let session = PortalSession {
                ssid: candidate.ssid.clone(),
                username: candidate.username.clone().unwrap_or_default(),
                password: candidate.password.clone(),
                gateway,
            };
            // One login per join; a task left over from a previous join
            // is obsolete
            if let Some(stale) = self.portal_task.take() {
                stale.abort();
            }
            self.portal_task = Some(portal::spawn(
                self.http.clone(),
                self.portal_policy.clone(),
                session,
            ));
        }
    }

    fn schedule_rescan(&mut self) {
        let delay = self.backoff.current();
        self.rescan_at = Some(Instant::now() + delay);
        info!(seconds = delay.as_secs(), "no viable network, rescan scheduled");
        self.backoff.advance();
        self.set_state(StationState::Idle);
    }

    fn set_state(&mut self, state: StationState) {
        self.state = state;
        self.status.send_modify(|s| s.state = state);
    }

    fn clear_link_status(&mut self) {
        self.status.send_modify(|s| {
            s.ssid = None;
            s.ip_address = None;
            s.rssi = None;
            s.channel = None;
        });
    }

    async fn shutdown(&mut self) {
        self.rescan_at = None;
        self.queue.clear();
        self.context = None;
        if let Err(e) = self.driver.disconnect().await {
            debug!(error = %e, "disconnect on stop failed");
        }
        self.was_connected = false;
        self.status.send_modify(|s| {
            *s = StationStatus {
                stopped: true,
                ..StationStatus::default()
            };
        });
        debug!("station worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockCommand, MockRadioDriver};
    use crate::core::error::{PortalError, PortalResult};
    use crate::core::portal::ProbeReply;
    use crate::core::types::AuthMode;
    use crate::store::{KnownNetwork, MemoryStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventNotifier for RecordingNotifier {
        fn on_scan_begin(&self) {
            self.events.lock().unwrap().push("scan_begin".into());
        }
        fn on_connecting(&self, ssid: &str) {
            self.events.lock().unwrap().push(format!("connecting:{ssid}"));
        }
        fn on_connected(&self, ssid: &str) {
            self.events.lock().unwrap().push(format!("connected:{ssid}"));
        }
        fn on_disconnected(&self) {
            self.events.lock().unwrap().push("disconnected".into());
        }
    }

    /// Portal seam that records sessions but never reaches a network
    #[derive(Default)]
    struct RecordingHttp {
        probes: Mutex<Vec<String>>,
    }

    impl RecordingHttp {
        fn probes(&self) -> Vec<String> {
            self.probes.lock().unwrap().clone()
        }
    }

    impl PortalHttp for RecordingHttp {
        async fn probe(&self, url: &str, _timeout: Duration) -> PortalResult<ProbeReply> {
            self.probes.lock().unwrap().push(url.to_string());
            Err(PortalError::Transport("offline".into()))
        }

        async fn post_form(
            &self,
            _url: &str,
            _form: &[(&str, &str)],
            _timeout: Duration,
        ) -> PortalResult<u16> {
            Err(PortalError::Transport("offline".into()))
        }

        async fn resolve(&self, _host: &str) -> PortalResult<Option<Ipv4Addr>> {
            Ok(None)
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            scan_backoff_min_secs: 0,
            scan_backoff_max_secs: 0,
            ..Settings::default()
        }
    }

    fn known(ssid: &str, password: &str, username: Option<&str>) -> KnownNetwork {
        KnownNetwork {
            ssid: ssid.into(),
            password: password.into(),
            username: username.map(str::to_owned),
        }
    }

    fn ap(ssid: &str, rssi: i16, auth_mode: AuthMode) -> ScanResult {
        ScanResult {
            ssid: ssid.into(),
            bssid: [0x02, 0, 0, 0, 0, 7],
            channel: 6,
            rssi,
            auth_mode,
        }
    }

    async fn start_station(
        networks: Vec<KnownNetwork>,
        settings: Settings,
    ) -> (
        Station,
        MockRadioDriver,
        Arc<RecordingNotifier>,
        Arc<RecordingHttp>,
    ) {
        let (driver, events) = MockRadioDriver::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let http = Arc::new(RecordingHttp::default());
        let station = Station::start_with_policy(
            Arc::new(driver.clone()),
            events,
            Arc::new(MemoryStore::new(networks)),
            notifier.clone(),
            http.clone(),
            settings,
            PortalPolicy::default(),
        )
        .await
        .unwrap();
        (station, driver, notifier, http)
    }

    async fn settle() {
        time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_started_triggers_scan() {
        let (_station, driver, notifier, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        settle().await;

        assert_eq!(driver.scan_count().await, 1);
        assert_eq!(notifier.events(), vec!["scan_begin".to_string()]);
    }

    #[tokio::test]
    async fn test_connects_to_strongest_known_candidate() {
        let (station, driver, notifier, _) = start_station(
            vec![known("Far", "a", None), known("Near", "b", None)],
            fast_settings(),
        )
        .await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![
                ap("Far", -80, AuthMode::Wpa2Personal),
                ap("Unknown", -30, AuthMode::Open),
                ap("Near", -45, AuthMode::Wpa2Personal),
            ]))
            .await;
        settle().await;

        assert_eq!(driver.connect_ssids().await, vec!["Near".to_string()]);
        assert!(notifier.events().contains(&"connecting:Near".to_string()));
        assert_eq!(station.status().state, StationState::Connecting);
    }

    #[tokio::test]
    async fn test_retry_bound_then_next_candidate() {
        let (_station, driver, _, _) = start_station(
            vec![known("Primary", "a", None), known("Backup", "b", None)],
            fast_settings(),
        )
        .await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![
                ap("Primary", -40, AuthMode::Wpa2Personal),
                ap("Backup", -70, AuthMode::Wpa2Personal),
            ]))
            .await;
        for _ in 0..6 {
            driver.emit(RadioEvent::Disconnected).await;
        }
        settle().await;

        // Initial attempt plus exactly 5 same-candidate retries, then the
        // 6th disconnect advances to the weaker candidate
        let ssids = driver.connect_ssids().await;
        assert_eq!(
            ssids,
            vec!["Primary"; 6]
                .into_iter()
                .map(str::to_owned)
                .chain(std::iter::once("Backup".to_string()))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_ip_acquired_marks_connected_and_clears_queue() {
        let (station, driver, notifier, _) = start_station(
            vec![known("Primary", "a", None), known("Backup", "b", None)],
            fast_settings(),
        )
        .await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![
                ap("Primary", -40, AuthMode::Wpa2Personal),
                ap("Backup", -70, AuthMode::Wpa2Personal),
            ]))
            .await;
        driver
            .emit(RadioEvent::IpAcquired {
                ip: Ipv4Addr::new(10, 0, 0, 5),
                gateway: Some(Ipv4Addr::new(10, 0, 0, 1)),
            })
            .await;
        settle().await;

        let status = station.status();
        assert_eq!(status.state, StationState::Connected);
        assert_eq!(status.ssid, Some("Primary".to_string()));
        assert_eq!(status.ip_address, Some("10.0.0.5".to_string()));
        assert!(status.rssi.is_some());
        assert!(status.channel.is_some());
        assert!(notifier.events().contains(&"connected:Primary".to_string()));

        // The queue was cleared on success: exhausting the retry budget
        // afterwards must rescan instead of falling back to Backup
        let scans_before = driver.scan_count().await;
        for _ in 0..7 {
            driver.emit(RadioEvent::Disconnected).await;
        }
        settle().await;

        let ssids = driver.connect_ssids().await;
        assert!(!ssids.contains(&"Backup".to_string()));
        assert_eq!(ssids.iter().filter(|s| *s == "Primary").count(), 6);
        assert!(driver.scan_count().await > scans_before);
        assert!(notifier.events().contains(&"disconnected".to_string()));
    }

    #[tokio::test]
    async fn test_disconnected_notification_fires_once_per_join() {
        let (_station, driver, notifier, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![ap(
                "Home",
                -50,
                AuthMode::Wpa2Personal,
            )]))
            .await;
        driver
            .emit(RadioEvent::IpAcquired {
                ip: Ipv4Addr::new(192, 168, 1, 50),
                gateway: None,
            })
            .await;
        driver.emit(RadioEvent::Disconnected).await;
        driver.emit(RadioEvent::Disconnected).await;
        settle().await;

        let events = notifier.events();
        assert_eq!(
            events.iter().filter(|e| *e == "disconnected").count(),
            1,
            "events: {events:?}"
        );
    }

    #[tokio::test]
    async fn test_empty_scan_schedules_rescan() {
        let (_station, driver, notifier, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        driver.emit(RadioEvent::ScanDone(Vec::new())).await;
        settle().await;

        // Zero-length backoff in tests: the rescan timer fires immediately
        assert!(driver.scan_count().await >= 2);
        assert!(
            notifier
                .events()
                .iter()
                .filter(|e| *e == "scan_begin")
                .count()
                >= 2
        );
    }

    #[tokio::test]
    async fn test_unmatched_scan_results_schedule_rescan() {
        let (_station, driver, _, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![ap(
                "SomeoneElse",
                -30,
                AuthMode::Open,
            )]))
            .await;
        settle().await;

        assert!(driver.connect_ssids().await.is_empty());
        assert!(driver.scan_count().await >= 2);
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_ignored() {
        let (station, driver, notifier, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        driver.emit(RadioEvent::Disconnected).await;
        settle().await;

        assert!(driver.connect_ssids().await.is_empty());
        assert!(!station.is_connected());
        assert!(!notifier.events().contains(&"disconnected".to_string()));
    }

    #[tokio::test]
    async fn test_portal_login_spawned_for_portal_candidate() {
        let (_station, driver, _, http) = start_station(
            vec![known("CafeWifi", "", Some("guest"))],
            fast_settings(),
        )
        .await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![ap("CafeWifi", -50, AuthMode::Open)]))
            .await;
        driver
            .emit(RadioEvent::IpAcquired {
                ip: Ipv4Addr::new(172, 16, 4, 9),
                gateway: Some(Ipv4Addr::new(172, 16, 4, 1)),
            })
            .await;
        settle().await;

        assert!(
            !http.probes().is_empty(),
            "portal engine should have started probing"
        );
    }

    #[tokio::test]
    async fn test_portal_login_not_spawned_for_enterprise() {
        let (_station, driver, _, http) = start_station(
            vec![known("Campus", "pw", Some("student"))],
            fast_settings(),
        )
        .await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![ap(
                "Campus",
                -50,
                AuthMode::Wpa2Enterprise,
            )]))
            .await;
        driver
            .emit(RadioEvent::IpAcquired {
                ip: Ipv4Addr::new(10, 1, 2, 3),
                gateway: None,
            })
            .await;
        settle().await;

        assert!(http.probes().is_empty());
    }

    #[tokio::test]
    async fn test_portal_login_not_spawned_without_username() {
        let (_station, driver, _, http) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![ap(
                "Home",
                -50,
                AuthMode::Wpa2Personal,
            )]))
            .await;
        driver
            .emit(RadioEvent::IpAcquired {
                ip: Ipv4Addr::new(10, 1, 2, 3),
                gateway: None,
            })
            .await;
        settle().await;

        assert!(http.probes().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_connected_success() {
        let (station, driver, _, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        driver
            .emit(RadioEvent::ScanDone(vec![ap(
                "Home",
                -50,
                AuthMode::Wpa2Personal,
            )]))
            .await;
        driver
            .emit(RadioEvent::IpAcquired {
                ip: Ipv4Addr::new(192, 168, 1, 7),
                gateway: None,
            })
            .await;

        assert!(station.wait_for_connected(Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_wait_for_connected_times_out() {
        let (station, _driver, _, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        assert!(!station.wait_for_connected(Duration::from_millis(30)).await);
    }

    #[tokio::test]
    async fn test_stop_disconnects_and_suppresses_events() {
        let (station, driver, _, _) =
            start_station(vec![known("Home", "pw", None)], fast_settings()).await;

        driver.emit(RadioEvent::Started).await;
        settle().await;
        station.stop().await;

        let commands = driver.commands().await;
        assert!(commands.contains(&MockCommand::Disconnect));

        // The worker is gone; further events must not produce commands
        let before = driver.commands().await.len();
        driver.emit(RadioEvent::Started).await;
        settle().await;
        assert_eq!(driver.commands().await.len(), before);
    }

    #[tokio::test]
    async fn test_start_applies_power_configuration() {
        let settings = Settings {
            max_tx_power: 17,
            ..fast_settings()
        };
        let (_station, driver, _, _) = start_station(vec![], settings).await;

        let commands = driver.commands().await;
        assert!(commands.contains(&MockCommand::PowerSave(
            crate::core::types::PowerSaveLevel::Balanced
        )));
        assert!(commands.contains(&MockCommand::MaxTxPower(17)));
    }

    #[test]
    fn test_backoff_doubles_and_clamps() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(60));
        assert_eq!(backoff.current(), Duration::from_secs(10));
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_secs(20));
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_secs(40));
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_secs(60));
        backoff.advance();
        assert_eq!(backoff.current(), Duration::from_secs(60));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_never_decreases_without_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        let mut previous = backoff.current();
        for _ in 0..12 {
            backoff.advance();
            assert!(backoff.current() >= previous);
            assert!(backoff.current() <= Duration::from_secs(300));
            previous = backoff.current();
        }
    }

    #[test]
    fn test_backoff_inverted_range_is_clamped() {
        let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(backoff.current(), Duration::from_secs(60));
    }
}
