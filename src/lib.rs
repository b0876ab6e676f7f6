//! WiFi Station Service
//!
//! Keeps a device associated with the best reachable known network:
//! - scans and ranks access points against a credential store
//! - connects with bounded retry and exponential rescan backoff
//! - detects captive portals after joining and logs in automatically

pub mod backend;
pub mod config;
pub mod core;
pub mod store;

pub use self::core::{
    error::{PortalError, RadioError, StationError, StoreError},
    notifier::{EventNotifier, NullNotifier, TracingNotifier},
    portal::{HttpProbe, PortalOutcome, PortalPolicy, PortalSession},
    station::Station,
    types::{AuthMode, Candidate, ScanResult, StationState, StationStatus},
};
