//! Error types for the WiFi station service

use thiserror::Error;

/// Result type for radio driver operations
pub type RadioResult<T> = Result<T, RadioError>;

/// Result type for station construction and control
pub type StationResult<T> = Result<T, StationError>;

/// Result type for captive portal probes and login
pub type PortalResult<T> = Result<T, PortalError>;

/// Result type for credential store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a radio driver
#[derive(Error, Debug, Clone)]
pub enum RadioError {
    #[error("scan request failed: {0}")]
    ScanFailed(String),

    #[error("connect command failed: {0}")]
    ConnectFailed(String),

    #[error("driver command failed: {0}")]
    CommandFailed(String),

    #[error("driver does not support {0}")]
    Unsupported(&'static str),
}

/// Fatal errors raised while constructing or configuring the station
///
/// A driver rejecting its configuration is a contract violation, not an
/// environmental condition, so it surfaces here instead of being retried.
#[derive(Error, Debug)]
pub enum StationError {
    #[error("radio driver error: {0}")]
    Radio(#[from] RadioError),

    #[error("invalid station configuration: {0}")]
    InvalidConfig(String),
}

/// Non-fatal transport failures inside the captive portal engine
///
/// These abort at most the current detection strategy or login attempt.
#[derive(Error, Debug, Clone)]
pub enum PortalError {
    #[error("probe transport error: {0}")]
    Transport(String),

    #[error("name resolution failed for {0}")]
    Resolve(String),
}

/// Errors related to the credential and settings files
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
