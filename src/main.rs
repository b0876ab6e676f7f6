//! WiFi Station Service - Main Entry Point

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifi_station_service::{
    backend::WifiCtrlDriver,
    config::{CliArgs, Settings},
    core::{portal::HttpProbe, station::Station},
    store::{CredentialStore, FileStore},
    TracingNotifier,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wifi_station_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(?args, "Starting WiFi station service");

    let settings = Settings::load(Path::new(&args.settings));
    info!(?settings, "Settings loaded");

    let store = Arc::new(FileStore::load(Path::new(&args.networks))?);
    info!(
        networks = store.list_known_networks().len(),
        "Credential store loaded"
    );

    let (driver, events) = WifiCtrlDriver::new(&args.interface).await?;
    info!("Radio driver initialized for interface: {}", args.interface);

    let station = Station::start(
        Arc::new(driver),
        events,
        store,
        Arc::new(TracingNotifier),
        Arc::new(HttpProbe::new()?),
        settings,
    )
    .await?;
    info!("Station manager started");

    if let Some(seconds) = args.wait_connected {
        if station
            .wait_for_connected(Duration::from_secs(seconds))
            .await
        {
            info!(
                ssid = ?station.current_ssid(),
                ip = ?station.ip_address(),
                "Initial connection established"
            );
        } else {
            warn!(seconds, "Not connected within the startup window, continuing in background");
        }
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
    }

    station.stop().await;
    info!("Shut down");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
