//! Install Monitor
//!
//! Long-running process of the installation orchestration core:
//! - elects a leader among replicas through a Kubernetes Lease
//! - refreshes every live host and cluster on fixed intervals
//! - serves Prometheus metrics and health probes

mod backoff;
mod controller;
mod error;
mod leader;
mod server;

use crate::error::ControllerError;
use controller::{Controller, Settings};
use install_core::Config;
use std::env;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LEASE_NAME: &str = "install-monitor";

fn settings_from_env() -> Result<Settings, ControllerError> {
    let namespace = env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let pod_name = env::var("POD_NAME").ok();
    let lease_name = env::var("LEASE_NAME").unwrap_or_else(|_| DEFAULT_LEASE_NAME.to_string());
    let metrics_addr: SocketAddr = env::var("METRICS_ADDR")
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("METRICS_ADDR: {e}")))?;
    let leader_election = match env::var("LEADER_ELECTION_ENABLED") {
        Ok(raw) => raw
            .trim()
            .parse::<bool>()
            .map_err(|e| ControllerError::InvalidConfig(format!("LEADER_ELECTION_ENABLED: {e}")))?,
        Err(_) => true,
    };
    Ok(Settings {
        namespace,
        pod_name,
        lease_name,
        metrics_addr,
        leader_election,
    })
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Install Monitor");

    // Load configuration from environment variables
    let config = Config::from_env()?;
    let settings = settings_from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", settings.namespace);
    info!(
        "  Leader election: {}",
        if settings.leader_election { settings.lease_name.as_str() } else { "disabled" }
    );
    info!("  Metrics address: {}", settings.metrics_addr);
    info!(
        "  Monitor intervals: hosts {:?}, clusters {:?}, batch size {}",
        config.host_monitor_interval, config.cluster_monitor_interval, config.monitor_batch_size
    );

    // Initialize and run controller
    let controller = Controller::new(config, settings).await?;
    controller.run().await?;

    Ok(())
}
