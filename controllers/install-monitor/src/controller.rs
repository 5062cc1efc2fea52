//! Main controller implementation.
//!
//! Wires the orchestration core together and runs the background tasks:
//! the host and cluster monitor loops, lease renewal and the metrics / probe
//! server. The process exits as soon as any of them stops.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::leader::LeaseElector;
use crate::server::{self, ServerState};
use chrono::{DateTime, Utc};
use install_core::{
    AlwaysLeader, BuiltinOperatorsValidator, ClusterManager, ClusterValidator, Config, CoreError,
    DefaultConnectivityValidator, DefaultHardwareValidator, HardwareValidator, HostManager, HostValidator,
    LeaderElector, MemoryStore, Monitor, MonitorReport, PrometheusMetrics, Store, TracingEventSink,
};
use k8s_openapi::api::coordination::v1::Lease;
use kube::{Api, Client};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Longest wait between retries of a failing monitor pass
const MAX_PASS_BACKOFF: Duration = Duration::from_secs(120);

/// Process settings that do not belong to the orchestration core
#[derive(Debug, Clone)]
pub struct Settings {
    /// Namespace of the leader lease
    pub namespace: String,
    /// Identity in leader election
    pub pod_name: Option<String>,
    /// Name of the leader lease
    pub lease_name: String,
    /// Listen address of `/metrics`, `/healthz` and `/readyz`
    pub metrics_addr: SocketAddr,
    /// Compete for the lease; when off this replica always monitors
    pub leader_election: bool,
}

/// One of the two periodic monitor passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorPass {
    Hosts,
    Clusters,
}

impl MonitorPass {
    fn name(self) -> &'static str {
        match self {
            Self::Hosts => "host",
            Self::Clusters => "cluster",
        }
    }

    async fn run(self, monitor: &Monitor, now: DateTime<Utc>) -> Result<MonitorReport, CoreError> {
        match self {
            Self::Hosts => monitor.host_monitoring(now).await,
            Self::Clusters => monitor.cluster_monitoring(now).await,
        }
    }
}

/// Wait before the next pass: the regular interval after a pass that ran,
/// a growing backoff while passes keep failing
fn next_delay(
    pass: MonitorPass,
    outcome: &Result<MonitorReport, CoreError>,
    interval: Duration,
    backoff: &mut FibonacciBackoff,
) -> Duration {
    match outcome {
        Ok(report) => {
            backoff.reset();
            if report.interrupted {
                info!("{} monitoring interrupted by leadership loss", pass.name());
            }
            debug!(
                "{} monitoring: {} refreshed, {} failed",
                pass.name(),
                report.monitored,
                report.failed
            );
            interval
        }
        Err(e) => {
            let delay = backoff.next_backoff();
            error!("{} monitoring failed, retrying in {:?}: {}", pass.name(), delay, e);
            delay
        }
    }
}

async fn monitor_loop(pass: MonitorPass, monitor: Arc<Monitor>, interval: Duration) -> Result<(), ControllerError> {
    info!("Starting {} monitor every {:?}", pass.name(), interval);
    let mut backoff = FibonacciBackoff::new(interval, MAX_PASS_BACKOFF.max(interval));
    loop {
        let outcome = pass.run(&monitor, Utc::now()).await;
        let delay = next_delay(pass, &outcome, interval, &mut backoff);
        tokio::time::sleep(delay).await;
    }
}

fn finished(task: &str, result: Result<Result<(), ControllerError>, tokio::task::JoinError>) -> Result<(), ControllerError> {
    match result {
        Err(e) => Err(ControllerError::Task(format!("{task} panicked: {e}"))),
        Ok(Err(e)) => Err(e),
        Ok(Ok(())) => Err(ControllerError::Task(format!("{task} exited"))),
    }
}

/// Main controller for installation monitoring.
#[derive(Debug)]
pub struct Controller {
    config: Arc<Config>,
    monitor: Arc<Monitor>,
    elector: Option<Arc<LeaseElector>>,
    server: ServerState,
    metrics_addr: SocketAddr,
    ready: Arc<AtomicBool>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config, settings: Settings) -> Result<Self, ControllerError> {
        info!("Initializing install monitor");
        let config = Arc::new(config);
        let metrics = Arc::new(PrometheusMetrics::new()?);
        let events = Arc::new(TracingEventSink);
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        let hardware: Arc<dyn HardwareValidator> = Arc::new(DefaultHardwareValidator::new(config.hardware));
        let operators = Arc::new(BuiltinOperatorsValidator::new(Arc::clone(&hardware)));
        let hosts = Arc::new(HostManager::new(
            Arc::clone(&config),
            Arc::clone(&store),
            HostValidator::new(
                Arc::clone(&config),
                hardware,
                Arc::new(DefaultConnectivityValidator),
                operators.clone(),
            ),
            events.clone(),
            metrics.clone(),
        ));
        let clusters = Arc::new(ClusterManager::new(
            Arc::clone(&config),
            Arc::clone(&store),
            ClusterValidator::new(operators),
            events,
            metrics.clone(),
        ));

        let (leader, elector): (Arc<dyn LeaderElector>, Option<Arc<LeaseElector>>) = if settings.leader_election {
            let identity = settings.pod_name.ok_or_else(|| {
                ControllerError::InvalidConfig(
                    "POD_NAME environment variable is required when leader election is enabled".to_string(),
                )
            })?;
            let client = Client::try_default().await?;
            let api: Api<Lease> = Api::namespaced(client, &settings.namespace);
            let elector = Arc::new(LeaseElector::new(api, settings.lease_name, identity));
            let leader: Arc<dyn LeaderElector> = elector.clone();
            (leader, Some(elector))
        } else {
            warn!("Leader election disabled; this replica always runs the monitor");
            let leader: Arc<dyn LeaderElector> = Arc::new(AlwaysLeader);
            (leader, None)
        };

        let ready = Arc::new(AtomicBool::new(false));
        let server = ServerState::new(metrics.registry().clone(), Arc::clone(&ready));
        let monitor = Arc::new(Monitor::new(store, hosts, clusters, leader, metrics));
        Ok(Self {
            config,
            monitor,
            elector,
            server,
            metrics_addr: settings.metrics_addr,
            ready,
        })
    }

    /// Runs until one of the background tasks stops
    pub async fn run(self) -> Result<(), ControllerError> {
        let mut host_monitor: JoinHandle<Result<(), ControllerError>> = tokio::spawn(monitor_loop(
            MonitorPass::Hosts,
            Arc::clone(&self.monitor),
            self.config.host_monitor_interval,
        ));
        let mut cluster_monitor: JoinHandle<Result<(), ControllerError>> = tokio::spawn(monitor_loop(
            MonitorPass::Clusters,
            Arc::clone(&self.monitor),
            self.config.cluster_monitor_interval,
        ));
        let mut election: JoinHandle<Result<(), ControllerError>> = match self.elector {
            Some(elector) => tokio::spawn(async move { elector.run().await }),
            None => tokio::spawn(std::future::pending()),
        };
        let mut server: JoinHandle<Result<(), ControllerError>> =
            tokio::spawn(server::serve(self.metrics_addr, self.server));

        self.ready.store(true, Ordering::Release);
        info!("Install monitor running");

        tokio::select! {
            result = &mut host_monitor => finished("host monitor", result),
            result = &mut cluster_monitor => finished("cluster monitor", result),
            result = &mut election => finished("leader election", result),
            result = &mut server => finished("metrics server", result),
        }
    }
}
