//! Periodic refresh of active hosts and clusters.
//!
//! A pass walks the active entities in pages of `monitor_batch_size`,
//! re-checking leadership before every page. Each entity is refreshed from
//! freshly loaded rows; a failing entity is logged, counted and skipped so
//! the rest of the pass still runs. Only a failed listing query ends the
//! pass early.

use crate::cluster::ClusterManager;
use crate::error::{CoreError, Result};
use crate::host::HostManager;
use crate::leader::LeaderElector;
use crate::metrics::MetricsSink;
use crate::models::{ClusterStatus, HostStatus};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Host statuses the monitor refreshes
pub const MONITORED_HOST_STATUSES: &[HostStatus] = &[
    HostStatus::Discovering,
    HostStatus::Known,
    HostStatus::Disconnected,
    HostStatus::Insufficient,
    HostStatus::PendingForInput,
    HostStatus::PreparingForInstallation,
    HostStatus::PreparingSuccessful,
    HostStatus::Installing,
    HostStatus::InstallingInProgress,
    HostStatus::Error,
    HostStatus::Cancelled,
    HostStatus::DiscoveringUnbound,
    HostStatus::KnownUnbound,
    HostStatus::DisconnectedUnbound,
    HostStatus::InsufficientUnbound,
];

/// Cluster statuses the monitor refreshes
pub const MONITORED_CLUSTER_STATUSES: &[ClusterStatus] = &[
    ClusterStatus::Insufficient,
    ClusterStatus::Ready,
    ClusterStatus::PendingForInput,
    ClusterStatus::PreparingForInstallation,
    ClusterStatus::Installing,
    ClusterStatus::InstallingPendingUserAction,
    ClusterStatus::Finalizing,
    ClusterStatus::Error,
    ClusterStatus::Cancelled,
    ClusterStatus::Installed,
];

/// Outcome of one monitor pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// Entities refreshed, failed ones included
    pub monitored: usize,
    /// Entities whose refresh failed
    pub failed: usize,
    /// Leadership was lost before the pass finished
    pub interrupted: bool,
}

/// Runs the host and cluster monitor passes
#[derive(Clone)]
pub struct Monitor {
    store: Arc<dyn Store>,
    hosts: Arc<HostManager>,
    clusters: Arc<ClusterManager>,
    leader: Arc<dyn LeaderElector>,
    metrics: Arc<dyn MetricsSink>,
    batch_size: usize,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Creates a monitor; the page size comes from the cluster manager's config
    pub fn new(
        store: Arc<dyn Store>,
        hosts: Arc<HostManager>,
        clusters: Arc<ClusterManager>,
        leader: Arc<dyn LeaderElector>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let batch_size = clusters.config().monitor_batch_size.max(1);
        Self {
            store,
            hosts,
            clusters,
            leader,
            metrics,
            batch_size,
        }
    }

    /// Refreshes every monitored host
    pub async fn host_monitoring(&self, now: DateTime<Utc>) -> Result<MonitorReport> {
        let store = Arc::clone(&self.store);
        let hosts = Arc::clone(&self.hosts);
        self.pass(
            "host",
            |limit, offset| {
                let store = Arc::clone(&store);
                async move { store.list_hosts_by_status(MONITORED_HOST_STATUSES, limit, offset).await }
            },
            |host| host.id,
            |host| {
                let hosts = Arc::clone(&hosts);
                async move { hosts.refresh_status(host.id, now).await.map(|_| ()) }
            },
        )
        .await
    }

    /// Refreshes every monitored cluster
    pub async fn cluster_monitoring(&self, now: DateTime<Utc>) -> Result<MonitorReport> {
        let store = Arc::clone(&self.store);
        let clusters = Arc::clone(&self.clusters);
        self.pass(
            "cluster",
            |limit, offset| {
                let store = Arc::clone(&store);
                async move {
                    store
                        .list_clusters_by_status(MONITORED_CLUSTER_STATUSES, limit, offset)
                        .await
                }
            },
            |cluster| cluster.id,
            |cluster| {
                let clusters = Arc::clone(&clusters);
                async move { clusters.refresh_status(cluster.id, now).await.map(|_| ()) }
            },
        )
        .await
    }

    /// Pages through `list`, handing each row to `refresh`.
    ///
    /// Rows are reloaded by ID inside `refresh` so the transition sees the
    /// latest data, not the page snapshot.
    async fn pass<T, L, LF, R, RF>(
        &self,
        entity: &'static str,
        list: L,
        id_of: impl Fn(&T) -> Uuid,
        refresh: R,
    ) -> Result<MonitorReport>
    where
        L: Fn(usize, usize) -> LF,
        LF: Future<Output = Result<Vec<T>>>,
        R: Fn(T) -> RF,
        RF: Future<Output = Result<()>>,
    {
        if !self.leader.is_leader() {
            debug!("Not the leader, skipping {entity} monitoring");
            return Ok(MonitorReport::default());
        }

        let started = Instant::now();
        let mut report = MonitorReport::default();
        let mut offset = 0;
        loop {
            if !self.leader.is_leader() {
                info!("Leadership lost, stopping {entity} monitoring after {} entities", report.monitored);
                report.interrupted = true;
                break;
            }

            let page = list(self.batch_size, offset).await.map_err(|e| {
                error!("Failed to list {entity}s for monitoring: {e}");
                e
            })?;
            let fetched = page.len();
            for row in page {
                let id = id_of(&row);
                report.monitored += 1;
                if let Err(e) = refresh(row).await {
                    report.failed += 1;
                    self.record_failure(entity, id, &e);
                }
            }

            if fetched < self.batch_size {
                break;
            }
            offset += fetched;
        }

        self.metrics.monitor_pass(entity, started.elapsed(), report.monitored);
        debug!(
            "Monitored {} {entity}s ({} failed) in {:?}",
            report.monitored,
            report.failed,
            started.elapsed()
        );
        Ok(report)
    }

    fn record_failure(&self, entity: &str, id: Uuid, e: &CoreError) {
        self.metrics.monitor_failure(entity);
        if e.is_transient() {
            warn!("Failed to refresh {entity} {id}, retrying next pass: {e}");
        } else {
            error!("Failed to refresh {entity} {id}: {e}");
        }
    }
}
