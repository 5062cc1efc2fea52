//! Test doubles for the collaborator seams.
//!
//! Available to unit tests and, through the `test-util` feature, to
//! integration tests and downstream crates.

use crate::error::{CoreError, Result};
use crate::events::{Event, EventSink, Severity};
use crate::leader::LeaderElector;
use crate::metrics::MetricsSink;
use crate::models::{Cluster, ClusterStatus, Host, HostStatus};
use crate::store::{ClusterChanges, HostChanges, MemoryStore, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages of the events recorded for `entity_id`
    pub fn messages_for(&self, entity_id: Uuid) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.entity_id == entity_id)
            .map(|e| e.message)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn add_event(&self, entity_id: Uuid, cluster_id: Option<Uuid>, severity: Severity, message: &str, time: DateTime<Utc>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event {
                entity_id,
                cluster_id,
                severity,
                message: message.to_string(),
                time,
            });
    }
}

/// One recorded metric call
#[derive(Debug, Clone, PartialEq)]
pub enum MetricCall {
    MonitorPass { entity: String, monitored: usize },
    MonitorFailure { entity: String },
    ValidationFailed { entity: String, validation: String },
    HostStageFinished { stage: String, duration: Duration },
    ClusterInstallationFinished { result: String },
}

/// Keeps every metric call in memory
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    calls: Mutex<Vec<MetricCall>>,
}

impl RecordingMetrics {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far
    pub fn calls(&self) -> Vec<MetricCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, call: MetricCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

impl MetricsSink for RecordingMetrics {
    fn monitor_pass(&self, entity: &str, _duration: Duration, monitored: usize) {
        self.record(MetricCall::MonitorPass {
            entity: entity.to_string(),
            monitored,
        });
    }

    fn monitor_failure(&self, entity: &str) {
        self.record(MetricCall::MonitorFailure {
            entity: entity.to_string(),
        });
    }

    fn validation_failed(&self, entity: &str, validation: &str) {
        self.record(MetricCall::ValidationFailed {
            entity: entity.to_string(),
            validation: validation.to_string(),
        });
    }

    fn host_stage_finished(&self, stage: &str, duration: Duration) {
        self.record(MetricCall::HostStageFinished {
            stage: stage.to_string(),
            duration,
        });
    }

    fn cluster_installation_finished(&self, result: &str) {
        self.record(MetricCall::ClusterInstallationFinished {
            result: result.to_string(),
        });
    }
}

/// Leader elector whose answer is flipped by the test
#[derive(Debug)]
pub struct ToggleLeader {
    leader: AtomicBool,
    remaining: AtomicUsize,
}

impl ToggleLeader {
    /// Elector starting with the given answer
    #[must_use]
    pub fn new(leader: bool) -> Self {
        Self {
            leader: AtomicBool::new(leader),
            remaining: AtomicUsize::new(usize::MAX),
        }
    }

    /// Changes the answer
    pub fn set(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    /// Answers `true` for the next `checks` calls, then loses leadership
    pub fn lose_after(&self, checks: usize) {
        self.remaining.store(checks, Ordering::SeqCst);
    }
}

impl LeaderElector for ToggleLeader {
    fn is_leader(&self) -> bool {
        let counted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                usize::MAX | 0 => None,
                n => Some(n - 1),
            });
        if counted == Err(0) {
            self.leader.store(false, Ordering::SeqCst);
        }
        self.leader.load(Ordering::SeqCst)
    }
}

/// Memory store that fails on selected rows
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    hosts: Mutex<BTreeSet<Uuid>>,
    clusters: Mutex<BTreeSet<Uuid>>,
    listing: AtomicBool,
}

impl FailingStore {
    /// Wraps `inner`
    #[must_use]
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Store being wrapped
    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Every read or write of host `id` fails from now on
    pub fn fail_host(&self, id: Uuid) {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
    }

    /// Every read or write of cluster `id` fails from now on
    pub fn fail_cluster(&self, id: Uuid) {
        self.clusters.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
    }

    /// Makes listing by status fail or succeed
    pub fn fail_listing(&self, fail: bool) {
        self.listing.store(fail, Ordering::SeqCst);
    }

    fn check_host(&self, id: Uuid) -> Result<()> {
        if self.hosts.lock().unwrap_or_else(PoisonError::into_inner).contains(&id) {
            return Err(CoreError::Store(format!("injected failure for host {id}")));
        }
        Ok(())
    }

    fn check_cluster(&self, id: Uuid) -> Result<()> {
        if self.clusters.lock().unwrap_or_else(PoisonError::into_inner).contains(&id) {
            return Err(CoreError::Store(format!("injected failure for cluster {id}")));
        }
        Ok(())
    }

    fn check_listing(&self) -> Result<()> {
        if self.listing.load(Ordering::SeqCst) {
            return Err(CoreError::Store("injected listing failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn get_host(&self, id: Uuid) -> Result<Host> {
        self.check_host(id)?;
        self.inner.get_host(id).await
    }

    async fn get_cluster(&self, id: Uuid) -> Result<Cluster> {
        self.check_cluster(id)?;
        self.inner.get_cluster(id).await
    }

    async fn list_cluster_hosts(&self, cluster_id: Uuid) -> Result<Vec<Host>> {
        self.check_cluster(cluster_id)?;
        self.inner.list_cluster_hosts(cluster_id).await
    }

    async fn create_host(&self, host: Host) -> Result<()> {
        self.check_host(host.id)?;
        self.inner.create_host(host).await
    }

    async fn create_cluster(&self, cluster: Cluster) -> Result<()> {
        self.check_cluster(cluster.id)?;
        self.inner.create_cluster(cluster).await
    }

    async fn delete_host(&self, id: Uuid) -> Result<()> {
        self.check_host(id)?;
        self.inner.delete_host(id).await
    }

    async fn delete_cluster(&self, id: Uuid) -> Result<()> {
        self.check_cluster(id)?;
        self.inner.delete_cluster(id).await
    }

    async fn update_host(&self, id: Uuid, expected_status: Option<HostStatus>, changes: HostChanges) -> Result<u64> {
        self.check_host(id)?;
        self.inner.update_host(id, expected_status, changes).await
    }

    async fn update_cluster(
        &self,
        id: Uuid,
        expected_status: Option<ClusterStatus>,
        changes: ClusterChanges,
    ) -> Result<u64> {
        self.check_cluster(id)?;
        self.inner.update_cluster(id, expected_status, changes).await
    }

    async fn list_hosts_by_status(&self, statuses: &[HostStatus], limit: usize, offset: usize) -> Result<Vec<Host>> {
        self.check_listing()?;
        self.inner.list_hosts_by_status(statuses, limit, offset).await
    }

    async fn list_clusters_by_status(
        &self,
        statuses: &[ClusterStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Cluster>> {
        self.check_listing()?;
        self.inner.list_clusters_by_status(statuses, limit, offset).await
    }
}
