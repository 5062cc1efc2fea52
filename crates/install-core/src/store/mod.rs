//! Persistence adapter.
//!
//! Every status write is a compare-and-swap on the row's current status:
//! `update_host(id, Some(expected), changes)` only applies when the stored
//! status still equals `expected` and reports the number of rows touched.
//! Zero rows is not an error at this level; callers turn it into
//! `CoreError::GuardedUpdateConflict` through `expect_updated`.

mod memory;

pub use memory::MemoryStore;

use crate::error::{CoreError, Result};
use crate::models::{
    Cluster, ClusterProgress, ClusterStatus, DiskSpeed, Host, HostKind, HostProgress, HostRole, HostStatus,
    ImageAvailability, LogsState, MediaStatus, MonitoredOperator, NtpSource, PreparationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Field changes applied to a host row; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostChanges {
    pub status: Option<HostStatus>,
    pub status_info: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub cluster_id: Option<Option<Uuid>>,
    pub kind: Option<HostKind>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub role: Option<HostRole>,
    pub suggested_role: Option<HostRole>,
    pub bootstrap: Option<bool>,
    pub requested_hostname: Option<Option<String>>,
    pub inventory: Option<Option<String>>,
    pub installation_disk_path: Option<Option<String>>,
    pub disk_speed: Option<Option<DiskSpeed>>,
    pub validations_info: Option<Option<String>>,
    pub progress: Option<HostProgress>,
    pub media_status: Option<Option<MediaStatus>>,
    pub ntp_sources: Option<Vec<NtpSource>>,
    pub images_status: Option<BTreeMap<String, ImageAvailability>>,
    pub api_vip_connectivity: Option<Option<bool>>,
    pub logs_info: Option<LogsState>,
    pub logs_started_at: Option<Option<DateTime<Utc>>>,
    pub logs_collected_at: Option<Option<DateTime<Utc>>>,
    pub discovery_agent_version: Option<Option<String>>,
}

impl HostChanges {
    /// Status change with its explanation
    #[must_use]
    pub fn status(status: HostStatus, info: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            status_info: Some(info.into()),
            ..Self::default()
        }
    }

    /// Writes the changes into `host`
    pub fn apply(self, host: &mut Host) {
        macro_rules! set {
            ($($field:ident),+) => {
                $(if let Some(value) = self.$field { host.$field = value; })+
            };
        }
        set!(
            status,
            status_info,
            status_updated_at,
            cluster_id,
            kind,
            role,
            suggested_role,
            bootstrap,
            requested_hostname,
            inventory,
            installation_disk_path,
            disk_speed,
            validations_info,
            progress,
            media_status,
            ntp_sources,
            images_status,
            api_vip_connectivity,
            logs_info,
            logs_started_at,
            logs_collected_at,
            discovery_agent_version
        );
        if let Some(at) = self.checked_in_at {
            host.checked_in_at = Some(at);
        }
    }
}

/// Field changes applied to a cluster row; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterChanges {
    pub status: Option<ClusterStatus>,
    pub status_info: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub progress: Option<ClusterProgress>,
    pub install_started_at: Option<Option<DateTime<Utc>>>,
    pub install_completed_at: Option<Option<DateTime<Utc>>>,
    pub installation_preparation_completion_status: Option<PreparationStatus>,
    pub logs_info: Option<LogsState>,
    pub controller_logs_started_at: Option<Option<DateTime<Utc>>>,
    pub controller_logs_collected_at: Option<Option<DateTime<Utc>>>,
    pub validations_info: Option<Option<String>>,
    pub monitored_operators: Option<Vec<MonitoredOperator>>,
    pub machine_networks: Option<Vec<String>>,
    pub api_vips: Option<Vec<String>>,
    pub ingress_vips: Option<Vec<String>>,
    pub connectivity_majority_groups: Option<BTreeMap<String, Vec<Uuid>>>,
}

impl ClusterChanges {
    /// Status change with its explanation
    #[must_use]
    pub fn status(status: ClusterStatus, info: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            status_info: Some(info.into()),
            ..Self::default()
        }
    }

    /// Writes the changes into `cluster`
    pub fn apply(self, cluster: &mut Cluster) {
        macro_rules! set {
            ($($field:ident),+) => {
                $(if let Some(value) = self.$field { cluster.$field = value; })+
            };
        }
        set!(
            status,
            status_info,
            status_updated_at,
            progress,
            install_started_at,
            install_completed_at,
            installation_preparation_completion_status,
            logs_info,
            controller_logs_started_at,
            controller_logs_collected_at,
            validations_info,
            monitored_operators,
            machine_networks,
            api_vips,
            ingress_vips,
            connectivity_majority_groups
        );
    }
}

/// Storage the core runs against
#[async_trait]
pub trait Store: Send + Sync {
    /// Loads a host; `NotFound` when absent
    async fn get_host(&self, id: Uuid) -> Result<Host>;

    /// Loads a cluster; `NotFound` when absent
    async fn get_cluster(&self, id: Uuid) -> Result<Cluster>;

    /// Hosts bound to a cluster, ordered by ID
    async fn list_cluster_hosts(&self, cluster_id: Uuid) -> Result<Vec<Host>>;

    /// Inserts a host; `InvalidArgument` if the ID exists
    async fn create_host(&self, host: Host) -> Result<()>;

    /// Inserts a cluster; `InvalidArgument` if the ID exists
    async fn create_cluster(&self, cluster: Cluster) -> Result<()>;

    /// Removes a host; `NotFound` when absent
    async fn delete_host(&self, id: Uuid) -> Result<()>;

    /// Removes a cluster and its hosts; `NotFound` when absent
    async fn delete_cluster(&self, id: Uuid) -> Result<()>;

    /// Applies `changes` when the stored status equals `expected_status`
    /// (or unconditionally when `None`) and returns the rows touched.
    ///
    /// Changing the status without an expected status is `InvalidArgument`.
    async fn update_host(&self, id: Uuid, expected_status: Option<HostStatus>, changes: HostChanges) -> Result<u64>;

    /// Cluster counterpart of `update_host`
    async fn update_cluster(
        &self,
        id: Uuid,
        expected_status: Option<ClusterStatus>,
        changes: ClusterChanges,
    ) -> Result<u64>;

    /// Page of hosts in any of `statuses`, ordered by ID
    async fn list_hosts_by_status(&self, statuses: &[HostStatus], limit: usize, offset: usize) -> Result<Vec<Host>>;

    /// Page of clusters in any of `statuses`, ordered by ID
    async fn list_clusters_by_status(
        &self,
        statuses: &[ClusterStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Cluster>>;
}

/// Turns a zero-row guarded update into `GuardedUpdateConflict`
pub fn expect_updated(rows: u64, entity: &'static str, id: Uuid, expected: impl fmt::Display) -> Result<()> {
    if rows == 0 {
        return Err(CoreError::GuardedUpdateConflict {
            entity,
            id,
            expected: expected.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_status_guard<S>(expected: Option<S>, changes_status: Option<S>, entity: &str, id: Uuid) -> Result<()> {
    if expected.is_none() && changes_status.is_some() {
        return Err(CoreError::InvalidArgument(format!(
            "{entity} {id}: status can only change through a status-guarded update"
        )));
    }
    Ok(())
}
