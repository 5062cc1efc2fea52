//! Status infos and the guarded status writer shared by every cluster
//! transition.

use crate::error::Result;
use crate::events::{EventSink, Severity};
use crate::models::{Cluster, ClusterStatus};
use crate::store::{expect_updated, ClusterChanges, Store};
use chrono::{DateTime, Utc};
use tracing::info;

pub const STATUS_INFO_INSUFFICIENT: &str = "Cluster is not ready for install";
pub const STATUS_INFO_READY: &str = "Cluster ready to be installed";
pub const STATUS_INFO_PENDING_FOR_INPUT: &str = "User input required";
pub const STATUS_INFO_ADDING_HOSTS: &str = "cluster is adding hosts to existing OCP cluster";
pub const STATUS_INFO_PREPARING_FOR_INSTALLATION: &str = "Preparing cluster for installation";
pub const STATUS_INFO_PREPARING_TIMED_OUT: &str = "Preparing cluster for installation has timed out";
pub const STATUS_INFO_PREPARING_FAILED: &str =
    "Cluster failed to prepare for installation, check the hosts and the cluster settings";
pub const STATUS_INFO_UNPREPARING_HOST_EXISTS: &str = "At least one host has stopped preparing for installation";
pub const STATUS_INFO_INSTALLING: &str = "Installation in progress";
pub const STATUS_INFO_INSTALLING_PENDING_USER_ACTION: &str = "Installation in progress, some hosts need user action";
pub const STATUS_INFO_FINALIZING: &str = "Finalizing cluster installation";
pub const STATUS_INFO_INSTALLED: &str = "Cluster is installed";
pub const STATUS_INFO_DEGRADED: &str = "Cluster is installed but degraded";
pub const STATUS_INFO_HOSTS_FAILED: &str =
    "Cluster installation failed: not enough hosts left to complete the installation";
pub const STATUS_INFO_INSTALLATION_TIMED_OUT: &str =
    "Cluster installation timed out while pending user action (a manual booting from installation disk)";
pub const STATUS_INFO_FINALIZING_TIMED_OUT: &str =
    "Timeout while waiting for the cluster to finalize: stage $STAGE took longer than $MAX_TIME";
pub const STATUS_INFO_RESET: &str = "Cluster installation was reset";

/// Statuses of an installation under way; deregistration is refused in them
pub const INSTALLATION_STATUSES: &[ClusterStatus] = &[
    ClusterStatus::PreparingForInstallation,
    ClusterStatus::Installing,
    ClusterStatus::InstallingPendingUserAction,
    ClusterStatus::Finalizing,
];

/// Severity of the event emitted when a cluster enters `status`
#[must_use]
pub fn event_severity(status: ClusterStatus) -> Severity {
    match status {
        ClusterStatus::Error => Severity::Critical,
        ClusterStatus::Insufficient | ClusterStatus::InstallingPendingUserAction | ClusterStatus::Cancelled => {
            Severity::Warning
        }
        _ => Severity::Info,
    }
}

/// Writes `dst` with `status_info` plus `changes`, guarded by `src`.
///
/// `status_updated_at` moves only when the status changes, and only then
/// is an event emitted.
pub async fn update_cluster_status(
    store: &dyn Store,
    events: &dyn EventSink,
    cluster: &Cluster,
    src: ClusterStatus,
    dst: ClusterStatus,
    status_info: &str,
    mut changes: ClusterChanges,
    now: DateTime<Utc>,
) -> Result<()> {
    changes.status = Some(dst);
    changes.status_info = Some(status_info.to_string());
    if src != dst {
        changes.status_updated_at = Some(now);
    }

    let rows = store.update_cluster(cluster.id, Some(src), changes).await?;
    expect_updated(rows, "cluster", cluster.id, src)?;

    if src != dst {
        let mut message = format!("Cluster {}: updated status from \"{src}\" to \"{dst}\"", cluster.name);
        if !status_info.is_empty() {
            message.push_str(&format!(" ({status_info})"));
        }
        info!("{}", message);
        events.add_event(cluster.id, Some(cluster.id), event_severity(dst), &message, now);
    }
    Ok(())
}
