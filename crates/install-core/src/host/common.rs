//! Status infos and the guarded status / progress writers shared by every
//! host transition.

use crate::error::Result;
use crate::events::{EventSink, Severity};
use crate::models::{Host, HostProgress, HostStage, HostStatus};
use crate::store::{expect_updated, HostChanges, Store};
use chrono::{DateTime, Utc};
use tracing::info;

pub const STATUS_INFO_DISCONNECTED: &str = "Host keepalive timeout";
pub const STATUS_INFO_DISABLED: &str = "Host is disabled";
pub const STATUS_INFO_DISCOVERING: &str = "Waiting for host hardware info";
pub const STATUS_INFO_INSUFFICIENT_HARDWARE: &str = "Host does not pass minimum hardware requirements";
pub const STATUS_INFO_PENDING_FOR_INPUT: &str = "User input required";
pub const STATUS_INFO_NOT_READY_FOR_INSTALL: &str =
    "Host cannot be installed due to following failing validation(s): $FAILING_VALIDATIONS";
pub const STATUS_INFO_KNOWN: &str = "Host is ready to be installed";
pub const STATUS_INFO_READY_TO_BE_BOUND: &str = "Host is ready to be bound";
pub const STATUS_INFO_INSTALLING: &str = "Installation in progress";
pub const STATUS_INFO_INSTALLED: &str = "Installed";
pub const STATUS_INFO_RESETTING_PENDING_USER_ACTION: &str =
    "Reboot the host into the installation image to complete resetting the installation";
pub const STATUS_INFO_PREPARING_FOR_INSTALLATION: &str = "Preparing host for installation";
pub const STATUS_INFO_PREPARING_SUCCESSFUL: &str = "Host finished successfully to prepare for installation";
pub const STATUS_INFO_PREPARING_TIMED_OUT: &str = "Cluster is no longer preparing for installation";
pub const STATUS_INFO_ABORTING_DUE_CLUSTER_ERRORS: &str = "Installation has been aborted due cluster errors";
pub const STATUS_INFO_INSTALLATION_TIMED_OUT: &str =
    "Host failed to install due to timeout while starting installation";
pub const STATUS_INFO_INSTALLATION_IN_PROGRESS_TIMED_OUT: &str =
    "Host failed to install because its installation stage $STAGE took longer than expected $MAX_TIME";
pub const STATUS_INFO_MEDIA_DISCONNECTED: &str = "Unable to read from the discovery media. It was either disconnected or poor network conditions prevented it from being read. Try using the minimal ISO option and be sure to keep the media connected until the installation is completed";
pub const STATUS_INFO_REBOOTING_DAY2: &str = "Host has rebooted and no further updates will be posted. Please check console for progress and to possibly approve pending CSRs";
pub const STATUS_INFO_UNEXPECTED_RESTART: &str = "The host unexpectedly restarted during the installation";
pub const STATUS_INFO_BINDING: &str = "Host is waiting to be bound to the cluster";
pub const STATUS_INFO_UNBINDING: &str = "Host is being unbound from the cluster";
pub const STATUS_INFO_UNBINDING_PENDING_USER_ACTION: &str =
    "Reboot the host into the discovery image to complete unbinding it from the cluster";
pub const STATUS_INFO_RECLAIMING: &str = "Host is being reclaimed";

/// Statuses in which the role may still be changed
pub const ROLE_UPDATE_STATUSES: &[HostStatus] = &[
    HostStatus::Discovering,
    HostStatus::Known,
    HostStatus::Disconnected,
    HostStatus::Insufficient,
    HostStatus::PendingForInput,
];

/// Statuses that accept installation progress reports
pub const INSTALL_PROGRESS_STATUSES: &[HostStatus] = &[
    HostStatus::Installing,
    HostStatus::InstallingInProgress,
    HostStatus::InstallingPendingUserAction,
];

/// Stages after which the host boots from disk and only a user can put
/// the discovery image back
pub const MANUAL_REBOOT_STAGES: &[HostStage] = &[
    HostStage::Rebooting,
    HostStage::WaitingForIgnition,
    HostStage::Configuring,
    HostStage::Joined,
    HostStage::Done,
];

/// Severity of the event emitted when a host enters `status`
#[must_use]
pub fn event_severity(status: HostStatus) -> Severity {
    match status {
        HostStatus::Error => Severity::Error,
        HostStatus::Disconnected
        | HostStatus::Insufficient
        | HostStatus::InstallingPendingUserAction
        | HostStatus::ResettingPendingUserAction
        | HostStatus::DisconnectedUnbound
        | HostStatus::InsufficientUnbound
        | HostStatus::UnbindingPendingUserAction => Severity::Warning,
        _ => Severity::Info,
    }
}

/// Writes `dst` with `status_info` plus `changes`, guarded by `src`.
///
/// `status_updated_at` moves only when the status changes, and only then
/// is an event emitted.
pub async fn update_host_status(
    store: &dyn Store,
    events: &dyn EventSink,
    host: &Host,
    src: HostStatus,
    dst: HostStatus,
    status_info: &str,
    mut changes: HostChanges,
    now: DateTime<Utc>,
) -> Result<()> {
    changes.status = Some(dst);
    changes.status_info = Some(status_info.to_string());
    if src != dst {
        changes.status_updated_at = Some(now);
    }

    let rows = store.update_host(host.id, Some(src), changes).await?;
    expect_updated(rows, "host", host.id, src)?;

    if src != dst {
        let mut message = format!("Host {}: updated status from \"{src}\" to \"{dst}\"", host.display_name());
        if !status_info.is_empty() {
            message.push_str(&format!(" ({status_info})"));
        }
        info!("{}", message);
        events.add_event(host.id, host.cluster_id, event_severity(dst), &message, now);
    }
    Ok(())
}

/// Moves the host to `stage` and writes the status change in the same
/// guarded update. `stage_started_at` moves only when the stage changes.
#[allow(clippy::too_many_arguments, reason = "mirrors update_host_status plus the stage")]
pub async fn update_host_progress(
    store: &dyn Store,
    events: &dyn EventSink,
    host: &Host,
    src: HostStatus,
    dst: HostStatus,
    status_info: &str,
    stage: HostStage,
    progress_info: Option<String>,
    installation_percentage: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut progress = HostProgress {
        current_stage: Some(stage),
        progress_info,
        stage_updated_at: Some(now),
        ..host.progress.clone()
    };
    if host.progress.current_stage != Some(stage) {
        progress.stage_started_at = Some(now);
    }
    if let Some(percentage) = installation_percentage {
        progress.installation_percentage = percentage;
    }
    let changes = HostChanges {
        progress: Some(progress),
        ..HostChanges::default()
    };
    update_host_status(store, events, host, src, dst, status_info, changes, now).await
}

/// Replaces `$STAGE`, `$MAX_TIME` and `$FAILING_VALIDATIONS` in a status
/// info template
#[must_use]
pub fn render_status_info(template: &str, stage: Option<HostStage>, max_time: &str, failing: &[String]) -> String {
    let mut rendered = template.replacen("$STAGE", stage.map_or("", HostStage::as_str), 1);
    rendered = rendered.replacen("$MAX_TIME", max_time, 1);
    if rendered.contains("$FAILING_VALIDATIONS") {
        let mut failing = failing.to_vec();
        failing.sort();
        rendered = rendered.replacen("$FAILING_VALIDATIONS", &failing.join(" ; "), 1);
    }
    rendered
}
