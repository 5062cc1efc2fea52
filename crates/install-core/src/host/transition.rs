//! Post-transition hooks of the host machine.
//!
//! Every hook ends in a single guarded write: the row is only touched if it
//! is still in the status the rule matched from.

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::events::EventSink;
use crate::host::common::{
    render_status_info, update_host_progress, update_host_status, STATUS_INFO_BINDING, STATUS_INFO_DISCOVERING,
    STATUS_INFO_INSTALLED, STATUS_INFO_MEDIA_DISCONNECTED, STATUS_INFO_REBOOTING_DAY2,
};
use crate::host::{HostArgs, HostMachine};
use crate::metrics::MetricsSink;
use crate::models::{Host, HostKind, HostProgress, HostRole, HostStage, HostStatus, LogsState, MediaStatus};
use crate::state_machine::TransitionHandler;
use crate::store::{expect_updated, HostChanges, Store};
use crate::time::{display_duration, elapsed};
use crate::validation::failing_messages;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Stage timestamps are refreshed at most this often while a host waits on
/// a user to fix its boot order
const STAGE_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Action attached to a host transition rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostHook {
    /// Creates the row, or restarts discovery on a known host
    Register,
    /// Creates the row of a host that was installed out of band
    RegisterInstalled,
    /// Host registered again while installing
    RegisterDuringInstallation(&'static str),
    /// Host booted the discovery image instead of the installation disk
    RegisterDuringReboot,
    /// Status change with a fixed status info
    Status(&'static str),
    /// Status change explained by the caller's reason
    Reason,
    /// The agent lost its discovery media; recorded with the status change
    MediaDisconnected,
    /// Status change with a templated info rendered from the refresh
    Refresh(&'static str),
    /// Re-enables a disabled host; its inventory is stale
    Enable,
    /// Reset of an installation
    Reset,
    /// Keeps the stage timestamp fresh so the stage timeout does not fire
    RefreshStageUpdateTime,
    /// Log collection did not finish in time
    LogsTimeout,
    /// Applies a reported installation stage
    InstallProgress,
    /// Binds a pool host to the cluster carried by the arguments
    Bind,
    /// Detaches a host from its cluster
    Unbind(&'static str),
}

/// Persists host transitions
#[derive(Clone)]
pub struct HostTransitionHandler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    config: Arc<Config>,
}

impl std::fmt::Debug for HostTransitionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostTransitionHandler").finish_non_exhaustive()
    }
}

impl HostTransitionHandler {
    /// Creates the handler
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSink>,
        metrics: Arc<dyn MetricsSink>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            events,
            metrics,
            config,
        }
    }

    async fn set_status(
        &self,
        host: &Host,
        src: HostStatus,
        dst: HostStatus,
        info: &str,
        changes: HostChanges,
        args: &HostArgs,
    ) -> Result<()> {
        update_host_status(
            self.store.as_ref(),
            self.events.as_ref(),
            host,
            src,
            dst,
            info,
            changes,
            args.now,
        )
        .await
    }

    async fn register(&self, host: &Host, src: HostStatus, dst: HostStatus, args: &HostArgs) -> Result<()> {
        if src == HostStatus::Unregistered {
            let mut created = host.clone();
            created.status = dst;
            created.status_info = STATUS_INFO_DISCOVERING.to_string();
            created.status_updated_at = args.now;
            if args.discovery_agent_version.is_some() {
                created.discovery_agent_version.clone_from(&args.discovery_agent_version);
            }
            info!(
                "Register new host {} infra env {} cluster {:?}",
                host.id, host.infra_env_id, host.cluster_id
            );
            return self.store.create_host(created).await;
        }

        // Hardware may have changed while the agent was away
        let changes = HostChanges {
            inventory: Some(None),
            bootstrap: Some(false),
            progress: Some(HostProgress {
                current_stage: host.progress.current_stage,
                stage_updated_at: Some(args.now),
                ..HostProgress::default()
            }),
            discovery_agent_version: args.discovery_agent_version.clone().map(Some),
            ..HostChanges::default()
        };
        self.set_status(host, src, dst, STATUS_INFO_DISCOVERING, changes, args).await
    }

    async fn register_installed(&self, host: &Host, dst: HostStatus, args: &HostArgs) -> Result<()> {
        let mut created = host.clone();
        created.status = dst;
        created.status_info = STATUS_INFO_INSTALLED.to_string();
        created.status_updated_at = args.now;
        created.kind = HostKind::AddToExistingClusterHost;
        info!("Register installed host {} cluster {:?}", host.id, host.cluster_id);
        self.store.create_host(created).await
    }

    async fn register_during_reboot(&self, host: &Host, src: HostStatus, dst: HostStatus, args: &HostArgs) -> Result<()> {
        if src == HostStatus::InstallingPendingUserAction {
            return Err(CoreError::Forbidden("Host is required to be booted from disk".to_string()));
        }

        let inventory = host.parsed_inventory()?;
        let (Some(path), Some(inventory)) = (host.installation_disk_path.as_deref(), inventory) else {
            return Err(CoreError::ValidationContext(format!(
                "host {} has no installation disk or inventory",
                host.id
            )));
        };
        let disk = inventory
            .disks
            .iter()
            .find(|d| d.matches_path(path))
            .ok_or_else(|| {
                CoreError::ValidationContext(format!("host {}: installation disk {path} not found in inventory", host.id))
            })?;

        let mut info = format!(
            "Expected the host to boot from disk, but it booted the installation image - please reboot and fix boot order to boot from disk {path}"
        );
        if !disk.serial.is_empty() {
            info.push_str(&format!(" ({})", disk.serial));
        }
        self.set_status(host, src, dst, &info, HostChanges::default(), args).await
    }

    async fn refresh_stage_update_time(&self, host: &Host, src: HostStatus, args: &HostArgs) -> Result<()> {
        if host
            .progress
            .stage_updated_at
            .is_some_and(|at| elapsed(args.now, at) < STAGE_REFRESH_INTERVAL)
        {
            return Ok(());
        }
        let changes = HostChanges {
            progress: Some(HostProgress {
                stage_updated_at: Some(args.now),
                ..host.progress.clone()
            }),
            ..HostChanges::default()
        };
        let rows = self.store.update_host(host.id, Some(src), changes).await?;
        expect_updated(rows, "host", host.id, src)
    }

    async fn install_progress(&self, host: &Host, src: HostStatus, args: &HostArgs) -> Result<()> {
        let report = args
            .progress
            .as_ref()
            .ok_or_else(|| CoreError::InvalidArgument(format!("host {}: missing progress report", host.id)))?;

        if let Some(previous) = host.progress.current_stage {
            if previous != report.stage {
                let started = host.progress.stage_started_at.unwrap_or(host.status_updated_at);
                self.metrics
                    .host_stage_finished(previous.as_str(), elapsed(args.now, started));
            }
        }

        let store = self.store.as_ref();
        let events = self.events.as_ref();
        match report.stage {
            HostStage::Failed => {
                let mut info = report.stage.to_string();
                if let Some(detail) = report.progress_info.as_deref().filter(|d| !d.is_empty()) {
                    info.push_str(&format!(" - {detail}"));
                }
                self.set_status(host, src, HostStatus::Error, &info, HostChanges::default(), args)
                    .await
            }
            HostStage::Done => {
                let dst = if host.is_day2() {
                    HostStatus::AddedToExistingCluster
                } else {
                    HostStatus::Installed
                };
                update_host_progress(
                    store,
                    events,
                    host,
                    src,
                    dst,
                    STATUS_INFO_INSTALLED,
                    HostStage::Done,
                    report.progress_info.clone(),
                    Some(100),
                    args.now,
                )
                .await
            }
            HostStage::Rebooting if host.is_day2() => {
                update_host_progress(
                    store,
                    events,
                    host,
                    src,
                    HostStatus::AddedToExistingCluster,
                    STATUS_INFO_REBOOTING_DAY2,
                    HostStage::Done,
                    report.progress_info.clone(),
                    Some(100),
                    args.now,
                )
                .await
            }
            stage => {
                update_host_progress(
                    store,
                    events,
                    host,
                    src,
                    HostStatus::InstallingInProgress,
                    stage.as_str(),
                    stage,
                    report.progress_info.clone(),
                    report.percentage,
                    args.now,
                )
                .await
            }
        }
    }
}

#[async_trait]
impl TransitionHandler<HostMachine> for HostTransitionHandler {
    async fn post_transition(
        &self,
        hook: Option<&HostHook>,
        host: &Host,
        src: HostStatus,
        dst: HostStatus,
        args: &HostArgs,
    ) -> Result<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        match hook {
            HostHook::Register => self.register(host, src, dst, args).await,
            HostHook::RegisterInstalled => self.register_installed(host, dst, args).await,
            HostHook::RegisterDuringInstallation(info) | HostHook::Status(info) => {
                self.set_status(host, src, dst, info, HostChanges::default(), args).await
            }
            HostHook::RegisterDuringReboot => self.register_during_reboot(host, src, dst, args).await,
            HostHook::Reason => {
                let reason = args.reason.clone().unwrap_or_default();
                self.set_status(host, src, dst, &reason, HostChanges::default(), args).await
            }
            HostHook::MediaDisconnected => {
                let changes = HostChanges {
                    media_status: Some(Some(MediaStatus::Disconnected)),
                    ..HostChanges::default()
                };
                self.set_status(host, src, dst, STATUS_INFO_MEDIA_DISCONNECTED, changes, args)
                    .await
            }
            HostHook::Refresh(template) => {
                let stage = host.progress.current_stage;
                let max_time = display_duration(self.config.timeouts.host_stage(stage, args.single_node));
                let info = render_status_info(template, stage, &max_time, &failing_messages(&args.validations));
                self.set_status(host, src, dst, &info, HostChanges::default(), args).await
            }
            HostHook::Enable => {
                let changes = HostChanges {
                    inventory: Some(None),
                    ..HostChanges::default()
                };
                self.set_status(host, src, dst, STATUS_INFO_DISCOVERING, changes, args).await
            }
            HostHook::Reset => {
                let reason = args.reason.clone().unwrap_or_default();
                let changes = HostChanges {
                    status_updated_at: Some(args.now),
                    logs_info: Some(LogsState::Empty),
                    logs_started_at: Some(None),
                    logs_collected_at: Some(None),
                    ..HostChanges::default()
                };
                self.set_status(host, src, dst, &reason, changes, args).await
            }
            HostHook::RefreshStageUpdateTime => self.refresh_stage_update_time(host, src, args).await,
            HostHook::LogsTimeout => {
                let changes = HostChanges {
                    logs_info: Some(LogsState::Timeout),
                    ..HostChanges::default()
                };
                let rows = self.store.update_host(host.id, Some(src), changes).await?;
                expect_updated(rows, "host", host.id, src)
            }
            HostHook::InstallProgress => self.install_progress(host, src, args).await,
            HostHook::Bind => {
                let cluster_id = args
                    .cluster_id
                    .ok_or_else(|| CoreError::InvalidArgument(format!("host {}: bind without a cluster", host.id)))?;
                let changes = HostChanges {
                    cluster_id: Some(Some(cluster_id)),
                    ..HostChanges::default()
                };
                self.set_status(host, src, dst, STATUS_INFO_BINDING, changes, args)
                    .await
            }
            HostHook::Unbind(info) => {
                let changes = HostChanges {
                    cluster_id: Some(None),
                    role: Some(HostRole::AutoAssign),
                    bootstrap: Some(false),
                    ..HostChanges::default()
                };
                self.set_status(host, src, dst, info, changes, args).await
            }
        }
    }
}
