//! Host lifecycle.
//!
//! The `HostManager` is the only writer of host status. Every operation
//! loads the host, builds the transition arguments and runs one transition
//! of the host machine; plain field updates that feed validations go
//! straight to the store, guarded by the status the host was read in.
//!
//! - `state_machine`: rules of hosts bound to a cluster
//! - `pool_state_machine`: rules of unbound pool hosts and bind / unbind
//! - `refresh`: validation preprocessing for `RefreshStatus`
//! - `transition`: post-transition hooks
//! - `common`: status infos and the guarded writers

pub mod common;
#[cfg(test)]
mod host_test;
pub mod pool_state_machine;
pub mod refresh;
pub mod state_machine;
pub mod transition;

use crate::conditions::{ConditionSource, Conditions, DisabledValidations, Guard};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::events::{EventSink, Severity};
use crate::host::common::{INSTALL_PROGRESS_STATUSES, MANUAL_REBOOT_STAGES, ROLE_UPDATE_STATUSES};
use crate::host::refresh::HostRefreshPreprocessor;
use crate::host::state_machine::new_host_state_machine;
use crate::host::transition::{HostHook, HostTransitionHandler};
use crate::metrics::MetricsSink;
use crate::models::{
    Cluster, DiskSpeed, Host, HostProgress, HostRole, HostStage, HostStatus, ImageAvailability, Inventory,
    LogsState, MediaStatus, NtpSource, MIN_MASTERS_NEEDED_FOR_INSTALLATION,
};
use crate::state_machine::{MachineSpec, StateMachine, Transition, TransitionRule};
use crate::store::{expect_updated, HostChanges, Store};
use crate::validation::host::hostname_problem;
use crate::validation::{
    newly_failed, parse_validations_info, HostValidationContext, HostValidationId, HostValidator, ValidationsInfo,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

string_enum! {
    /// Transitions a caller can request on a host
    pub enum HostTransitionType {
        RegisterHost => "RegisterHost",
        RegisterInstalledHost => "RegisterInstalledHost",
        Refresh => "RefreshStatus",
        InstallHost => "InstallHost",
        DisableHost => "DisableHost",
        EnableHost => "EnableHost",
        CancelInstallation => "CancelInstallation",
        ResetHost => "ResetHost",
        ResettingPendingUserAction => "ResettingPendingUserAction",
        HostInstallationFailed => "HostInstallationFailed",
        MediaDisconnected => "MediaDisconnected",
        UpdateInstallProgress => "UpdateInstallProgress",
        BindHost => "BindHost",
        UnbindHost => "UnbindHost",
        ReclaimHost => "ReclaimHost",
    }
}

/// Stage reported by the installer running on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    /// Reached stage
    pub stage: HostStage,
    /// Free-form detail
    pub progress_info: Option<String>,
    /// Percentage of the role's stages done; `None` keeps the stored value
    pub percentage: Option<i64>,
}

/// Per-call arguments of a host transition
#[derive(Debug, Clone, Default)]
pub struct HostArgs {
    /// Reference time of the transition
    pub now: DateTime<Utc>,
    /// Conditions computed by the refresh preprocessor
    pub conditions: Conditions,
    /// Validation results computed by the refresh preprocessor
    pub validations: ValidationsInfo,
    /// Whether the host's cluster is single-node
    pub single_node: bool,
    /// Caller supplied explanation, used as status info
    pub reason: Option<String>,
    /// Agent version sent on registration
    pub discovery_agent_version: Option<String>,
    /// Installation progress report
    pub progress: Option<ProgressReport>,
    /// Cluster to bind to
    pub cluster_id: Option<Uuid>,
}

impl HostArgs {
    /// Arguments carrying only the reference time
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Sets the status-info reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the progress report
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressReport) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl ConditionSource for HostArgs {
    fn condition(&self, id: &str) -> Option<bool> {
        self.conditions.condition(id)
    }
}

/// Host machine type parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct HostMachine;

impl MachineSpec for HostMachine {
    type State = HostStatus;
    type TransitionType = HostTransitionType;
    type Entity = Host;
    type Args = HostArgs;
    type Hook = HostHook;

    fn current_state(host: &Host) -> HostStatus {
        host.status
    }
}

/// Guard over a host and its transition arguments
pub type HostGuard = Guard<Host, HostArgs>;

/// Rule of the host machine
pub type HostRule = TransitionRule<HostMachine>;

/// Drives host transitions and host field updates
#[derive(Clone)]
pub struct HostManager {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    machine: StateMachine<HostMachine>,
    handler: HostTransitionHandler,
    preprocessor: HostRefreshPreprocessor,
}

impl std::fmt::Debug for HostManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostManager")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl HostManager {
    /// Creates the manager and builds its state machine
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        validator: HostValidator,
        events: Arc<dyn EventSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let disabled = DisabledValidations::new::<HostValidationId>(&config.disabled_host_validations);
        let machine = new_host_state_machine(&config, &disabled);
        let handler = HostTransitionHandler::new(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&metrics),
            Arc::clone(&config),
        );
        Self {
            config,
            store,
            events,
            metrics,
            machine,
            handler,
            preprocessor: HostRefreshPreprocessor::new(validator, disabled),
        }
    }

    /// The host state machine
    #[must_use]
    pub fn machine(&self) -> &StateMachine<HostMachine> {
        &self.machine
    }

    async fn run(&self, transition_type: HostTransitionType, host: &Host, args: &HostArgs) -> Result<Transition<HostStatus>> {
        self.machine.run(transition_type, host, args, &self.handler).await
    }

    async fn update_fields(&self, host: &Host, changes: HostChanges) -> Result<()> {
        let rows = self.store.update_host(host.id, Some(host.status), changes).await?;
        expect_updated(rows, "host", host.id, host.status)
    }

    /// Registers a host, or re-registers a known one.
    ///
    /// A host without a stored row starts from the unregistered status and
    /// lands in the cluster or in the pool depending on `cluster_id`.
    pub async fn register_host(
        &self,
        host: Host,
        discovery_agent_version: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition<HostStatus>> {
        let current = match self.store.get_host(host.id).await {
            Ok(stored) => stored,
            Err(CoreError::NotFound { .. }) => Host {
                status: HostStatus::Unregistered,
                ..host
            },
            Err(e) => return Err(e),
        };
        let args = HostArgs {
            discovery_agent_version,
            ..HostArgs::new(now)
        };
        self.run(HostTransitionType::RegisterHost, &current, &args).await
    }

    /// Registers a day-2 host that is already part of the cluster
    pub async fn register_installed_host(&self, host: Host, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = Host {
            status: HostStatus::Unregistered,
            ..host
        };
        self.run(HostTransitionType::RegisterInstalledHost, &host, &HostArgs::new(now))
            .await
    }

    /// Loads a host and refreshes it
    pub async fn refresh_status(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.refresh_host(&host, now).await
    }

    /// Re-evaluates validations and runs the refresh transition
    pub async fn refresh_host(&self, host: &Host, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let (cluster, siblings) = match host.cluster_id {
            Some(cluster_id) => (
                Some(self.store.get_cluster(cluster_id).await?),
                self.store.list_cluster_hosts(cluster_id).await?,
            ),
            None => (None, Vec::new()),
        };

        let mut host = host.clone();
        self.refresh_suggested_role(&mut host, cluster.as_ref(), &siblings).await?;

        let ctx = HostValidationContext::new(&host, cluster.as_ref(), &siblings, now);
        let outcome = self.preprocessor.preprocess(&ctx);
        self.persist_validations(&host, &outcome.validations, now).await?;

        let args = HostArgs {
            conditions: outcome.conditions,
            validations: outcome.validations,
            single_node: cluster.as_ref().is_some_and(Cluster::is_single_node),
            ..HostArgs::new(now)
        };
        self.run(HostTransitionType::Refresh, &host, &args).await
    }

    async fn persist_validations(&self, host: &Host, validations: &ValidationsInfo, now: DateTime<Utc>) -> Result<()> {
        let previous = parse_validations_info(host.validations_info.as_deref()).unwrap_or_default();
        if previous == *validations {
            return Ok(());
        }
        for id in newly_failed(&previous, validations) {
            self.metrics.validation_failed("host", &id);
            self.events.add_event(
                host.id,
                host.cluster_id,
                Severity::Warning,
                &format!(
                    "Host {}: validation '{id}' that used to succeed is now failing",
                    host.display_name()
                ),
                now,
            );
        }
        let changes = HostChanges {
            validations_info: Some(Some(serde_json::to_string(validations)?)),
            ..HostChanges::default()
        };
        self.update_fields(host, changes).await
    }

    async fn refresh_suggested_role(&self, host: &mut Host, cluster: Option<&Cluster>, siblings: &[Host]) -> Result<()> {
        if host.role != HostRole::AutoAssign || !ROLE_UPDATE_STATUSES.contains(&host.status) {
            return Ok(());
        }
        let suggested = self.select_role(host, cluster, siblings)?;
        if suggested == host.suggested_role {
            return Ok(());
        }
        debug!("Host {}: suggested role {} -> {}", host.id, host.suggested_role, suggested);
        let changes = HostChanges {
            suggested_role: Some(suggested),
            ..HostChanges::default()
        };
        self.update_fields(host, changes).await?;
        host.suggested_role = suggested;
        Ok(())
    }

    /// Role the host should get if left on auto-assign.
    ///
    /// Day-2 hosts are workers. Otherwise a host becomes a master while the
    /// cluster is short of masters and its hardware qualifies.
    pub fn select_role(&self, host: &Host, cluster: Option<&Cluster>, siblings: &[Host]) -> Result<HostRole> {
        if host.is_day2() {
            return Ok(HostRole::Worker);
        }
        let Some(inventory) = host.parsed_inventory()? else {
            return Ok(HostRole::AutoAssign);
        };
        let single_node = cluster.is_some_and(Cluster::is_single_node);
        let required = cluster.map_or(MIN_MASTERS_NEEDED_FOR_INSTALLATION, Cluster::required_masters);
        let masters = siblings
            .iter()
            .filter(|h| h.id != host.id && h.effective_role() == HostRole::Master)
            .count();
        if masters < required {
            let (sufficient, _) =
                self.preprocessor
                    .validator()
                    .hardware()
                    .is_sufficient(&inventory, HostRole::Master, single_node)?;
            if sufficient {
                return Ok(HostRole::Master);
            }
        }
        Ok(HostRole::Worker)
    }

    /// Starts the installation of a host
    pub async fn install(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.run(HostTransitionType::InstallHost, &host, &HostArgs::new(now)).await
    }

    /// Excludes a host from the cluster
    pub async fn disable(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.run(HostTransitionType::DisableHost, &host, &HostArgs::new(now)).await
    }

    /// Brings a disabled host back into discovery
    pub async fn enable(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.run(HostTransitionType::EnableHost, &host, &HostArgs::new(now)).await
    }

    /// Cancels the installation of a host
    pub async fn cancel_installation(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        let args = HostArgs::new(now).with_reason(format!("Installation cancelled: {reason}"));
        self.run(HostTransitionType::CancelInstallation, &host, &args).await
    }

    /// Moves a host to resetting
    pub async fn reset_host(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        let args = HostArgs::new(now).with_reason(reason);
        self.run(HostTransitionType::ResetHost, &host, &args).await
    }

    /// The host must be rebooted into the discovery image to finish a reset
    pub async fn reset_pending_user_action(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.run(HostTransitionType::ResettingPendingUserAction, &host, &HostArgs::new(now))
            .await
    }

    /// The installation command failed on the host
    pub async fn handle_installation_failure(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        let args = HostArgs::new(now).with_reason("installation command failed");
        self.run(HostTransitionType::HostInstallationFailed, &host, &args).await
    }

    /// A preparation step failed on the host
    pub async fn handle_prepare_installation_failure(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        let args = HostArgs::new(now).with_reason(format!("failed to prepare installation: {reason}"));
        self.run(HostTransitionType::HostInstallationFailed, &host, &args).await
    }

    /// The agent lost its discovery media
    pub async fn handle_media_disconnected(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.run(HostTransitionType::MediaDisconnected, &host, &HostArgs::new(now))
            .await
    }

    /// Applies an installation stage reported by the host.
    ///
    /// A repeated stage only refreshes its detail; a new stage must not go
    /// back in the role's stage order.
    pub async fn update_install_progress(
        &self,
        id: Uuid,
        stage: HostStage,
        progress_info: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let host = self.store.get_host(id).await?;
        if !INSTALL_PROGRESS_STATUSES.contains(&host.status) {
            return Err(CoreError::Conflict(format!(
                "Can't set progress <{stage}> to host in status <{}>",
                host.status
            )));
        }

        let mut percentage = None;
        if stage != HostStage::Failed {
            let role = host.effective_role();
            let stages = HostStage::stages_for(role, host.bootstrap);
            let Some(index) = stages.iter().position(|s| *s == stage) else {
                return Err(CoreError::InvalidArgument(format!(
                    "Stages {stage} isn't available for host role {role} bootstrap {}",
                    host.bootstrap
                )));
            };
            if let Some(current) = host.progress.current_stage {
                if let Some(previous) = stages.iter().position(|s| *s == current) {
                    if index < previous {
                        return Err(CoreError::InvalidArgument(format!(
                            "Can't assign lower stage \"{stage}\" after host has been in stage \"{current}\""
                        )));
                    }
                }
            }
            percentage = Some(i64::try_from((index + 1) * 100 / stages.len()).unwrap_or(100));
        }

        if host.progress.current_stage == Some(stage) {
            let changes = HostChanges {
                progress: Some(HostProgress {
                    progress_info,
                    stage_updated_at: Some(now),
                    ..host.progress.clone()
                }),
                ..HostChanges::default()
            };
            return self.update_fields(&host, changes).await;
        }

        let args = HostArgs::new(now).with_progress(ProgressReport {
            stage,
            progress_info,
            percentage,
        });
        self.run(HostTransitionType::UpdateInstallProgress, &host, &args).await?;
        Ok(())
    }

    /// Binds a pool host to a cluster
    pub async fn bind_host(&self, id: Uuid, cluster_id: Uuid, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        self.store.get_cluster(cluster_id).await?;
        let args = HostArgs {
            cluster_id: Some(cluster_id),
            ..HostArgs::new(now)
        };
        self.run(HostTransitionType::BindHost, &host, &args).await
    }

    /// Returns a host to the pool; `reclaim` is for installed hosts whose
    /// disk must be wiped first
    pub async fn unbind_host(&self, id: Uuid, reclaim: bool, now: DateTime<Utc>) -> Result<Transition<HostStatus>> {
        let host = self.store.get_host(id).await?;
        let transition_type = if reclaim {
            HostTransitionType::ReclaimHost
        } else {
            HostTransitionType::UnbindHost
        };
        self.run(transition_type, &host, &HostArgs::new(now)).await
    }

    /// Sets the role chosen by the user
    pub async fn update_role(&self, id: Uuid, role: HostRole) -> Result<()> {
        let host = self.store.get_host(id).await?;
        ensure_pre_install(&host, "host role")?;
        let changes = HostChanges {
            role: Some(role),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Sets the hostname requested by the user
    pub async fn update_hostname(&self, id: Uuid, hostname: &str) -> Result<()> {
        let host = self.store.get_host(id).await?;
        ensure_pre_install(&host, "hostname")?;
        if let Some(problem) = hostname_problem(hostname) {
            return Err(CoreError::InvalidArgument(problem));
        }
        let changes = HostChanges {
            requested_hostname: Some(Some(hostname.to_string())),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Stores a new inventory and picks the installation disk if the current
    /// one is gone or not eligible any more
    pub async fn update_inventory(&self, id: Uuid, inventory: &Inventory) -> Result<()> {
        let host = self.store.get_host(id).await?;
        if INSTALL_PROGRESS_STATUSES.contains(&host.status) {
            return Err(CoreError::Conflict(format!(
                "Host {} is in {} state, inventory can't be updated during installation",
                host.id, host.status
            )));
        }
        let eligible = self.preprocessor.validator().hardware().eligible_disks(inventory);
        let keep_disk = host
            .installation_disk_path
            .as_deref()
            .is_some_and(|path| eligible.iter().any(|d| d.matches_path(path)));
        let installation_disk_path = if keep_disk {
            None
        } else {
            Some(eligible.first().map(crate::models::Disk::device_path))
        };
        let changes = HostChanges {
            inventory: Some(Some(serde_json::to_string(inventory)?)),
            installation_disk_path,
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Records an agent check-in
    pub async fn update_checked_in(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let changes = HostChanges {
            checked_in_at: Some(now),
            ..HostChanges::default()
        };
        let rows = self.store.update_host(id, None, changes).await?;
        if rows == 0 {
            return Err(CoreError::host_not_found(id));
        }
        Ok(())
    }

    /// Records the installation disk speed check result
    pub async fn set_disk_speed(&self, id: Uuid, path: &str, speed: DiskSpeed) -> Result<()> {
        let host = self.store.get_host(id).await?;
        if host.installation_disk_path.as_deref() != Some(path) {
            debug!(
                "Host {}: ignoring disk speed of {path}, installation disk is {:?}",
                host.id, host.installation_disk_path
            );
            return Ok(());
        }
        let changes = HostChanges {
            disk_speed: Some(Some(speed)),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Records the result of pulling one container image
    pub async fn update_image_status(&self, id: Uuid, image: ImageAvailability) -> Result<()> {
        let host = self.store.get_host(id).await?;
        let mut images = host.images_status.clone();
        images.insert(image.name.clone(), image);
        let changes = HostChanges {
            images_status: Some(images),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Replaces the NTP sources reported by the agent
    pub async fn update_ntp_sources(&self, id: Uuid, sources: Vec<NtpSource>) -> Result<()> {
        let host = self.store.get_host(id).await?;
        let changes = HostChanges {
            ntp_sources: Some(sources),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Records that the discovery media is readable again
    pub async fn update_media_connected(&self, id: Uuid) -> Result<()> {
        let host = self.store.get_host(id).await?;
        let changes = HostChanges {
            media_status: Some(Some(MediaStatus::Connected)),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Records whether a day-2 host reaches the API VIP of its cluster
    pub async fn update_api_vip_connectivity(&self, id: Uuid, reachable: bool) -> Result<()> {
        let host = self.store.get_host(id).await?;
        let changes = HostChanges {
            api_vip_connectivity: Some(Some(reachable)),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Moves log collection forward
    pub async fn update_logs_progress(&self, id: Uuid, state: LogsState, now: DateTime<Utc>) -> Result<()> {
        let host = self.store.get_host(id).await?;
        let mut changes = HostChanges {
            logs_info: Some(state),
            ..HostChanges::default()
        };
        match state {
            LogsState::Requested => changes.logs_started_at = Some(Some(now)),
            LogsState::Collecting | LogsState::Completed => changes.logs_collected_at = Some(Some(now)),
            LogsState::Empty | LogsState::Timeout => {}
        }
        self.update_fields(&host, changes).await
    }

    /// Marks or unmarks the bootstrap host
    pub async fn set_bootstrap(&self, id: Uuid, bootstrap: bool) -> Result<()> {
        let host = self.store.get_host(id).await?;
        if host.bootstrap == bootstrap {
            return Ok(());
        }
        info!("Host {}: bootstrap set to {bootstrap}", host.id);
        let changes = HostChanges {
            bootstrap: Some(bootstrap),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await
    }

    /// Replaces auto-assign with the suggested role; returns whether the role
    /// changed
    pub async fn auto_assign_role(&self, id: Uuid) -> Result<bool> {
        let host = self.store.get_host(id).await?;
        if host.role != HostRole::AutoAssign {
            return Ok(false);
        }
        let (cluster, siblings) = match host.cluster_id {
            Some(cluster_id) => (
                Some(self.store.get_cluster(cluster_id).await?),
                self.store.list_cluster_hosts(cluster_id).await?,
            ),
            None => (None, Vec::new()),
        };
        let role = match host.suggested_role {
            HostRole::AutoAssign => self.select_role(&host, cluster.as_ref(), &siblings)?,
            suggested => suggested,
        };
        if role == HostRole::AutoAssign {
            return Ok(false);
        }
        info!("Host {}: auto-assigned role {role}", host.id);
        let changes = HostChanges {
            role: Some(role),
            ..HostChanges::default()
        };
        self.update_fields(&host, changes).await?;
        Ok(true)
    }

    /// Whether a reset of this host needs a user to boot it into the
    /// discovery image
    #[must_use]
    pub fn is_require_user_action_reset(&self, host: &Host) -> bool {
        host.status == HostStatus::Resetting
            && host
                .progress
                .current_stage
                .is_some_and(|stage| MANUAL_REBOOT_STAGES.contains(&stage))
    }

    /// Configuration the manager runs with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn ensure_pre_install(host: &Host, what: &str) -> Result<()> {
    if ROLE_UPDATE_STATUSES.contains(&host.status) {
        return Ok(());
    }
    let allowed: Vec<&str> = ROLE_UPDATE_STATUSES.iter().map(|s| s.as_str()).collect();
    Err(CoreError::InvalidArgument(format!(
        "Host is in {} state, {what} can be set only in one of [{}] states",
        host.status,
        allowed.join(" ")
    )))
}
