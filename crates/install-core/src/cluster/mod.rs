//! Cluster lifecycle.
//!
//! `ClusterManager` mirrors `HostManager`: it is the only writer of cluster
//! status, and every status change runs through one transition of the
//! cluster machine. Refresh also keeps the weighted progress current.

pub mod common;
#[cfg(test)]
mod cluster_test;
pub mod progress;
pub mod refresh;
pub mod state_machine;
pub mod transition;

use crate::cluster::common::INSTALLATION_STATUSES;
use crate::cluster::progress::compute_progress;
use crate::cluster::refresh::ClusterRefreshPreprocessor;
use crate::cluster::state_machine::new_cluster_state_machine;
use crate::cluster::transition::{ClusterHook, ClusterTransitionHandler};
use crate::conditions::{ConditionSource, Conditions, DisabledValidations, Guard};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::events::{EventSink, Severity};
use crate::metrics::MetricsSink;
use crate::models::{
    Cluster, ClusterProgress, ClusterStatus, FinalizingStage, Host, LogsState, OperatorStatus, PreparationStatus,
};
use crate::state_machine::{MachineSpec, StateMachine, Transition, TransitionRule};
use crate::store::{expect_updated, ClusterChanges, Store};
use crate::validation::{
    newly_failed, parse_validations_info, ClusterValidationContext, ClusterValidationId, ClusterValidator,
    ValidationsInfo,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

string_enum! {
    /// Transitions a caller can request on a cluster
    pub enum ClusterTransitionType {
        RegisterCluster => "RegisterCluster",
        Refresh => "RefreshStatus",
        PrepareForInstallation => "PrepareForInstallation",
        CancelInstallation => "CancelInstallation",
        ResetCluster => "ResetCluster",
        CompleteInstallation => "CompleteInstallation",
    }
}

/// Per-call arguments of a cluster transition
#[derive(Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Reference time of the transition
    pub now: DateTime<Utc>,
    /// Conditions computed by the refresh preprocessor
    pub conditions: Conditions,
    /// Validation results computed by the refresh preprocessor
    pub validations: ValidationsInfo,
    /// Caller supplied explanation, used as status info
    pub reason: Option<String>,
    /// Outcome reported with `CompleteInstallation`
    pub success: bool,
}

impl ClusterArgs {
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
}

impl ConditionSource for ClusterArgs {
    fn condition(&self, id: &str) -> Option<bool> {
        self.conditions.condition(id)
    }
}

/// Cluster machine type parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterMachine;

impl MachineSpec for ClusterMachine {
    type State = ClusterStatus;
    type TransitionType = ClusterTransitionType;
    type Entity = Cluster;
    type Args = ClusterArgs;
    type Hook = ClusterHook;

    fn current_state(cluster: &Cluster) -> ClusterStatus {
        cluster.status
    }
}

/// Guard over a cluster and its transition arguments
pub type ClusterGuard = Guard<Cluster, ClusterArgs>;

/// Rule of the cluster machine
pub type ClusterRule = TransitionRule<ClusterMachine>;

/// Drives cluster transitions
#[derive(Clone)]
pub struct ClusterManager {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    machine: StateMachine<ClusterMachine>,
    handler: ClusterTransitionHandler,
    preprocessor: ClusterRefreshPreprocessor,
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl ClusterManager {
    /// Creates the manager and builds its state machine
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        validator: ClusterValidator,
        events: Arc<dyn EventSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let disabled = DisabledValidations::new::<ClusterValidationId>(&config.disabled_cluster_validations);
        let machine = new_cluster_state_machine(&config, &disabled);
        let handler = ClusterTransitionHandler::new(
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
            preprocessor: ClusterRefreshPreprocessor::new(validator, disabled),
        }
    }

    /// The cluster state machine
    #[must_use]
    pub fn machine(&self) -> &StateMachine<ClusterMachine> {
        &self.machine
    }

    /// Configuration the manager runs with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn run(
        &self,
        transition_type: ClusterTransitionType,
        cluster: &Cluster,
        args: &ClusterArgs,
    ) -> Result<Transition<ClusterStatus>> {
        self.machine.run(transition_type, cluster, args, &self.handler).await
    }

    async fn update_fields(&self, cluster: &Cluster, changes: ClusterChanges) -> Result<()> {
        let rows = self.store.update_cluster(cluster.id, Some(cluster.status), changes).await?;
        expect_updated(rows, "cluster", cluster.id, cluster.status)
    }

    /// Registers a new cluster; add-hosts clusters start in `adding-hosts`
    pub async fn register_cluster(&self, cluster: Cluster, now: DateTime<Utc>) -> Result<Transition<ClusterStatus>> {
        let cluster = Cluster {
            status: ClusterStatus::Unregistered,
            created_at: now,
            ..cluster
        };
        self.run(ClusterTransitionType::RegisterCluster, &cluster, &ClusterArgs::new(now))
            .await
    }

    /// Loads a cluster and refreshes it
    pub async fn refresh_status(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<ClusterStatus>> {
        let cluster = self.store.get_cluster(id).await?;
        self.refresh_cluster(&cluster, now).await
    }

    /// Re-evaluates validations and progress, then runs the refresh
    /// transition
    pub async fn refresh_cluster(&self, cluster: &Cluster, now: DateTime<Utc>) -> Result<Transition<ClusterStatus>> {
        let hosts = self.store.list_cluster_hosts(cluster.id).await?;
        let mut cluster = cluster.clone();
        self.refresh_progress(&mut cluster, &hosts).await?;

        let args = self.evaluate(&cluster, &hosts, now).await?;
        self.run(ClusterTransitionType::Refresh, &cluster, &args).await
    }

    async fn evaluate(&self, cluster: &Cluster, hosts: &[Host], now: DateTime<Utc>) -> Result<ClusterArgs> {
        let ctx = ClusterValidationContext::new(cluster, hosts, now);
        let outcome = self.preprocessor.preprocess(&ctx);
        if !outcome.validations.is_empty() {
            self.persist_validations(cluster, &outcome.validations, now).await?;
        }
        Ok(ClusterArgs {
            conditions: outcome.conditions,
            validations: outcome.validations,
            ..ClusterArgs::new(now)
        })
    }

    async fn persist_validations(
        &self,
        cluster: &Cluster,
        validations: &ValidationsInfo,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let previous = parse_validations_info(cluster.validations_info.as_deref()).unwrap_or_default();
        if previous == *validations {
            return Ok(());
        }
        for id in newly_failed(&previous, validations) {
            self.metrics.validation_failed("cluster", &id);
            self.events.add_event(
                cluster.id,
                Some(cluster.id),
                Severity::Warning,
                &format!("Cluster {}: validation '{id}' that used to succeed is now failing", cluster.name),
                now,
            );
        }
        let changes = ClusterChanges {
            validations_info: Some(Some(serde_json::to_string(validations)?)),
            ..ClusterChanges::default()
        };
        self.update_fields(cluster, changes).await
    }

    async fn refresh_progress(&self, cluster: &mut Cluster, hosts: &[Host]) -> Result<()> {
        let progress = compute_progress(cluster, hosts);
        if progress == cluster.progress {
            return Ok(());
        }
        let changes = ClusterChanges {
            progress: Some(progress.clone()),
            ..ClusterChanges::default()
        };
        self.update_fields(cluster, changes).await?;
        cluster.progress = progress;
        Ok(())
    }

    /// Starts preparing a ready cluster for installation
    pub async fn prepare_for_installation(&self, id: Uuid, now: DateTime<Utc>) -> Result<Transition<ClusterStatus>> {
        let cluster = self.store.get_cluster(id).await?;
        let hosts = self.store.list_cluster_hosts(id).await?;
        let args = self.evaluate(&cluster, &hosts, now).await?;
        self.run(ClusterTransitionType::PrepareForInstallation, &cluster, &args)
            .await
    }

    /// Cluster-level pre-install work finished
    pub async fn handle_pre_install_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.set_preparation_status(id, PreparationStatus::Succeeded, None, now)
            .await
    }

    /// Cluster-level pre-install work failed; the next refresh moves the
    /// cluster back to ready
    pub async fn handle_pre_install_error(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.set_preparation_status(id, PreparationStatus::Failed, Some(reason), now)
            .await
    }

    async fn set_preparation_status(
        &self,
        id: Uuid,
        status: PreparationStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changes = ClusterChanges {
            installation_preparation_completion_status: Some(status),
            ..ClusterChanges::default()
        };
        let rows = self
            .store
            .update_cluster(id, Some(ClusterStatus::PreparingForInstallation), changes)
            .await?;
        expect_updated(rows, "cluster", id, ClusterStatus::PreparingForInstallation)?;
        if let Some(reason) = reason {
            warn!("Cluster {id}: failed to prepare the installation: {reason}");
            self.events.add_event(
                id,
                Some(id),
                Severity::Warning,
                &format!("Failed to prepare the installation: {reason}"),
                now,
            );
        }
        Ok(())
    }

    /// Cancels the installation
    pub async fn cancel_installation(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Transition<ClusterStatus>> {
        let cluster = self.store.get_cluster(id).await?;
        let args = ClusterArgs::new(now).with_reason(format!("Installation was cancelled: {reason}"));
        self.run(ClusterTransitionType::CancelInstallation, &cluster, &args).await
    }

    /// Resets an installation back to `insufficient`
    pub async fn reset_cluster(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Transition<ClusterStatus>> {
        let cluster = self.store.get_cluster(id).await?;
        let args = ClusterArgs::new(now).with_reason(reason);
        self.run(ClusterTransitionType::ResetCluster, &cluster, &args).await
    }

    /// Completion reported by the installer controller
    pub async fn complete_installation(
        &self,
        id: Uuid,
        success: bool,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transition<ClusterStatus>> {
        let cluster = self.store.get_cluster(id).await?;
        let args = ClusterArgs {
            success,
            reason: reason.map(str::to_string),
            ..ClusterArgs::new(now)
        };
        self.run(ClusterTransitionType::CompleteInstallation, &cluster, &args)
            .await
    }

    /// Deletes a cluster and its hosts; refused while an installation is
    /// under way
    pub async fn deregister_cluster(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let cluster = self.store.get_cluster(id).await?;
        if INSTALLATION_STATUSES.contains(&cluster.status) {
            return Err(CoreError::Forbidden(format!(
                "Cluster {id} can not be removed while being installed (status {})",
                cluster.status
            )));
        }
        self.store.delete_cluster(id).await?;
        info!("Deregistered cluster {id}");
        self.events.add_event(
            id,
            Some(id),
            Severity::Info,
            &format!("Deregistered cluster {}", cluster.name),
            now,
        );
        Ok(())
    }

    /// Moves finalizing to `stage`; repeating the current stage is a no-op
    pub async fn update_finalizing_stage(&self, id: Uuid, stage: FinalizingStage, now: DateTime<Utc>) -> Result<()> {
        let cluster = self.store.get_cluster(id).await?;
        if cluster.status != ClusterStatus::Finalizing {
            return Err(CoreError::Conflict(format!(
                "Can't set finalizing stage <{stage}> to cluster in status <{}>",
                cluster.status
            )));
        }
        if cluster.progress.finalizing_stage == Some(stage) {
            return Ok(());
        }
        info!("Cluster {id}: finalizing stage {stage}");
        let changes = ClusterChanges {
            progress: Some(ClusterProgress {
                finalizing_stage: Some(stage),
                finalizing_stage_started_at: Some(now),
                finalizing_stage_timed_out: false,
                ..cluster.progress.clone()
            }),
            ..ClusterChanges::default()
        };
        self.update_fields(&cluster, changes).await
    }

    /// Records the status of a monitored operator
    pub async fn update_operator_status(&self, id: Uuid, name: &str, status: OperatorStatus) -> Result<()> {
        let cluster = self.store.get_cluster(id).await?;
        let mut operators = cluster.monitored_operators.clone();
        let Some(operator) = operators.iter_mut().find(|o| o.name == name) else {
            return Err(CoreError::InvalidArgument(format!(
                "Operator {name} is not monitored on cluster {id}"
            )));
        };
        if operator.status == Some(status) {
            return Ok(());
        }
        operator.status = Some(status);
        let changes = ClusterChanges {
            monitored_operators: Some(operators),
            ..ClusterChanges::default()
        };
        self.update_fields(&cluster, changes).await
    }

    /// Moves controller log collection forward
    pub async fn update_logs_progress(&self, id: Uuid, state: LogsState, now: DateTime<Utc>) -> Result<()> {
        let cluster = self.store.get_cluster(id).await?;
        let mut changes = ClusterChanges {
            logs_info: Some(state),
            ..ClusterChanges::default()
        };
        match state {
            LogsState::Requested => changes.controller_logs_started_at = Some(Some(now)),
            LogsState::Collecting | LogsState::Completed => changes.controller_logs_collected_at = Some(Some(now)),
            LogsState::Empty | LogsState::Timeout => {}
        }
        self.update_fields(&cluster, changes).await
    }
}
