//! Post-transition hooks of the cluster machine.

use crate::cluster::common::{
    update_cluster_status, STATUS_INFO_DEGRADED, STATUS_INFO_FINALIZING, STATUS_INFO_INSTALLED, STATUS_INFO_INSTALLING,
    STATUS_INFO_PREPARING_FOR_INSTALLATION, STATUS_INFO_RESET,
};
use crate::cluster::progress::completed;
use crate::cluster::{ClusterArgs, ClusterMachine};
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventSink, Severity};
use crate::metrics::MetricsSink;
use crate::models::{
    Cluster, ClusterProgress, ClusterStatus, FinalizingStage, LogsState, OperatorStatus, OperatorType,
    PreparationStatus,
};
use crate::state_machine::TransitionHandler;
use crate::store::{expect_updated, ClusterChanges, Store};
use crate::time::display_duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Action attached to a cluster transition rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterHook {
    /// Creates the row with a fixed status info
    Register(&'static str),
    /// Status change with a fixed status info
    Status(&'static str),
    /// Status change explained by the caller's reason, or the fallback
    Reason(&'static str),
    /// Starts preparing: stamps the start time and clears earlier results
    PrepareForInstallation,
    /// Every host prepared; the preparing share of progress is done
    StartInstalling,
    /// Enough hosts installed; finalizing starts in its first stage
    StartFinalizing,
    /// Installation succeeded
    Installed,
    /// Installation ended without success with a fixed status info, or the
    /// caller's reason when one is given
    Finished(&'static str),
    /// Finalizing stage took longer than allowed
    FinalizingTimedOut(&'static str),
    /// Finalizing stage took longer than allowed but must not fail the
    /// installation: warn once and stay
    SoftTimeout,
    /// Back to square one
    Reset,
    /// Controller log collection did not finish in time
    LogsTimeout,
}

/// Persists cluster transitions
#[derive(Clone)]
pub struct ClusterTransitionHandler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    config: Arc<Config>,
}

impl std::fmt::Debug for ClusterTransitionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterTransitionHandler").finish_non_exhaustive()
    }
}

/// Current finalizing stage and when it started; the status change time
/// stands in until a stage is reported
pub(crate) fn finalizing_stage(cluster: &Cluster) -> (FinalizingStage, DateTime<Utc>) {
    (
        cluster
            .progress
            .finalizing_stage
            .unwrap_or(FinalizingStage::WaitingForFinalizing),
        cluster
            .progress
            .finalizing_stage_started_at
            .unwrap_or(cluster.status_updated_at),
    )
}

fn installed_info(cluster: &Cluster) -> String {
    let failed: Vec<&str> = cluster
        .monitored_operators
        .iter()
        .filter(|o| o.operator_type == OperatorType::Olm && o.status == Some(OperatorStatus::Failed))
        .map(|o| o.name.as_str())
        .collect();
    if failed.is_empty() {
        STATUS_INFO_INSTALLED.to_string()
    } else {
        format!("{STATUS_INFO_DEGRADED}. Failed OLM operators: {}", failed.join(", "))
    }
}

impl ClusterTransitionHandler {
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
        cluster: &Cluster,
        src: ClusterStatus,
        dst: ClusterStatus,
        info: &str,
        changes: ClusterChanges,
        args: &ClusterArgs,
    ) -> Result<()> {
        update_cluster_status(
            self.store.as_ref(),
            self.events.as_ref(),
            cluster,
            src,
            dst,
            info,
            changes,
            args.now,
        )
        .await
    }

    /// Records the end of an installation, then writes the final status
    async fn finish(
        &self,
        cluster: &Cluster,
        src: ClusterStatus,
        dst: ClusterStatus,
        info: &str,
        mut changes: ClusterChanges,
        args: &ClusterArgs,
    ) -> Result<()> {
        changes.install_completed_at = Some(Some(args.now));
        self.set_status(cluster, src, dst, info, changes, args).await?;
        if src != dst {
            self.metrics.cluster_installation_finished(dst.as_str());
        }
        Ok(())
    }

    async fn register(&self, cluster: &Cluster, dst: ClusterStatus, info: &str, args: &ClusterArgs) -> Result<()> {
        let mut created = cluster.clone();
        created.status = dst;
        created.status_info = info.to_string();
        created.status_updated_at = args.now;
        info!("Register cluster {} ({}) as {dst}", cluster.id, cluster.name);
        self.store.create_cluster(created).await?;
        self.events.add_event(
            cluster.id,
            Some(cluster.id),
            Severity::Info,
            &format!("Registered cluster {}", cluster.name),
            args.now,
        );
        Ok(())
    }

    async fn finalizing_timed_out(
        &self,
        cluster: &Cluster,
        src: ClusterStatus,
        dst: ClusterStatus,
        template: &str,
        args: &ClusterArgs,
    ) -> Result<()> {
        let (stage, _) = finalizing_stage(cluster);
        let limit = self
            .config
            .timeouts
            .finalizing_stage(stage, &cluster.monitored_operators)
            .unwrap_or_default();
        let info = template
            .replacen("$STAGE", stage.as_str(), 1)
            .replacen("$MAX_TIME", &display_duration(limit), 1);
        self.finish(cluster, src, dst, &info, ClusterChanges::default(), args).await
    }

    async fn soft_timeout(&self, cluster: &Cluster, src: ClusterStatus, args: &ClusterArgs) -> Result<()> {
        let (stage, _) = finalizing_stage(cluster);
        let limit = self
            .config
            .timeouts
            .finalizing_stage(stage, &cluster.monitored_operators)
            .unwrap_or_default();
        let changes = ClusterChanges {
            progress: Some(ClusterProgress {
                finalizing_stage_timed_out: true,
                ..cluster.progress.clone()
            }),
            ..ClusterChanges::default()
        };
        let rows = self.store.update_cluster(cluster.id, Some(src), changes).await?;
        expect_updated(rows, "cluster", cluster.id, src)?;

        let message = format!(
            "Cluster {}: finalizing stage {stage} is taking longer than expected {}",
            cluster.name,
            display_duration(limit)
        );
        warn!("{}", message);
        self.events
            .add_event(cluster.id, Some(cluster.id), Severity::Warning, &message, args.now);
        Ok(())
    }
}

#[async_trait]
impl TransitionHandler<ClusterMachine> for ClusterTransitionHandler {
    async fn post_transition(
        &self,
        hook: Option<&ClusterHook>,
        cluster: &Cluster,
        src: ClusterStatus,
        dst: ClusterStatus,
        args: &ClusterArgs,
    ) -> Result<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        match hook {
            ClusterHook::Register(info) => self.register(cluster, dst, info, args).await,
            ClusterHook::Status(info) => {
                self.set_status(cluster, src, dst, info, ClusterChanges::default(), args)
                    .await
            }
            ClusterHook::Reason(fallback) => {
                let info = args.reason.as_deref().unwrap_or(fallback);
                self.set_status(cluster, src, dst, info, ClusterChanges::default(), args)
                    .await
            }
            ClusterHook::PrepareForInstallation => {
                let changes = ClusterChanges {
                    install_started_at: Some(Some(args.now)),
                    install_completed_at: Some(None),
                    installation_preparation_completion_status: Some(PreparationStatus::Pending),
                    progress: Some(ClusterProgress::default()),
                    ..ClusterChanges::default()
                };
                self.set_status(cluster, src, dst, STATUS_INFO_PREPARING_FOR_INSTALLATION, changes, args)
                    .await
            }
            ClusterHook::StartInstalling => {
                let progress = ClusterProgress {
                    preparing_for_installation_stage_percentage: 100,
                    total_percentage: cluster.progress.total_percentage.max(10),
                    ..cluster.progress.clone()
                };
                let changes = ClusterChanges {
                    progress: Some(progress),
                    ..ClusterChanges::default()
                };
                self.set_status(cluster, src, dst, STATUS_INFO_INSTALLING, changes, args)
                    .await
            }
            ClusterHook::StartFinalizing => {
                let progress = ClusterProgress {
                    preparing_for_installation_stage_percentage: 100,
                    installing_stage_percentage: 100,
                    total_percentage: cluster.progress.total_percentage.max(80),
                    finalizing_stage: Some(FinalizingStage::WaitingForFinalizing),
                    finalizing_stage_started_at: Some(args.now),
                    finalizing_stage_timed_out: false,
                    ..cluster.progress.clone()
                };
                let changes = ClusterChanges {
                    progress: Some(progress),
                    ..ClusterChanges::default()
                };
                self.set_status(cluster, src, dst, STATUS_INFO_FINALIZING, changes, args)
                    .await
            }
            ClusterHook::Installed => {
                let mut progress = completed(&cluster.progress);
                progress.finalizing_stage = Some(FinalizingStage::Done);
                let changes = ClusterChanges {
                    progress: Some(progress),
                    ..ClusterChanges::default()
                };
                let info = args.reason.clone().unwrap_or_else(|| installed_info(cluster));
                self.finish(cluster, src, dst, &info, changes, args).await
            }
            ClusterHook::Finished(fallback) => {
                let info = args.reason.as_deref().unwrap_or(fallback);
                self.finish(cluster, src, dst, info, ClusterChanges::default(), args)
                    .await
            }
            ClusterHook::FinalizingTimedOut(template) => {
                self.finalizing_timed_out(cluster, src, dst, template, args).await
            }
            ClusterHook::SoftTimeout => self.soft_timeout(cluster, src, args).await,
            ClusterHook::Reset => {
                let changes = ClusterChanges {
                    progress: Some(ClusterProgress::default()),
                    install_started_at: Some(None),
                    install_completed_at: Some(None),
                    installation_preparation_completion_status: Some(PreparationStatus::Pending),
                    logs_info: Some(LogsState::Empty),
                    controller_logs_started_at: Some(None),
                    controller_logs_collected_at: Some(None),
                    ..ClusterChanges::default()
                };
                let info = args.reason.as_deref().unwrap_or(STATUS_INFO_RESET);
                self.set_status(cluster, src, dst, info, changes, args).await
            }
            ClusterHook::LogsTimeout => {
                let changes = ClusterChanges {
                    logs_info: Some(LogsState::Timeout),
                    ..ClusterChanges::default()
                };
                let rows = self.store.update_cluster(cluster.id, Some(src), changes).await?;
                expect_updated(rows, "cluster", cluster.id, src)
            }
        }
    }
}
