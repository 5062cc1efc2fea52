//! Transition table of clusters.

use crate::cluster::common::*;
use crate::cluster::refresh::ClusterCondition;
use crate::cluster::transition::{finalizing_stage, ClusterHook};
use crate::cluster::{ClusterArgs, ClusterGuard, ClusterMachine, ClusterRule, ClusterTransitionType};
use crate::conditions::DisabledValidations;
use crate::config::{Config, Timeouts};
use crate::models::{Cluster, ClusterKind, ClusterStatus, LogsState};
use crate::state_machine::{StateMachine, StateMachineBuilder};
use crate::time::timed_out;
use crate::validation::ClusterValidationId;
use std::sync::Arc;
use std::time::Duration;

use ClusterStatus::*;
use ClusterTransitionType as T;

/// Settings the user must provide before anything else is checked
pub const REQUIRED_INPUT: &[ClusterValidationId] = &[
    ClusterValidationId::MachineCidrDefined,
    ClusterValidationId::ClusterCidrDefined,
    ClusterValidationId::ServiceCidrDefined,
    ClusterValidationId::DnsDomainDefined,
    ClusterValidationId::PullSecretSet,
];

/// VIPs the user provides, unless they are allocated over DHCP
pub const VIPS_DEFINED: &[ClusterValidationId] = &[
    ClusterValidationId::ApiVipsDefined,
    ClusterValidationId::IngressVipsDefined,
];

/// Validations that gate installation once the inputs are there, host
/// readiness aside
pub const SUFFICIENT_FOR_INSTALL: &[ClusterValidationId] = &[
    ClusterValidationId::ApiVipsValid,
    ClusterValidationId::IngressVipsValid,
    ClusterValidationId::MachineCidrEqualsToCalculatedCidr,
    ClusterValidationId::NoCidrsOverlapping,
    ClusterValidationId::NetworkPrefixValid,
    ClusterValidationId::NetworkTypeValid,
    ClusterValidationId::NetworksSameAddressFamilies,
    ClusterValidationId::NtpServerConfigured,
    ClusterValidationId::SufficientMastersCount,
    ClusterValidationId::LsoRequirementsSatisfied,
    ClusterValidationId::OdfRequirementsSatisfied,
    ClusterValidationId::CnvRequirementsSatisfied,
];

const EDITABLE: &[ClusterStatus] = &[PendingForInput, Insufficient, Ready];

/// Builds the cluster machine
#[must_use]
pub fn new_cluster_state_machine(config: &Config, disabled: &DisabledValidations) -> StateMachine<ClusterMachine> {
    let mut builder = StateMachineBuilder::new();
    add_user_rules(&mut builder, disabled);
    add_refresh_rules(&mut builder, config, disabled);
    builder.build()
}

fn derived(id: ClusterCondition) -> ClusterGuard {
    ClusterGuard::condition(id.as_str())
}

fn day2() -> ClusterGuard {
    ClusterGuard::check("add-hosts-cluster", |cluster: &Cluster, _| {
        Ok(cluster.kind == ClusterKind::AddHostsCluster)
    })
}

fn succeeded() -> ClusterGuard {
    ClusterGuard::check("installation-succeeded", |_, args: &ClusterArgs| Ok(args.success))
}

fn prepare_timed_out(limit: Duration) -> ClusterGuard {
    ClusterGuard::check("preparation-timed-out", move |cluster: &Cluster, args: &ClusterArgs| {
        Ok(timed_out(args.now, cluster.status_updated_at, limit))
    })
}

fn installation_timed_out(limit: Duration) -> ClusterGuard {
    ClusterGuard::check("installation-timed-out", move |cluster: &Cluster, args: &ClusterArgs| {
        let since = cluster.install_started_at.unwrap_or(cluster.status_updated_at);
        Ok(timed_out(args.now, since, limit))
    })
}

fn finalizing_stage_timed_out(timeouts: Arc<Timeouts>) -> ClusterGuard {
    ClusterGuard::check("finalizing-stage-timed-out", move |cluster: &Cluster, args: &ClusterArgs| {
        let (stage, since) = finalizing_stage(cluster);
        Ok(timeouts
            .finalizing_stage(stage, &cluster.monitored_operators)
            .is_some_and(|limit| timed_out(args.now, since, limit)))
    })
}

/// Timeouts of this stage only warn
fn soft_stage(soft_timeouts: bool) -> ClusterGuard {
    ClusterGuard::check("finalizing-stage-non-failing", move |cluster: &Cluster, _| {
        Ok(soft_timeouts || finalizing_stage(cluster).0.is_non_failing())
    })
}

fn already_warned() -> ClusterGuard {
    ClusterGuard::check("finalizing-stage-warned", |cluster: &Cluster, _| {
        Ok(cluster.progress.finalizing_stage_timed_out)
    })
}

fn logs_timed_out(pending: Duration, collection: Duration) -> ClusterGuard {
    ClusterGuard::check("logs-timed-out", move |cluster: &Cluster, args: &ClusterArgs| {
        Ok(match cluster.logs_info {
            LogsState::Requested => cluster
                .controller_logs_started_at
                .is_some_and(|at| timed_out(args.now, at, pending)),
            LogsState::Collecting => cluster
                .controller_logs_collected_at
                .or(cluster.controller_logs_started_at)
                .is_some_and(|at| timed_out(args.now, at, collection)),
            _ => false,
        })
    })
}

/// Guards of the editable statuses: required input, sufficient for install
/// and hosts ready. Without DHCP allocation the VIPs are user input; with it
/// they only gate installation.
fn ready_guards(disabled: &DisabledValidations) -> (ClusterGuard, ClusterGuard, ClusterGuard) {
    let dhcp = derived(ClusterCondition::VipDhcpAllocationSet);
    let vips: ClusterGuard = disabled.all_enabled(VIPS_DEFINED);
    (
        ClusterGuard::all(vec![
            disabled.all_enabled(REQUIRED_INPUT),
            ClusterGuard::any(vec![dhcp, vips.clone()]),
        ]),
        ClusterGuard::all(vec![disabled.all_enabled(SUFFICIENT_FOR_INSTALL), vips]),
        disabled.all_enabled(&[ClusterValidationId::AllHostsAreReadyToInstall]),
    )
}

fn add_user_rules(sm: &mut StateMachineBuilder<ClusterMachine>, disabled: &DisabledValidations) {
    let (inputs, sufficient, hosts_ready) = ready_guards(disabled);

    sm.add(
        ClusterRule::new("register-add-hosts-cluster", T::RegisterCluster, [Unregistered], AddingHosts)
            .when(day2())
            .then(ClusterHook::Register(STATUS_INFO_ADDING_HOSTS)),
    )
    .add(
        ClusterRule::new("register-cluster", T::RegisterCluster, [Unregistered], Insufficient)
            .then(ClusterHook::Register(STATUS_INFO_INSUFFICIENT)),
    )
    .add(
        ClusterRule::new(
            "prepare-for-installation",
            T::PrepareForInstallation,
            [Ready],
            PreparingForInstallation,
        )
        .when(ClusterGuard::all(vec![inputs, sufficient, hosts_ready]))
        .then(ClusterHook::PrepareForInstallation),
    )
    .add(
        ClusterRule::new("cancel-preparation", T::CancelInstallation, [PreparingForInstallation], Ready)
            .then(ClusterHook::Reason(STATUS_INFO_READY)),
    )
    .add(
        ClusterRule::new(
            "cancel-installation",
            T::CancelInstallation,
            [Installing, InstallingPendingUserAction, Finalizing, Error],
            Cancelled,
        )
        .then(ClusterHook::Finished("Installation was cancelled")),
    )
    .add(
        ClusterRule::new(
            "reset-cluster",
            T::ResetCluster,
            [
                PreparingForInstallation,
                Installing,
                InstallingPendingUserAction,
                Finalizing,
                Error,
                Cancelled,
            ],
            Insufficient,
        )
        .then(ClusterHook::Reset),
    )
    .add(
        ClusterRule::new("complete-installation", T::CompleteInstallation, [Finalizing], Installed)
            .when(succeeded())
            .then(ClusterHook::Installed),
    )
    .add(
        ClusterRule::new("complete-installation-failed", T::CompleteInstallation, [Finalizing], Error)
            .when(ClusterGuard::not(succeeded()))
            .then(ClusterHook::Finished("Installation failed")),
    );
}

fn add_refresh_rules(sm: &mut StateMachineBuilder<ClusterMachine>, config: &Config, disabled: &DisabledValidations) {
    let (inputs, sufficient, hosts_ready) = ready_guards(disabled);

    sm.add(
        ClusterRule::new("refresh-pending-for-input", T::Refresh, EDITABLE, PendingForInput)
            .when(ClusterGuard::not(inputs))
            .then(ClusterHook::Status(STATUS_INFO_PENDING_FOR_INPUT)),
    )
    .add(
        ClusterRule::new("refresh-insufficient", T::Refresh, EDITABLE, Insufficient)
            .when(ClusterGuard::not(ClusterGuard::all(vec![sufficient, hosts_ready])))
            .then(ClusterHook::Status(STATUS_INFO_INSUFFICIENT)),
    )
    .add(
        ClusterRule::new("refresh-ready", T::Refresh, EDITABLE, Ready)
            .then(ClusterHook::Status(STATUS_INFO_READY)),
    );

    // Preparation
    let timeouts = Arc::new(config.timeouts.clone());
    let unpreparing = derived(ClusterCondition::UnPreparingHostsExist);
    let failed_preparing = derived(ClusterCondition::FailedPreparingHostsExist);
    sm.add(
        ClusterRule::new("refresh-preparing-timed-out", T::Refresh, [PreparingForInstallation], Ready)
            .when(ClusterGuard::all(vec![
                prepare_timed_out(timeouts.cluster_prepare),
                ClusterGuard::not(failed_preparing.clone()),
            ]))
            .then(ClusterHook::Status(STATUS_INFO_PREPARING_TIMED_OUT)),
    )
    .add(
        ClusterRule::new("refresh-start-installing", T::Refresh, [PreparingForInstallation], Installing)
            .when(ClusterGuard::all(vec![
                derived(ClusterCondition::AllHostsPreparedSuccessfully),
                derived(ClusterCondition::ClusterPreparationSucceeded),
            ]))
            .then(ClusterHook::StartInstalling),
    )
    .add(
        ClusterRule::new("refresh-preparing-unpreparing-hosts", T::Refresh, [PreparingForInstallation], Insufficient)
            .when(unpreparing.clone())
            .then(ClusterHook::Status(STATUS_INFO_UNPREPARING_HOST_EXISTS)),
    )
    .add(
        ClusterRule::new("refresh-preparing-failed", T::Refresh, [PreparingForInstallation], Ready)
            .when(ClusterGuard::any(vec![
                failed_preparing,
                ClusterGuard::all(vec![
                    ClusterGuard::not(unpreparing),
                    derived(ClusterCondition::ClusterPreparationFailed),
                ]),
            ]))
            .then(ClusterHook::Status(STATUS_INFO_PREPARING_FAILED)),
    )
    .add(ClusterRule::new(
        "refresh-preparing",
        T::Refresh,
        [PreparingForInstallation],
        PreparingForInstallation,
    ));

    // Installation
    let pending_user_action = derived(ClusterCondition::HostsPendingUserAction);
    sm.add(
        ClusterRule::new(
            "refresh-installation-timed-out",
            T::Refresh,
            [InstallingPendingUserAction],
            Error,
        )
        .when(installation_timed_out(timeouts.cluster_installation))
        .then(ClusterHook::Finished(STATUS_INFO_INSTALLATION_TIMED_OUT)),
    )
    .add(
        ClusterRule::new(
            "refresh-hosts-failed",
            T::Refresh,
            [Installing, InstallingPendingUserAction],
            Error,
        )
        .when(derived(ClusterCondition::InstallationCannotComplete))
        .then(ClusterHook::Finished(STATUS_INFO_HOSTS_FAILED)),
    )
    .add(
        ClusterRule::new("refresh-finalizing", T::Refresh, [Installing], Finalizing)
            .when(derived(ClusterCondition::SufficientHostsInstalled))
            .then(ClusterHook::StartFinalizing),
    )
    .add(
        ClusterRule::new("refresh-pending-user-action", T::Refresh, [Installing], InstallingPendingUserAction)
            .when(pending_user_action.clone())
            .then(ClusterHook::Status(STATUS_INFO_INSTALLING_PENDING_USER_ACTION)),
    )
    .add(
        ClusterRule::new("refresh-user-action-resolved", T::Refresh, [InstallingPendingUserAction], Installing)
            .when(ClusterGuard::not(pending_user_action))
            .then(ClusterHook::Status(STATUS_INFO_INSTALLING)),
    );

    // Finalizing
    let stage_timed_out = finalizing_stage_timed_out(Arc::clone(&timeouts));
    let soft = soft_stage(config.enable_soft_timeouts);
    sm.add(
        ClusterRule::new("refresh-finalizing-done", T::Refresh, [Finalizing], Installed)
            .when(derived(ClusterCondition::OperatorsSettled))
            .then(ClusterHook::Installed),
    )
    .add(
        ClusterRule::new("refresh-finalizing-timed-out", T::Refresh, [Finalizing], Error)
            .when(ClusterGuard::all(vec![
                stage_timed_out.clone(),
                ClusterGuard::not(soft.clone()),
            ]))
            .then(ClusterHook::FinalizingTimedOut(STATUS_INFO_FINALIZING_TIMED_OUT)),
    )
    .add(
        ClusterRule::new("refresh-finalizing-soft-timeout", T::Refresh, [Finalizing], Finalizing)
            .when(ClusterGuard::all(vec![
                stage_timed_out,
                soft,
                ClusterGuard::not(already_warned()),
            ]))
            .then(ClusterHook::SoftTimeout),
    );

    // Final statuses
    let logs = logs_timed_out(timeouts.cluster_log_pending, timeouts.cluster_log_collection);
    for status in [Error, Cancelled, Installed] {
        sm.add(
            ClusterRule::new("refresh-logs-timed-out", T::Refresh, [status], status)
                .when(logs.clone())
                .then(ClusterHook::LogsTimeout),
        );
    }
    for status in [
        Installing,
        InstallingPendingUserAction,
        Finalizing,
        Error,
        Cancelled,
        Installed,
        AddingHosts,
    ] {
        sm.add(ClusterRule::new("refresh-no-op", T::Refresh, [status], status));
    }
}
