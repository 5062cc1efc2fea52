//! Transition table of hosts bound to a cluster.
//!
//! Refresh rules are ordered from the most basic failure (no keepalive) to
//! the most specific success; the first rule whose guard holds wins.

use crate::conditions::DisabledValidations;
use crate::config::{Config, Timeouts};
use crate::error::CoreError;
use crate::host::common::*;
use crate::host::pool_state_machine::add_pool_rules;
use crate::host::refresh::HostCondition;
use crate::host::transition::HostHook;
use crate::host::{HostArgs, HostGuard, HostMachine, HostRule, HostTransitionType};
use crate::models::{Host, HostRole, HostStage, HostStatus, LogsState};
use crate::state_machine::{StateMachine, StateMachineBuilder};
use crate::time::timed_out;
use crate::validation::HostValidationId;
use std::sync::Arc;
use std::time::Duration;

use HostStatus::*;
use HostTransitionType as T;

/// Validations a host must pass before anything else is looked at
pub const MIN_REQUIRED_HARDWARE: &[HostValidationId] = &[
    HostValidationId::HasMinValidDisks,
    HostValidationId::HasMinCpuCores,
    HostValidationId::HasMinMemory,
];

/// Validations that fail only because the user has not provided input yet
pub const REQUIRED_INPUT: &[HostValidationId] = &[HostValidationId::MachineCidrDefined];

/// Validations that gate installation once the inputs are there
pub const SUFFICIENT_FOR_INSTALL: &[HostValidationId] = &[
    HostValidationId::HasCpuCoresForRole,
    HostValidationId::HasMemoryForRole,
    HostValidationId::HostnameUnique,
    HostValidationId::HostnameValid,
    HostValidationId::BelongsToMachineCidr,
    HostValidationId::BelongsToMajorityGroup,
    HostValidationId::NtpSynced,
    HostValidationId::ContainerImagesAvailable,
    HostValidationId::SufficientInstallationDiskSpeed,
    HostValidationId::ApiVipConnected,
    HostValidationId::LsoRequirementsSatisfied,
    HostValidationId::OdfRequirementsSatisfied,
    HostValidationId::CnvRequirementsSatisfied,
];

/// Bound pre-installation statuses in which refresh re-evaluates validations
const PRE_INSTALL: &[HostStatus] = &[Discovering, Insufficient, Known, PendingForInput, Disconnected];

const PREPARING: &[HostStatus] = &[PreparingForInstallation, PreparingSuccessful];

/// Builds the machine for bound and pool hosts
#[must_use]
pub fn new_host_state_machine(config: &Config, disabled: &DisabledValidations) -> StateMachine<HostMachine> {
    let mut builder = StateMachineBuilder::new();
    add_registration_rules(&mut builder);
    add_user_rules(&mut builder);
    add_progress_rules(&mut builder);
    add_refresh_rules(&mut builder, &config.timeouts, disabled);
    add_pool_rules(&mut builder, disabled);
    builder.build()
}

pub(crate) fn cond(id: impl AsRef<str>) -> HostGuard {
    HostGuard::condition(id.as_ref())
}

pub(crate) fn validation(id: HostValidationId) -> HostGuard {
    cond(id.as_str())
}

fn derived(id: HostCondition) -> HostGuard {
    cond(id.as_str())
}

fn bound() -> HostGuard {
    HostGuard::check("bound-to-cluster", |host: &Host, _| Ok(host.cluster_id.is_some()))
}

fn day2() -> HostGuard {
    HostGuard::check("day2-host", |host: &Host, _| Ok(host.is_day2()))
}

fn rebooting() -> HostGuard {
    HostGuard::check("stage-rebooting", |host: &Host, _| {
        Ok(host.progress.current_stage == Some(HostStage::Rebooting))
    })
}

fn role_installable() -> HostGuard {
    HostGuard::check("valid-role-for-installation", |host: &Host, _| {
        if matches!(host.role, HostRole::Master | HostRole::Worker) {
            Ok(true)
        } else {
            Err(CoreError::Conflict(format!(
                "Can't install host {} due to invalid host role: {}, should be one of [master worker]",
                host.id, host.role
            )))
        }
    })
}

fn reported_stage(label: &'static str, stages: &'static [HostStage]) -> HostGuard {
    HostGuard::check(label, move |_, args: &HostArgs| {
        Ok(args.progress.as_ref().is_some_and(|p| stages.contains(&p.stage)))
    })
}

fn installation_timed_out(limit: Duration) -> HostGuard {
    HostGuard::check("installation-timed-out", move |host: &Host, args: &HostArgs| {
        Ok(timed_out(args.now, host.status_updated_at, limit))
    })
}

fn stage_timed_out(timeouts: Arc<Timeouts>) -> HostGuard {
    HostGuard::check("installation-stage-timed-out", move |host: &Host, args: &HostArgs| {
        let limit = timeouts.host_stage(host.progress.current_stage, args.single_node);
        let since = host.progress.stage_updated_at.unwrap_or(host.status_updated_at);
        Ok(timed_out(args.now, since, limit))
    })
}

fn logs_timed_out(pending: Duration, collection: Duration) -> HostGuard {
    HostGuard::check("logs-timed-out", move |host: &Host, args: &HostArgs| {
        Ok(match host.logs_info {
            LogsState::Requested => host.logs_started_at.is_some_and(|at| timed_out(args.now, at, pending)),
            LogsState::Collecting => host
                .logs_collected_at
                .or(host.logs_started_at)
                .is_some_and(|at| timed_out(args.now, at, collection)),
            _ => false,
        })
    })
}

fn add_registration_rules(sm: &mut StateMachineBuilder<HostMachine>) {
    sm.add(
        HostRule::new("register-new-host", T::RegisterHost, [Unregistered], Discovering)
            .when(bound())
            .then(HostHook::Register),
    )
    .add(
        HostRule::new(
            "re-register-host",
            T::RegisterHost,
            [
                Discovering,
                Known,
                Disconnected,
                Insufficient,
                PendingForInput,
                Resetting,
                ResettingPendingUserAction,
                PreparingForInstallation,
                PreparingSuccessful,
                Binding,
            ],
            Discovering,
        )
        .then(HostHook::Register),
    )
    .add(
        HostRule::new(
            "register-during-reboot",
            T::RegisterHost,
            [Installing, InstallingInProgress],
            InstallingPendingUserAction,
        )
        .when(rebooting())
        .then(HostHook::RegisterDuringReboot),
    )
    .add(
        HostRule::new(
            "register-pending-user-action",
            T::RegisterHost,
            [InstallingPendingUserAction],
            InstallingPendingUserAction,
        )
        .then(HostHook::RegisterDuringReboot),
    )
    .add(
        HostRule::new("register-during-installation", T::RegisterHost, [Installing, InstallingInProgress], Error)
            .then(HostHook::RegisterDuringInstallation(STATUS_INFO_UNEXPECTED_RESTART)),
    )
    .add(HostRule::new("register-after-failure", T::RegisterHost, [Error], Error))
    .add(HostRule::new("register-cancelled", T::RegisterHost, [Cancelled], Cancelled))
    .add(HostRule::new("register-disabled", T::RegisterHost, [Disabled], Disabled))
    .add(
        HostRule::new("register-installed-host", T::RegisterInstalledHost, [Unregistered], Installed)
            .then(HostHook::RegisterInstalled),
    );
}

fn add_user_rules(sm: &mut StateMachineBuilder<HostMachine>) {
    sm.add(
        HostRule::new("install-host", T::InstallHost, [Known, PreparingSuccessful], Installing)
            .when(role_installable())
            .then(HostHook::Status(STATUS_INFO_INSTALLING)),
    )
    .add(HostRule::new("disable-host", T::DisableHost, PRE_INSTALL, HostStatus::Disabled).then(HostHook::Status(STATUS_INFO_DISABLED)))
    .add(HostRule::new("enable-host", T::EnableHost, [HostStatus::Disabled], Discovering).then(HostHook::Enable))
    .add(
        HostRule::new(
            "cancel-installation",
            T::CancelInstallation,
            [Installing, InstallingInProgress, InstallingPendingUserAction, Error, Cancelled],
            Cancelled,
        )
        .then(HostHook::Reason),
    )
    .add(HostRule::new("cancel-preparation", T::CancelInstallation, PREPARING, Known).then(HostHook::Reason))
    .add(HostRule::new(
        "cancel-disabled",
        T::CancelInstallation,
        [HostStatus::Disabled],
        HostStatus::Disabled,
    ))
    .add(
        HostRule::new(
            "reset-host",
            T::ResetHost,
            [
                Installing,
                InstallingInProgress,
                InstallingPendingUserAction,
                Error,
                Cancelled,
                AddedToExistingCluster,
                PreparingForInstallation,
                PreparingSuccessful,
            ],
            Resetting,
        )
        .then(HostHook::Reset),
    )
    .add(HostRule::new("reset-disabled", T::ResetHost, [HostStatus::Disabled], HostStatus::Disabled))
    .add(
        HostRule::new(
            "resetting-pending-user-action",
            T::ResettingPendingUserAction,
            [
                Resetting,
                Discovering,
                Known,
                Insufficient,
                PendingForInput,
                Disconnected,
                Installing,
                InstallingInProgress,
                InstallingPendingUserAction,
                PreparingForInstallation,
                PreparingSuccessful,
                Error,
                Cancelled,
                AddedToExistingCluster,
            ],
            ResettingPendingUserAction,
        )
        .then(HostHook::Status(STATUS_INFO_RESETTING_PENDING_USER_ACTION)),
    )
    .add(
        HostRule::new(
            "installation-failed",
            T::HostInstallationFailed,
            [Installing, InstallingInProgress, PreparingForInstallation, PreparingSuccessful],
            Error,
        )
        .then(HostHook::Reason),
    )
    .add(
        HostRule::new("media-disconnected-pre-install", T::MediaDisconnected, PRE_INSTALL, Disconnected)
            .then(HostHook::MediaDisconnected),
    )
    .add(
        HostRule::new(
            "media-disconnected-during-install",
            T::MediaDisconnected,
            [PreparingForInstallation, PreparingSuccessful, Installing, InstallingInProgress],
            Error,
        )
        .then(HostHook::MediaDisconnected),
    );
}

fn add_progress_rules(sm: &mut StateMachineBuilder<HostMachine>) {
    const DONE: &[HostStage] = &[HostStage::Done];
    const FAILED: &[HostStage] = &[HostStage::Failed];
    const REBOOTING: &[HostStage] = &[HostStage::Rebooting];

    sm.add(
        HostRule::new("progress-done", T::UpdateInstallProgress, INSTALL_PROGRESS_STATUSES, Installed)
            .when(HostGuard::all(vec![
                reported_stage("reported-stage-done", DONE),
                HostGuard::not(day2()),
            ]))
            .then(HostHook::InstallProgress),
    )
    .add(
        HostRule::new(
            "progress-done-day2",
            T::UpdateInstallProgress,
            INSTALL_PROGRESS_STATUSES,
            AddedToExistingCluster,
        )
        .when(HostGuard::all(vec![
            HostGuard::any(vec![
                reported_stage("reported-stage-done", DONE),
                reported_stage("reported-stage-rebooting", REBOOTING),
            ]),
            day2(),
        ]))
        .then(HostHook::InstallProgress),
    )
    .add(
        HostRule::new("progress-failed", T::UpdateInstallProgress, INSTALL_PROGRESS_STATUSES, Error)
            .when(reported_stage("reported-stage-failed", FAILED))
            .then(HostHook::InstallProgress),
    )
    .add(
        HostRule::new(
            "progress-in-progress",
            T::UpdateInstallProgress,
            INSTALL_PROGRESS_STATUSES,
            InstallingInProgress,
        )
        .then(HostHook::InstallProgress),
    );
}

fn add_refresh_rules(sm: &mut StateMachineBuilder<HostMachine>, timeouts: &Timeouts, disabled: &DisabledValidations) {
    let connected = validation(HostValidationId::Connected);
    let media = validation(HostValidationId::MediaConnected);
    let has_inventory = validation(HostValidationId::HasInventory);
    let min_hw: HostGuard = disabled.all_enabled(MIN_REQUIRED_HARDWARE);
    let inputs: HostGuard = disabled.all_enabled(REQUIRED_INPUT);
    let sufficient: HostGuard = disabled.all_enabled(SUFFICIENT_FOR_INSTALL);
    let all_good = HostGuard::all(vec![
        connected.clone(),
        media.clone(),
        has_inventory.clone(),
        min_hw.clone(),
        inputs.clone(),
        sufficient.clone(),
    ]);
    let preparing = derived(HostCondition::ClusterPreparingForInstallation);
    let installing = derived(HostCondition::ClusterInstalling);

    let refresh_sources = [PRE_INSTALL, PREPARING].concat();

    sm.add(
        HostRule::new("refresh-disconnected", T::Refresh, refresh_sources.clone(), Disconnected)
            .when(HostGuard::not(connected.clone()))
            .then(HostHook::Status(STATUS_INFO_DISCONNECTED)),
    )
    .add(
        HostRule::new("refresh-media-disconnected", T::Refresh, refresh_sources, Disconnected)
            .when(HostGuard::not(media.clone()))
            .then(HostHook::Status(STATUS_INFO_MEDIA_DISCONNECTED)),
    )
    .add(
        HostRule::new("refresh-discovering", T::Refresh, PRE_INSTALL, Discovering)
            .when(HostGuard::all(vec![
                connected.clone(),
                media.clone(),
                HostGuard::not(has_inventory.clone()),
            ]))
            .then(HostHook::Status(STATUS_INFO_DISCOVERING)),
    )
    .add(
        HostRule::new("refresh-insufficient-hardware", T::Refresh, PRE_INSTALL, Insufficient)
            .when(HostGuard::all(vec![
                connected.clone(),
                media.clone(),
                has_inventory.clone(),
                HostGuard::not(min_hw.clone()),
            ]))
            .then(HostHook::Status(STATUS_INFO_INSUFFICIENT_HARDWARE)),
    )
    .add(
        HostRule::new("refresh-pending-for-input", T::Refresh, PRE_INSTALL, PendingForInput)
            .when(HostGuard::all(vec![
                connected.clone(),
                media.clone(),
                has_inventory.clone(),
                min_hw.clone(),
                HostGuard::not(inputs.clone()),
            ]))
            .then(HostHook::Status(STATUS_INFO_PENDING_FOR_INPUT)),
    )
    .add(
        HostRule::new("refresh-not-ready", T::Refresh, PRE_INSTALL, Insufficient)
            .when(HostGuard::all(vec![
                connected.clone(),
                media.clone(),
                has_inventory.clone(),
                min_hw.clone(),
                inputs.clone(),
                HostGuard::not(sufficient.clone()),
            ]))
            .then(HostHook::Refresh(STATUS_INFO_NOT_READY_FOR_INSTALL)),
    )
    .add(
        HostRule::new("refresh-start-preparing", T::Refresh, [Known], PreparingForInstallation)
            .when(HostGuard::all(vec![
                all_good.clone(),
                preparing.clone(),
                derived(HostCondition::ValidRoleForInstallation),
            ]))
            .then(HostHook::Status(STATUS_INFO_PREPARING_FOR_INSTALLATION)),
    )
    .add(
        HostRule::new("refresh-known", T::Refresh, PRE_INSTALL, Known)
            .when(all_good.clone())
            .then(HostHook::Status(STATUS_INFO_KNOWN)),
    );

    // Preparation
    sm.add(
        HostRule::new("refresh-start-installing", T::Refresh, [PreparingSuccessful], Installing)
            .when(HostGuard::all(vec![connected.clone(), installing.clone()]))
            .then(HostHook::Status(STATUS_INFO_INSTALLING)),
    )
    .add(
        HostRule::new("refresh-preparing-timed-out", T::Refresh, [PreparingForInstallation], Known)
            .when(HostGuard::not(preparing.clone()))
            .then(HostHook::Status(STATUS_INFO_PREPARING_TIMED_OUT)),
    )
    .add(
        HostRule::new("refresh-preparing-successful-aborted", T::Refresh, [PreparingSuccessful], Known)
            .when(HostGuard::all(vec![
                HostGuard::not(preparing.clone()),
                HostGuard::not(installing),
            ]))
            .then(HostHook::Status(STATUS_INFO_PREPARING_TIMED_OUT)),
    )
    .add(
        HostRule::new("refresh-preparing-failed", T::Refresh, [PreparingForInstallation], Insufficient)
            .when(HostGuard::all(vec![
                preparing.clone(),
                HostGuard::not(HostGuard::all(vec![
                    disabled.all_enabled(&[HostValidationId::SufficientInstallationDiskSpeed]),
                    disabled.all_enabled(&[HostValidationId::ContainerImagesAvailable]),
                ])),
            ]))
            .then(HostHook::Refresh(STATUS_INFO_NOT_READY_FOR_INSTALL)),
    )
    .add(
        HostRule::new("refresh-preparing-done", T::Refresh, [PreparingForInstallation], PreparingSuccessful)
            .when(HostGuard::all(vec![
                preparing,
                derived(HostCondition::InstallationDiskSpeedCheckSuccessful),
                derived(HostCondition::SuccessfulContainerImageAvailability),
            ]))
            .then(HostHook::Status(STATUS_INFO_PREPARING_SUCCESSFUL)),
    )
    .add(HostRule::new(
        "refresh-preparing",
        T::Refresh,
        [PreparingForInstallation],
        PreparingForInstallation,
    ))
    .add(HostRule::new(
        "refresh-preparing-successful",
        T::Refresh,
        [PreparingSuccessful],
        PreparingSuccessful,
    ));

    // Installation
    let timeouts = Arc::new(timeouts.clone());
    sm.add(
        HostRule::new(
            "refresh-cluster-error",
            T::Refresh,
            [Installing, InstallingInProgress, InstallingPendingUserAction, Installed],
            Error,
        )
        .when(HostGuard::all(vec![
            derived(HostCondition::ClusterInError),
            HostGuard::not(day2()),
        ]))
        .then(HostHook::Status(STATUS_INFO_ABORTING_DUE_CLUSTER_ERRORS)),
    )
    .add(
        HostRule::new("refresh-installation-timed-out", T::Refresh, [Installing], Error)
            .when(installation_timed_out(timeouts.host_installation))
            .then(HostHook::Status(STATUS_INFO_INSTALLATION_TIMED_OUT)),
    )
    .add(HostRule::new("refresh-installing", T::Refresh, [Installing], Installing))
    .add(
        HostRule::new(
            "refresh-wrong-boot-order",
            T::Refresh,
            [InstallingInProgress],
            InstallingInProgress,
        )
        .when(HostGuard::all(vec![
            derived(HostCondition::StageInWrongBootStages),
            derived(HostCondition::ClusterPendingUserAction),
        ]))
        .then(HostHook::RefreshStageUpdateTime),
    )
    .add(
        HostRule::new("refresh-stage-timed-out", T::Refresh, [InstallingInProgress], Error)
            .when(stage_timed_out(Arc::clone(&timeouts)))
            .then(HostHook::Refresh(STATUS_INFO_INSTALLATION_IN_PROGRESS_TIMED_OUT)),
    )
    .add(HostRule::new(
        "refresh-installing-in-progress",
        T::Refresh,
        [InstallingInProgress],
        InstallingInProgress,
    ));

    // Final and waiting statuses
    let logs = logs_timed_out(timeouts.host_log_pending, timeouts.host_log_collection);
    for status in [Error, Cancelled] {
        sm.add(
            HostRule::new("refresh-logs-timed-out", T::Refresh, [status], status)
                .when(logs.clone())
                .then(HostHook::LogsTimeout),
        );
    }
    for status in [
        Error,
        Cancelled,
        InstallingPendingUserAction,
        Installed,
        AddedToExistingCluster,
        Resetting,
        ResettingPendingUserAction,
        HostStatus::Disabled,
    ] {
        sm.add(HostRule::new("refresh-no-op", T::Refresh, [status], status));
    }
}
