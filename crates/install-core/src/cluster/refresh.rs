//! Cluster refresh preprocessing.
//!
//! Validations only run while the cluster can still be edited or is being
//! prepared; the derived conditions over the cluster's hosts are computed
//! on every pass.

use crate::conditions::{Conditions, DisabledValidations};
use crate::host::refresh::RefreshOutcome;
use crate::models::{
    ClusterStatus, Host, HostRole, HostStatus, OperatorStatus, OperatorType, PreparationStatus,
    MIN_WORKERS_NEEDED_FOR_INSTALLATION,
};
use crate::validation::{
    group_results, ClusterValidationContext, ClusterValidationId, ClusterValidator, ValidationStatus, ValidationsInfo,
    VALIDATION_DISABLED_MESSAGE,
};

string_enum! {
    /// Boolean conditions derived from the cluster and its hosts
    pub enum ClusterCondition {
        VipDhcpAllocationSet => "vip-dhcp-allocation-set",
        AllHostsPreparedSuccessfully => "all-hosts-prepared-successfully",
        UnPreparingHostsExist => "unpreparing-hosts-exist",
        FailedPreparingHostsExist => "failed-preparing-hosts-exist",
        ClusterPreparationSucceeded => "cluster-preparation-succeeded",
        ClusterPreparationFailed => "cluster-preparation-failed",
        SufficientHostsInstalled => "sufficient-hosts-installed",
        HostsPendingUserAction => "hosts-pending-user-action",
        InstallationCannotComplete => "installation-cannot-complete",
        OperatorsSettled => "operators-settled",
    }
}

/// Statuses in which cluster validations are evaluated
pub const VALIDATED_STATUSES: &[ClusterStatus] = &[
    ClusterStatus::Insufficient,
    ClusterStatus::Ready,
    ClusterStatus::PendingForInput,
    ClusterStatus::PreparingForInstallation,
];

const FAILED_HOST_STATUSES: &[HostStatus] = &[HostStatus::Error, HostStatus::Cancelled];

/// Statuses of a host still taking part in the cluster's preparation. Known
/// hosts start preparing on their next refresh.
const PREPARING_HOST_STATUSES: &[HostStatus] = &[
    HostStatus::Known,
    HostStatus::PreparingForInstallation,
    HostStatus::PreparingSuccessful,
];

/// Evaluates cluster validations and derived conditions
#[derive(Debug, Clone)]
pub struct ClusterRefreshPreprocessor {
    validator: ClusterValidator,
    disabled: DisabledValidations,
}

impl ClusterRefreshPreprocessor {
    #[must_use]
    pub fn new(validator: ClusterValidator, disabled: DisabledValidations) -> Self {
        Self { validator, disabled }
    }

    /// Runs the validations when the cluster status calls for them, then the
    /// derived conditions
    #[must_use]
    pub fn preprocess(&self, ctx: &ClusterValidationContext<'_>) -> RefreshOutcome {
        let mut conditions = Conditions::new();
        let mut validations = ValidationsInfo::new();

        if VALIDATED_STATUSES.contains(&ctx.cluster.status) {
            let mut reported = Vec::with_capacity(ClusterValidationId::ALL.len());
            for &id in ClusterValidationId::ALL {
                let (status, message) = if self.disabled.is_disabled(id.as_str()) {
                    (ValidationStatus::Disabled, VALIDATION_DISABLED_MESSAGE.to_string())
                } else {
                    self.validator.validate(id, ctx)
                };
                conditions.insert(id.as_str().to_string(), status.is_ok());
                reported.push((id, status, message));
            }
            validations = group_results(&reported);
        }

        for (id, value) in derived_conditions(ctx) {
            conditions.insert(id.as_str().to_string(), value);
        }
        RefreshOutcome {
            conditions,
            validations,
        }
    }
}

fn derived_conditions(ctx: &ClusterValidationContext<'_>) -> [(ClusterCondition, bool); 10] {
    let cluster = ctx.cluster;
    let hosts: Vec<&Host> = ctx.active_hosts().collect();
    let in_status = |statuses: &[HostStatus]| hosts.iter().filter(|h| statuses.contains(&h.status)).count();

    // A host whose preparation fails drops back to insufficient, so it
    // counts as having stopped preparing
    let prepared = in_status(&[HostStatus::PreparingSuccessful]);
    let unpreparing = hosts.len() - in_status(PREPARING_HOST_STATUSES);
    let failed_preparing = in_status(FAILED_HOST_STATUSES);

    let count = |role: HostRole, pred: &dyn Fn(&Host) -> bool| {
        hosts
            .iter()
            .filter(|h| h.effective_role() == role && pred(**h))
            .count()
    };
    let installed = |h: &Host| h.status == HostStatus::Installed;
    let alive = |h: &Host| !FAILED_HOST_STATUSES.contains(&h.status);
    let any = |_: &Host| true;

    let required_masters = cluster.required_masters();
    let required_workers = count(HostRole::Worker, &any).min(MIN_WORKERS_NEEDED_FOR_INSTALLATION);

    let operators_settled = cluster.monitored_operators.iter().all(|o| match o.operator_type {
        OperatorType::Builtin => o.status == Some(OperatorStatus::Available),
        OperatorType::Olm => matches!(o.status, Some(OperatorStatus::Available | OperatorStatus::Failed)),
    });

    [
        (ClusterCondition::VipDhcpAllocationSet, cluster.vip_dhcp_allocation),
        (ClusterCondition::AllHostsPreparedSuccessfully, !hosts.is_empty() && prepared == hosts.len()),
        (ClusterCondition::UnPreparingHostsExist, unpreparing > 0),
        (ClusterCondition::FailedPreparingHostsExist, failed_preparing > 0),
        (
            ClusterCondition::ClusterPreparationSucceeded,
            cluster.installation_preparation_completion_status == PreparationStatus::Succeeded,
        ),
        (
            ClusterCondition::ClusterPreparationFailed,
            cluster.installation_preparation_completion_status == PreparationStatus::Failed,
        ),
        (
            ClusterCondition::SufficientHostsInstalled,
            count(HostRole::Master, &installed) >= required_masters
                && count(HostRole::Worker, &installed) >= required_workers,
        ),
        (
            ClusterCondition::HostsPendingUserAction,
            in_status(&[HostStatus::InstallingPendingUserAction]) > 0,
        ),
        (
            ClusterCondition::InstallationCannotComplete,
            count(HostRole::Master, &alive) < required_masters || count(HostRole::Worker, &alive) < required_workers,
        ),
        (ClusterCondition::OperatorsSettled, operators_settled),
    ]
}
