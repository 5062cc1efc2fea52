//! Host refresh preprocessing.
//!
//! Turns a `HostValidationContext` into the condition map the refresh rules
//! are evaluated against, plus the per-category results persisted in
//! `validations_info`.

use crate::conditions::{Conditions, DisabledValidations};
use crate::host::common::MANUAL_REBOOT_STAGES;
use crate::models::{ClusterStatus, HostRole, HostStage};
use crate::validation::{
    group_results, HostValidationContext, HostValidationId, HostValidator, ValidationStatus, ValidationsInfo,
    VALIDATION_DISABLED_MESSAGE,
};

string_enum! {
    /// Boolean conditions derived from host and cluster data rather than
    /// from a validation
    pub enum HostCondition {
        InstallationDiskSpeedCheckSuccessful => "installation-disk-speed-check-successful",
        ClusterPreparingForInstallation => "cluster-preparing-for-installation",
        ClusterInstalling => "cluster-installing",
        ValidRoleForInstallation => "valid-role-for-installation",
        StageInWrongBootStages => "stage-in-wrong-boot-stages",
        ClusterPendingUserAction => "cluster-pending-user-action",
        ClusterInError => "cluster-in-error",
        SuccessfulContainerImageAvailability => "successful-container-image-availability",
    }
}

/// Validations not reported while the host boots from disk, where the agent
/// is expected to be silent
const SKIPPED_DURING_MANUAL_REBOOT: &[HostValidationId] = &[
    HostValidationId::Connected,
    HostValidationId::MediaConnected,
    HostValidationId::NtpSynced,
];

/// Output of one preprocessing pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    /// Condition values keyed by validation or derived-condition ID
    pub conditions: Conditions,
    /// Reported validation results
    pub validations: ValidationsInfo,
}

/// Evaluates host validations and derived conditions
#[derive(Debug, Clone)]
pub struct HostRefreshPreprocessor {
    validator: HostValidator,
    disabled: DisabledValidations,
}

impl HostRefreshPreprocessor {
    /// Creates the preprocessor
    #[must_use]
    pub fn new(validator: HostValidator, disabled: DisabledValidations) -> Self {
        Self { validator, disabled }
    }

    /// Validator used for the checks
    #[must_use]
    pub fn validator(&self) -> &HostValidator {
        &self.validator
    }

    /// Runs every validation in registration order, then the derived
    /// conditions
    #[must_use]
    pub fn preprocess(&self, ctx: &HostValidationContext<'_>) -> RefreshOutcome {
        let mut conditions = Conditions::new();
        let mut reported = Vec::with_capacity(HostValidationId::ALL.len());
        let stage = ctx.host.progress.current_stage;
        let in_manual_reboot = stage.is_some_and(|s| MANUAL_REBOOT_STAGES.contains(&s));

        for &id in HostValidationId::ALL {
            let (status, message) = if self.disabled.is_disabled(id.as_str()) {
                conditions.insert(id.as_str().to_string(), true);
                (ValidationStatus::Disabled, VALIDATION_DISABLED_MESSAGE.to_string())
            } else {
                let (status, message) = self.validator.validate(id, ctx);
                conditions.insert(
                    id.as_str().to_string(),
                    matches!(status, ValidationStatus::Success | ValidationStatus::SuccessSuppressOutput),
                );
                (status, message)
            };

            if in_manual_reboot && SKIPPED_DURING_MANUAL_REBOOT.contains(&id) {
                continue;
            }
            reported.push((id, status, message));
        }

        let cluster_status = ctx.cluster.map(|c| c.status);
        let derived = [
            (
                HostCondition::InstallationDiskSpeedCheckSuccessful,
                ctx.host.disk_speed.is_some_and(|s| s.tested && s.exit_code == 0),
            ),
            (
                HostCondition::ClusterPreparingForInstallation,
                cluster_status == Some(ClusterStatus::PreparingForInstallation),
            ),
            (HostCondition::ClusterInstalling, cluster_status == Some(ClusterStatus::Installing)),
            (
                HostCondition::ValidRoleForInstallation,
                matches!(ctx.host.role, HostRole::Master | HostRole::Worker),
            ),
            (
                HostCondition::StageInWrongBootStages,
                stage.is_some_and(|s| HostStage::WRONG_BOOT_ORDER_STAGES.contains(&s)),
            ),
            (
                HostCondition::ClusterPendingUserAction,
                cluster_status == Some(ClusterStatus::InstallingPendingUserAction),
            ),
            (HostCondition::ClusterInError, cluster_status == Some(ClusterStatus::Error)),
            (
                HostCondition::SuccessfulContainerImageAvailability,
                self.validator.validate(HostValidationId::ContainerImagesAvailable, ctx).0 == ValidationStatus::Success,
            ),
        ];
        for (id, value) in derived {
            conditions.insert(id.as_str().to_string(), value);
        }

        RefreshOutcome {
            conditions,
            validations: group_results(&reported),
        }
    }
}
