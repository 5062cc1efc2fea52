//! Operator requirement checks.
//!
//! Each optional operator a cluster can request brings its own host and
//! cluster requirements. A cluster that did not request the operator passes
//! its checks unconditionally.

use crate::validation::cluster::ClusterValidationContext;
use crate::validation::hardware::HardwareValidator;
use crate::validation::host::HostValidationContext;
use crate::validation::ValidationStatus;
use std::sync::Arc;

/// Local Storage Operator
pub const LSO: &str = "lso";
/// OpenShift Data Foundation
pub const ODF: &str = "odf";
/// OpenShift Virtualization
pub const CNV: &str = "cnv";

/// Minimum hosts for an ODF deployment
pub const ODF_MIN_HOSTS: usize = 3;

/// Operator requirement checks
pub trait OperatorsValidator: Send + Sync {
    /// Host-level requirements of `operator`
    fn validate_host(&self, operator: &str, ctx: &HostValidationContext<'_>) -> (ValidationStatus, String);

    /// Cluster-level requirements of `operator`
    fn validate_cluster(&self, operator: &str, ctx: &ClusterValidationContext<'_>) -> (ValidationStatus, String);
}

/// Requirements of the operators shipped with the installer
#[derive(Clone)]
pub struct BuiltinOperatorsValidator {
    hardware: Arc<dyn HardwareValidator>,
}

impl std::fmt::Debug for BuiltinOperatorsValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOperatorsValidator").finish_non_exhaustive()
    }
}

impl BuiltinOperatorsValidator {
    /// Creates the validator
    #[must_use]
    pub fn new(hardware: Arc<dyn HardwareValidator>) -> Self {
        Self { hardware }
    }

    fn display_name(operator: &str) -> &str {
        match operator {
            LSO => "Local Storage Operator",
            ODF => "OpenShift Data Foundation",
            CNV => "OpenShift Virtualization",
            other => other,
        }
    }
}

impl OperatorsValidator for BuiltinOperatorsValidator {
    fn validate_host(&self, operator: &str, ctx: &HostValidationContext<'_>) -> (ValidationStatus, String) {
        let name = Self::display_name(operator);
        if !ctx.cluster.is_some_and(|c| c.has_operator(operator)) {
            return (ValidationStatus::Success, format!("{name} is disabled"));
        }
        let Some(inventory) = ctx.inventory.as_ref() else {
            return (ValidationStatus::Pending, "Missing inventory".to_string());
        };

        match operator {
            ODF => {
                // one disk for the OS, at least one more for the storage cluster
                let disks = self.hardware.eligible_disks(inventory).len();
                if disks >= 2 {
                    (ValidationStatus::Success, format!("{name} requirements satisfied"))
                } else {
                    (
                        ValidationStatus::Failure,
                        format!("Insufficient disks, {name} requires at least one non-installation HDD/SSD disk on each host"),
                    )
                }
            }
            CNV => {
                let virt = inventory.cpu.flags.iter().any(|f| f == "vmx" || f == "svm");
                if virt {
                    (ValidationStatus::Success, format!("{name} requirements satisfied"))
                } else {
                    (
                        ValidationStatus::Failure,
                        "CPU does not have virtualization support".to_string(),
                    )
                }
            }
            _ => (ValidationStatus::Success, format!("{name} requirements satisfied")),
        }
    }

    fn validate_cluster(&self, operator: &str, ctx: &ClusterValidationContext<'_>) -> (ValidationStatus, String) {
        let name = Self::display_name(operator);
        if !ctx.cluster.has_operator(operator) {
            return (ValidationStatus::Success, format!("{name} is disabled"));
        }
        match operator {
            ODF => {
                let hosts = ctx.active_hosts().count();
                if hosts >= ODF_MIN_HOSTS {
                    (ValidationStatus::Success, format!("{name} requirements satisfied"))
                } else {
                    (
                        ValidationStatus::Failure,
                        format!("A minimum of {ODF_MIN_HOSTS} hosts is required to deploy {name}."),
                    )
                }
            }
            _ => (ValidationStatus::Success, format!("{name} requirements satisfied")),
        }
    }
}
