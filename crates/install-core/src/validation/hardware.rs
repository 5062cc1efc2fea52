//! Hardware validator seam.

use crate::config::HardwareRequirements;
use crate::error::{CoreError, Result};
use crate::models::{Disk, HostRole, Inventory};

const GIB: i64 = 1024 * 1024 * 1024;

/// Disk and sufficiency checks over a host inventory
pub trait HardwareValidator: Send + Sync {
    /// Thresholds the validator works against
    fn requirements(&self) -> &HardwareRequirements;

    /// Disks the OS may be installed on
    fn eligible_disks(&self, inventory: &Inventory) -> Vec<Disk>;

    /// Why a disk cannot be used; empty when it can
    fn disk_ineligibility_reasons(&self, disk: &Disk) -> Vec<String>;

    /// Whether the inventory meets the requirements of `role`, with a reason
    /// when it does not
    fn is_sufficient(&self, inventory: &Inventory, role: HostRole, single_node: bool) -> Result<(bool, String)>;
}

/// Threshold-based validator driven by `HardwareRequirements`
#[derive(Debug, Clone, Default)]
pub struct DefaultHardwareValidator {
    requirements: HardwareRequirements,
}

impl DefaultHardwareValidator {
    /// Creates a validator for the given thresholds
    #[must_use]
    pub fn new(requirements: HardwareRequirements) -> Self {
        Self { requirements }
    }
}

impl HardwareValidator for DefaultHardwareValidator {
    fn requirements(&self) -> &HardwareRequirements {
        &self.requirements
    }

    fn eligible_disks(&self, inventory: &Inventory) -> Vec<Disk> {
        let mut disks: Vec<Disk> = inventory
            .disks
            .iter()
            .filter(|d| self.disk_ineligibility_reasons(d).is_empty())
            .cloned()
            .collect();
        disks.sort_by_key(|d| d.size_bytes);
        disks
    }

    fn disk_ineligibility_reasons(&self, disk: &Disk) -> Vec<String> {
        let mut reasons = Vec::new();
        let min_bytes = self.requirements.generic.disk_bytes();
        if disk.size_bytes < min_bytes {
            reasons.push(format!(
                "Disk is too small (disk only has {} GB, but {} GB are required)",
                disk.size_bytes / 1_000_000_000,
                self.requirements.generic.disk_size_gb
            ));
        }
        if disk.removable {
            reasons.push("Disk is removable".to_string());
        }
        if disk.drive_type.eq_ignore_ascii_case("ODD") {
            reasons.push("Drive type is ODD, it must be one of HDD, SSD.".to_string());
        }
        reasons
    }

    fn is_sufficient(&self, inventory: &Inventory, role: HostRole, single_node: bool) -> Result<(bool, String)> {
        let req = self
            .requirements
            .for_role(role, single_node)
            .ok_or_else(|| CoreError::InvalidArgument(format!("no hardware requirements for role {role}")))?;

        let mut problems = Vec::new();
        if inventory.cpu.count < req.cpu_cores {
            problems.push(format!(
                "insufficient CPU cores, expected {} got {}",
                req.cpu_cores, inventory.cpu.count
            ));
        }
        if inventory.memory.physical_bytes < req.ram_bytes() {
            problems.push(format!(
                "insufficient RAM, expected {} GiB got {} GiB",
                req.ram_bytes() / GIB,
                inventory.memory.physical_bytes / GIB
            ));
        }
        if self.eligible_disks(inventory).is_empty() {
            problems.push("no eligible disks".to_string());
        }

        if problems.is_empty() {
            Ok((true, String::new()))
        } else {
            Ok((false, format!("{role} role: {}", problems.join(", "))))
        }
    }
}
