//! Host validations.
//!
//! Every validation is a pair: a condition computing the status from a
//! `HostValidationContext`, and a formatter turning that status into a
//! message. Inventory-dependent conditions report `pending` until the agent
//! sent an inventory.

use crate::config::{Config, RoleRequirements};
use crate::models::{
    Cluster, Host, HostRole, ImageAvailabilityResult, Inventory, MediaStatus,
};
use crate::time::elapsed;
use crate::validation::connectivity::ConnectivityValidator;
use crate::validation::hardware::HardwareValidator;
use crate::validation::network::{belongs_to_network, parse_cidr};
use crate::validation::operators::{OperatorsValidator, CNV, LSO, ODF};
use crate::validation::{ValidationCategory, ValidationId, ValidationStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

const GIB: i64 = 1024 * 1024 * 1024;

/// Clock skew tolerated between a host and the service without NTP sync
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(4 * 60);

const FORBIDDEN_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "localhost4",
    "localhost4.localdomain4",
    "localhost6",
    "localhost6.localdomain6",
];

string_enum! {
    /// Host validation IDs, in evaluation order
    pub enum HostValidationId {
        Connected => "connected",
        MediaConnected => "media-connected",
        HasInventory => "has-inventory",
        HasMinCpuCores => "has-min-cpu-cores",
        HasMinValidDisks => "has-min-valid-disks",
        HasMinMemory => "has-min-memory",
        MachineCidrDefined => "machine-cidr-defined",
        HasCpuCoresForRole => "has-cpu-cores-for-role",
        HasMemoryForRole => "has-memory-for-role",
        HostnameUnique => "hostname-unique",
        HostnameValid => "hostname-valid",
        BelongsToMachineCidr => "belongs-to-machine-cidr",
        BelongsToMajorityGroup => "belongs-to-majority-group",
        NtpSynced => "ntp-synced",
        ContainerImagesAvailable => "container-images-available",
        SufficientInstallationDiskSpeed => "sufficient-installation-disk-speed",
        ApiVipConnected => "api-vip-connected",
        LsoRequirementsSatisfied => "lso-requirements-satisfied",
        OdfRequirementsSatisfied => "odf-requirements-satisfied",
        CnvRequirementsSatisfied => "cnv-requirements-satisfied",
    }
}

impl ValidationId for HostValidationId {
    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn category(self) -> ValidationCategory {
        match self {
            Self::Connected
            | Self::MachineCidrDefined
            | Self::HostnameUnique
            | Self::HostnameValid
            | Self::BelongsToMachineCidr
            | Self::BelongsToMajorityGroup
            | Self::NtpSynced
            | Self::ContainerImagesAvailable
            | Self::ApiVipConnected => ValidationCategory::Network,
            Self::MediaConnected
            | Self::HasInventory
            | Self::HasMinCpuCores
            | Self::HasMinValidDisks
            | Self::HasMinMemory
            | Self::HasCpuCoresForRole
            | Self::HasMemoryForRole
            | Self::SufficientInstallationDiskSpeed => ValidationCategory::Hardware,
            Self::LsoRequirementsSatisfied | Self::OdfRequirementsSatisfied | Self::CnvRequirementsSatisfied => {
                ValidationCategory::Operators
            }
        }
    }

    fn as_str(self) -> &'static str {
        HostValidationId::as_str(self)
    }
}

/// Read-only snapshot a host validation pass works on
#[derive(Debug)]
pub struct HostValidationContext<'a> {
    /// Host under validation
    pub host: &'a Host,
    /// Owning cluster, `None` for pool hosts
    pub cluster: Option<&'a Cluster>,
    /// Other hosts of the same cluster
    pub siblings: &'a [Host],
    /// Parsed inventory, `None` when absent or unparsable
    pub inventory: Option<Inventory>,
    /// Parse failure of the stored inventory
    pub inventory_error: Option<String>,
    /// Evaluation time
    pub now: DateTime<Utc>,
}

impl<'a> HostValidationContext<'a> {
    /// Builds the context, parsing the inventory once
    #[must_use]
    pub fn new(host: &'a Host, cluster: Option<&'a Cluster>, siblings: &'a [Host], now: DateTime<Utc>) -> Self {
        let (inventory, inventory_error) = match host.parsed_inventory() {
            Ok(inventory) => (inventory, None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            host,
            cluster,
            siblings,
            inventory,
            inventory_error,
            now,
        }
    }

    fn single_node(&self) -> bool {
        self.cluster.is_some_and(Cluster::is_single_node)
    }

    fn user_managed_networking(&self) -> bool {
        self.cluster.is_some_and(|c| c.user_managed_networking)
    }

    fn hostname(&self) -> Option<String> {
        self.host.effective_hostname(self.inventory.as_ref())
    }
}

/// Computes host validations
#[derive(Clone)]
pub struct HostValidator {
    config: Arc<Config>,
    hardware: Arc<dyn HardwareValidator>,
    connectivity: Arc<dyn ConnectivityValidator>,
    operators: Arc<dyn OperatorsValidator>,
}

impl std::fmt::Debug for HostValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostValidator").finish_non_exhaustive()
    }
}

impl HostValidator {
    /// Creates a validator over the injected collaborators
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        hardware: Arc<dyn HardwareValidator>,
        connectivity: Arc<dyn ConnectivityValidator>,
        operators: Arc<dyn OperatorsValidator>,
    ) -> Self {
        Self {
            config,
            hardware,
            connectivity,
            operators,
        }
    }

    /// Hardware collaborator
    #[must_use]
    pub fn hardware(&self) -> &Arc<dyn HardwareValidator> {
        &self.hardware
    }

    /// Evaluates one validation, returning its status and message
    #[must_use]
    pub fn validate(&self, id: HostValidationId, ctx: &HostValidationContext<'_>) -> (ValidationStatus, String) {
        let operator = match id {
            HostValidationId::LsoRequirementsSatisfied => Some(LSO),
            HostValidationId::OdfRequirementsSatisfied => Some(ODF),
            HostValidationId::CnvRequirementsSatisfied => Some(CNV),
            _ => None,
        };
        if let Some(operator) = operator {
            return self.operators.validate_host(operator, ctx);
        }

        let status = self.condition(id, ctx);
        let mut message = self.message(id, ctx, status);
        if message.is_empty() {
            message = format!("Unexpected status {status} for validation {id}");
        }
        (status, message)
    }

    fn condition(&self, id: HostValidationId, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        match id {
            HostValidationId::Connected => self.is_connected(ctx),
            HostValidationId::MediaConnected => is_media_connected(ctx),
            HostValidationId::HasInventory => has_inventory(ctx),
            HostValidationId::HasMinCpuCores => self.has_min_cpu_cores(ctx),
            HostValidationId::HasMinValidDisks => self.has_min_valid_disks(ctx),
            HostValidationId::HasMinMemory => self.has_min_memory(ctx),
            HostValidationId::MachineCidrDefined => is_machine_cidr_defined(ctx),
            HostValidationId::HasCpuCoresForRole => self.has_cpu_cores_for_role(ctx),
            HostValidationId::HasMemoryForRole => self.has_memory_for_role(ctx),
            HostValidationId::HostnameUnique => is_hostname_unique(ctx),
            HostValidationId::HostnameValid => is_hostname_valid(ctx),
            HostValidationId::BelongsToMachineCidr => self.belongs_to_machine_cidr(ctx),
            HostValidationId::BelongsToMajorityGroup => belongs_to_majority_group(ctx),
            HostValidationId::NtpSynced => is_ntp_synced(ctx),
            HostValidationId::ContainerImagesAvailable => are_container_images_available(ctx),
            HostValidationId::SufficientInstallationDiskSpeed => self.sufficient_disk_speed(ctx),
            HostValidationId::ApiVipConnected => is_api_vip_connected(ctx),
            HostValidationId::LsoRequirementsSatisfied
            | HostValidationId::OdfRequirementsSatisfied
            | HostValidationId::CnvRequirementsSatisfied => ValidationStatus::Success,
        }
    }

    fn is_connected(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        let limit = self.config.timeouts.host_disconnection;
        match ctx.host.checked_in_at {
            Some(at) if elapsed(ctx.now, at) <= limit => ValidationStatus::Success,
            _ => ValidationStatus::Failure,
        }
    }

    fn has_min_cpu_cores(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        let Some(inventory) = ctx.inventory.as_ref() else {
            return ValidationStatus::Pending;
        };
        bool_status(inventory.cpu.count >= self.hardware.requirements().generic.cpu_cores)
    }

    fn has_min_memory(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        let Some(inventory) = ctx.inventory.as_ref() else {
            return ValidationStatus::Pending;
        };
        bool_status(inventory.memory.physical_bytes >= self.hardware.requirements().generic.ram_bytes())
    }

    fn has_min_valid_disks(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        let Some(inventory) = ctx.inventory.as_ref() else {
            return ValidationStatus::Pending;
        };
        bool_status(!self.hardware.eligible_disks(inventory).is_empty())
    }

    fn role_requirements(&self, ctx: &HostValidationContext<'_>) -> Option<(HostRole, RoleRequirements)> {
        let role = ctx.host.effective_role();
        self.hardware
            .requirements()
            .for_role(role, ctx.single_node())
            .map(|req| (role, *req))
    }

    fn has_cpu_cores_for_role(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        let Some(inventory) = ctx.inventory.as_ref() else {
            return ValidationStatus::Pending;
        };
        match self.role_requirements(ctx) {
            Some((_, req)) => bool_status(inventory.cpu.count >= req.cpu_cores),
            None => ValidationStatus::Error,
        }
    }

    fn has_memory_for_role(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        let Some(inventory) = ctx.inventory.as_ref() else {
            return ValidationStatus::Pending;
        };
        match self.role_requirements(ctx) {
            Some((_, req)) => bool_status(inventory.memory.physical_bytes >= req.ram_bytes()),
            None => ValidationStatus::Error,
        }
    }

    fn belongs_to_machine_cidr(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        if ctx.host.is_day2() || ctx.user_managed_networking() {
            return ValidationStatus::Success;
        }
        let (Some(_), Some(cluster)) = (ctx.inventory.as_ref(), ctx.cluster) else {
            return ValidationStatus::Pending;
        };
        if cluster.machine_networks.is_empty() {
            return ValidationStatus::Pending;
        }
        let interfaces = match self.connectivity.valid_interfaces(ctx.host) {
            Ok(interfaces) => interfaces,
            Err(_) => return ValidationStatus::Error,
        };
        let usable = Inventory {
            interfaces,
            ..Inventory::default()
        };
        for raw in &cluster.machine_networks {
            let Ok(net) = parse_cidr(raw) else {
                return ValidationStatus::Error;
            };
            if !belongs_to_network(&usable, &net) {
                return ValidationStatus::Failure;
            }
        }
        ValidationStatus::Success
    }

    fn sufficient_disk_speed(&self, ctx: &HostValidationContext<'_>) -> ValidationStatus {
        match ctx.host.disk_speed {
            Some(speed) if speed.tested => {
                let threshold = self
                    .role_requirements(ctx)
                    .map_or(self.hardware.requirements().generic, |(_, req)| req)
                    .installation_disk_speed_threshold_ms;
                bool_status(speed.exit_code == 0 && (threshold == 0 || speed.speed_ms <= threshold))
            }
            _ => ValidationStatus::SuccessSuppressOutput,
        }
    }

    fn message(&self, id: HostValidationId, ctx: &HostValidationContext<'_>, status: ValidationStatus) -> String {
        use ValidationStatus as S;
        let generic = self.hardware.requirements().generic;
        let hostname = ctx.hostname().unwrap_or_default();
        match (id, status) {
            (_, S::Pending) if ctx.inventory.is_none() && needs_inventory(id) => "Missing inventory".to_string(),

            (HostValidationId::Connected, S::Success) => "Host is connected".to_string(),
            (HostValidationId::Connected, _) => "Host is disconnected".to_string(),

            (HostValidationId::MediaConnected, S::Success) => "Media device is connected".to_string(),
            (HostValidationId::MediaConnected, _) => {
                "Failed to read the installation media, the host lost access to the discovery image".to_string()
            }

            (HostValidationId::HasInventory, S::Success) => "Valid inventory exists for the host".to_string(),
            (HostValidationId::HasInventory, S::Error) => format!(
                "Inventory could not be parsed: {}",
                ctx.inventory_error.as_deref().unwrap_or("unknown error")
            ),
            (HostValidationId::HasInventory, _) => "Inventory has not been received for the host".to_string(),

            (HostValidationId::HasMinCpuCores, S::Success) => "Sufficient CPU cores".to_string(),
            (HostValidationId::HasMinCpuCores, _) => format!(
                "The host is not eligible to participate in the cluster because the minimum required CPU cores for any role is {}, found only {}",
                generic.cpu_cores,
                ctx.inventory.as_ref().map_or(0, |i| i.cpu.count)
            ),

            (HostValidationId::HasMinMemory, S::Success) => "Sufficient minimum RAM".to_string(),
            (HostValidationId::HasMinMemory, _) => format!(
                "The host is not eligible to participate in the cluster because the minimum required RAM for any role is {} GiB, found only {} GiB",
                generic.ram_bytes() / GIB,
                ctx.inventory.as_ref().map_or(0, |i| i.memory.physical_bytes) / GIB
            ),

            (HostValidationId::HasMinValidDisks, S::Success) => "Sufficient disk capacity".to_string(),
            (HostValidationId::HasMinValidDisks, _) => {
                "No eligible disks were found, please check specific disks to see why they are not eligible".to_string()
            }

            (HostValidationId::MachineCidrDefined, S::Success) => {
                if ctx.host.is_day2() {
                    "No Machine Network CIDR needed: Day2 host".to_string()
                } else if ctx.user_managed_networking() {
                    "No Machine Network CIDR needed: User Managed Networking".to_string()
                } else {
                    "Machine Network CIDR is defined".to_string()
                }
            }
            (HostValidationId::MachineCidrDefined, _) => match ctx.cluster {
                None => "Host is not bound to any cluster".to_string(),
                Some(c) if c.vip_dhcp_allocation => "Machine Network CIDR is undefined".to_string(),
                Some(_) => "Machine Network CIDR is undefined; the Machine Network CIDR can be defined by setting either the API or Ingress virtual IPs".to_string(),
            },

            (HostValidationId::HasCpuCoresForRole, S::Success) => {
                format!("Sufficient CPU cores for role {}", ctx.host.effective_role())
            }
            (HostValidationId::HasCpuCoresForRole, S::Error) | (HostValidationId::HasMemoryForRole, S::Error) => {
                "Role could not be determined for the host".to_string()
            }
            (HostValidationId::HasCpuCoresForRole, _) => match self.role_requirements(ctx) {
                Some((role, req)) => format!(
                    "Require at least {} CPU cores for {role} role, found only {}",
                    req.cpu_cores,
                    ctx.inventory.as_ref().map_or(0, |i| i.cpu.count)
                ),
                None => "Missing inventory or role".to_string(),
            },

            (HostValidationId::HasMemoryForRole, S::Success) => {
                format!("Sufficient RAM for role {}", ctx.host.effective_role())
            }
            (HostValidationId::HasMemoryForRole, _) => match self.role_requirements(ctx) {
                Some((role, req)) => format!(
                    "Require at least {} GiB RAM for role {role}, found only {} GiB",
                    req.ram_bytes() / GIB,
                    ctx.inventory.as_ref().map_or(0, |i| i.memory.physical_bytes) / GIB
                ),
                None => "Missing inventory or role".to_string(),
            },

            (HostValidationId::HostnameUnique, S::Success) => format!("Hostname {hostname} is unique in cluster"),
            (HostValidationId::HostnameUnique, _) => format!("Hostname {hostname} is not unique in cluster"),

            (HostValidationId::HostnameValid, S::Success) => format!("Hostname {hostname} is allowed"),
            (HostValidationId::HostnameValid, _) => {
                hostname_problem(&hostname).unwrap_or_else(|| format!("Hostname {hostname} is forbidden"))
            }

            (HostValidationId::BelongsToMachineCidr, S::Success) => {
                if ctx.host.is_day2() {
                    "No machine network CIDR validation needed: Day2 host".to_string()
                } else if ctx.user_managed_networking() {
                    "No machine network CIDR validation needed: User Managed Networking".to_string()
                } else {
                    "Host belongs to all machine network CIDRs".to_string()
                }
            }
            (HostValidationId::BelongsToMachineCidr, S::Pending) => "Missing inventory or machine network CIDR".to_string(),
            (HostValidationId::BelongsToMachineCidr, S::Error) => {
                "Could not determine the host interfaces or parse the machine network CIDR".to_string()
            }
            (HostValidationId::BelongsToMachineCidr, _) => {
                "Host does not belong to machine network CIDRs. Verify that the host belongs to every CIDR listed under machine networks".to_string()
            }

            (HostValidationId::BelongsToMajorityGroup, S::Success) => {
                if ctx.host.is_day2() {
                    "Day2 host is not required to be connected to other hosts in the cluster".to_string()
                } else if ctx.single_node() || ctx.user_managed_networking() {
                    "Connectivity to other hosts is not required".to_string()
                } else {
                    "Host has connectivity to the majority of hosts in the cluster".to_string()
                }
            }
            (HostValidationId::BelongsToMajorityGroup, S::Pending) => {
                "Machine Network CIDR or Connectivity Majority Groups missing".to_string()
            }
            (HostValidationId::BelongsToMajorityGroup, _) => {
                "No connectivity to the majority of hosts in the cluster".to_string()
            }

            (HostValidationId::NtpSynced, S::Success) => "Host NTP is synced".to_string(),
            (HostValidationId::NtpSynced, _) => {
                "Host couldn't synchronize with any NTP server".to_string()
            }

            (HostValidationId::ContainerImagesAvailable, S::Success) => {
                "All required container images were either pulled successfully or no attempt was made to pull them".to_string()
            }
            (HostValidationId::ContainerImagesAvailable, _) => {
                let mut failed: Vec<&str> = ctx
                    .host
                    .images_status
                    .values()
                    .filter(|i| i.result == ImageAvailabilityResult::Failure)
                    .map(|i| i.name.as_str())
                    .collect();
                failed.sort_unstable();
                format!(
                    "Failed to fetch container images needed for installation from {}. This may be due to a network hiccup. Retry to install again. If this problem persists, check your network settings to make sure you are not blocked.",
                    failed.join(",")
                )
            }

            (HostValidationId::SufficientInstallationDiskSpeed, S::Success) => {
                "Speed of installation disk is sufficient".to_string()
            }
            (HostValidationId::SufficientInstallationDiskSpeed, S::SuccessSuppressOutput) => {
                "Speed of installation disk has not yet been measured".to_string()
            }
            (HostValidationId::SufficientInstallationDiskSpeed, _) => {
                "While preparing the previous installation the installation disk speed measurement failed or was found to be insufficient".to_string()
            }

            (HostValidationId::ApiVipConnected, S::Success) => "API VIP connectivity success".to_string(),
            (HostValidationId::ApiVipConnected, S::SuccessSuppressOutput) => "Host is not a day2 host".to_string(),
            (HostValidationId::ApiVipConnected, S::Pending) => "Missing API VIP connectivity response".to_string(),
            (HostValidationId::ApiVipConnected, _) => "API VIP connectivity failure".to_string(),

            (
                HostValidationId::LsoRequirementsSatisfied
                | HostValidationId::OdfRequirementsSatisfied
                | HostValidationId::CnvRequirementsSatisfied,
                _,
            ) => String::new(),
        }
    }
}

fn bool_status(ok: bool) -> ValidationStatus {
    if ok { ValidationStatus::Success } else { ValidationStatus::Failure }
}

fn needs_inventory(id: HostValidationId) -> bool {
    matches!(
        id,
        HostValidationId::HasMinCpuCores
            | HostValidationId::HasMinValidDisks
            | HostValidationId::HasMinMemory
            | HostValidationId::HasCpuCoresForRole
            | HostValidationId::HasMemoryForRole
            | HostValidationId::HostnameUnique
            | HostValidationId::HostnameValid
            | HostValidationId::NtpSynced
    )
}

fn is_media_connected(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    bool_status(ctx.host.media_status != Some(MediaStatus::Disconnected))
}

fn has_inventory(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if ctx.inventory_error.is_some() {
        ValidationStatus::Error
    } else {
        bool_status(ctx.inventory.is_some())
    }
}

fn is_machine_cidr_defined(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if ctx.host.is_day2() || ctx.user_managed_networking() {
        return ValidationStatus::Success;
    }
    bool_status(ctx.cluster.is_some_and(|c| !c.machine_networks.is_empty()))
}

fn is_hostname_unique(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if ctx.inventory.is_none() {
        return ValidationStatus::Pending;
    }
    let Some(hostname) = ctx.hostname() else {
        return ValidationStatus::Failure;
    };
    let duplicate = ctx.siblings.iter().filter(|h| h.id != ctx.host.id).any(|sibling| {
        let inventory = sibling.parsed_inventory().ok().flatten();
        sibling.effective_hostname(inventory.as_ref()).as_deref() == Some(hostname.as_str())
    });
    bool_status(!duplicate)
}

fn is_hostname_valid(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if ctx.inventory.is_none() {
        return ValidationStatus::Pending;
    }
    match ctx.hostname() {
        Some(hostname) => bool_status(hostname_problem(&hostname).is_none()),
        None => ValidationStatus::Failure,
    }
}

/// Why a hostname is not acceptable, `None` when it is
#[must_use]
pub fn hostname_problem(hostname: &str) -> Option<String> {
    if FORBIDDEN_HOSTNAMES.contains(&hostname) {
        return Some(format!("The host name {hostname} is forbidden"));
    }
    let label_ok = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && label.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    };
    if hostname.is_empty() || hostname.len() > 253 || !hostname.split('.').all(label_ok) {
        return Some(format!(
            "Hostname {hostname} does not pass the requirements: lowercase alphanumeric characters, '-' or '.', starting and ending with an alphanumeric character, at most 63 characters per label"
        ));
    }
    None
}

fn belongs_to_majority_group(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if ctx.host.is_day2() || ctx.single_node() || ctx.user_managed_networking() {
        return ValidationStatus::Success;
    }
    let Some(cluster) = ctx.cluster else {
        return ValidationStatus::Pending;
    };
    let Some(machine_network) = cluster.primary_machine_network() else {
        return ValidationStatus::Pending;
    };
    match cluster.connectivity_majority_groups.get(machine_network) {
        None => ValidationStatus::Pending,
        Some(group) => bool_status(group.contains(&ctx.host.id)),
    }
}

fn is_ntp_synced(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if ctx.host.ntp_sources.iter().any(|s| s.synced) {
        return ValidationStatus::Success;
    }
    let Some(inventory) = ctx.inventory.as_ref() else {
        return ValidationStatus::Pending;
    };
    let skew = (ctx.now.timestamp() - inventory.timestamp).unsigned_abs();
    bool_status(inventory.timestamp != 0 && skew <= MAX_CLOCK_SKEW.as_secs())
}

fn are_container_images_available(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    bool_status(
        ctx.host
            .images_status
            .values()
            .all(|image| image.result != ImageAvailabilityResult::Failure),
    )
}

fn is_api_vip_connected(ctx: &HostValidationContext<'_>) -> ValidationStatus {
    if !ctx.host.is_day2() {
        return ValidationStatus::SuccessSuppressOutput;
    }
    match ctx.host.api_vip_connectivity {
        None => ValidationStatus::Pending,
        Some(ok) => bool_status(ok),
    }
}
