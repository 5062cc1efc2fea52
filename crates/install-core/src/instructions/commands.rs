//! Command generators.
//!
//! Each generator turns the current host, its inventory and its cluster into
//! zero or more steps. A generator that cannot build its step returns an
//! error; the manager logs it and keeps going with the others.

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::instructions::step::{Step, StepType};
use crate::models::{Cluster, Host, HostRole, ImageAvailabilityResult, Inventory, LogsState};
use crate::validation::{ConnectivityValidator, HardwareValidator};
use ipnetwork::{IpNetwork, Ipv4Network};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Everything a generator may read
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub host: &'a Host,
    pub inventory: Option<&'a Inventory>,
    pub cluster: Option<&'a Cluster>,
    /// Hosts of the same cluster, the host itself included
    pub siblings: &'a [Host],
    pub config: &'a Config,
}

impl<'a> StepContext<'a> {
    fn require_cluster(&self) -> Result<&'a Cluster> {
        self.cluster.ok_or_else(|| {
            CoreError::ValidationContext(format!("host {} is not bound to a cluster", self.host.id))
        })
    }

    fn require_inventory(&self) -> Result<&'a Inventory> {
        self.inventory
            .ok_or_else(|| CoreError::ValidationContext(format!("host {} has no inventory", self.host.id)))
    }
}

/// Produces the steps of one type
pub trait CommandGenerator: Send + Sync {
    /// Step type this generator emits
    fn step_type(&self) -> StepType;

    /// Steps for the host in `ctx`; an empty list means nothing to do
    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>>;
}

fn single<T: Serialize>(step_type: StepType, request: &T) -> Result<Vec<Step>> {
    Ok(vec![Step::new(step_type, vec![serde_json::to_string(request)?])])
}

#[derive(Debug, Serialize)]
struct NicTarget {
    name: String,
    mac: String,
    ip_addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ConnectivityTarget {
    host_id: Uuid,
    nics: Vec<NicTarget>,
}

/// Checks reachability of every other host in the cluster
pub struct ConnectivityCheckCmd {
    connectivity: Arc<dyn ConnectivityValidator>,
}

impl ConnectivityCheckCmd {
    pub fn new(connectivity: Arc<dyn ConnectivityValidator>) -> Self {
        Self { connectivity }
    }
}

impl CommandGenerator for ConnectivityCheckCmd {
    fn step_type(&self) -> StepType {
        StepType::ConnectivityCheck
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        if ctx.cluster.is_none() {
            return Ok(Vec::new());
        }
        let mut targets = Vec::new();
        for sibling in ctx.siblings.iter().filter(|h| h.id != ctx.host.id) {
            let interfaces = match self.connectivity.valid_interfaces(sibling) {
                Ok(interfaces) => interfaces,
                Err(e) => {
                    debug!("Host {}: skipping connectivity target {}: {e}", ctx.host.id, sibling.id);
                    continue;
                }
            };
            let nics: Vec<NicTarget> = interfaces
                .into_iter()
                .map(|nic| NicTarget {
                    name: nic.name,
                    mac: nic.mac_address,
                    ip_addresses: nic.ipv4_addresses.into_iter().chain(nic.ipv6_addresses).collect(),
                })
                .collect();
            if !nics.is_empty() {
                targets.push(ConnectivityTarget {
                    host_id: sibling.id,
                    nics,
                });
            }
        }
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        single(self.step_type(), &targets)
    }
}

#[derive(Debug, Serialize)]
struct ApiVipConnectivityRequest {
    url: String,
}

/// Checks that a day-2 host reaches the existing cluster's API
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiVipConnectivityCheckCmd;

impl CommandGenerator for ApiVipConnectivityCheckCmd {
    fn step_type(&self) -> StepType {
        StepType::ApiVipConnectivityCheck
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        let cluster = ctx.require_cluster()?;
        let address = match (&cluster.base_dns_domain, cluster.api_vips.first()) {
            (Some(domain), _) => format!("api.{}.{domain}", cluster.name),
            (None, Some(vip)) => vip.clone(),
            (None, None) => {
                return Err(CoreError::ValidationContext(format!(
                    "cluster {} has neither a base domain nor an API VIP",
                    cluster.id
                )));
            }
        };
        let url = format!("http://{address}:22624/config/worker");
        single(self.step_type(), &ApiVipConnectivityRequest { url })
    }
}

/// Scans the host's IPv4 networks for unused addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeAddressesCmd;

impl CommandGenerator for FreeAddressesCmd {
    fn step_type(&self) -> StepType {
        StepType::FreeNetworkAddresses
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        let inventory = ctx.require_inventory()?;
        let networks: BTreeSet<String> = inventory
            .interfaces
            .iter()
            .flat_map(|nic| nic.ipv4_addresses.iter())
            .filter_map(|cidr| cidr.parse::<Ipv4Network>().ok())
            .filter_map(|net| Ipv4Network::new(net.network(), net.prefix()).ok())
            .map(|net| net.to_string())
            .collect();
        if networks.is_empty() {
            return Ok(Vec::new());
        }
        single(self.step_type(), &networks)
    }
}

#[derive(Debug, Serialize)]
struct DhcpAllocationRequest {
    api_vip_mac: String,
    ingress_vip_mac: String,
    interface: String,
    cluster_id: Uuid,
}

/// Locally administered MAC derived from the cluster ID, so every host asks
/// the DHCP server for the same lease
fn vip_mac(cluster_id: Uuid, salt: u8) -> String {
    let bytes = cluster_id.as_bytes();
    format!(
        "02:00:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3] ^ salt
    )
}

/// Requests DHCP leases for the API and ingress VIPs
#[derive(Debug, Clone, Copy, Default)]
pub struct DhcpAllocateCmd;

impl CommandGenerator for DhcpAllocateCmd {
    fn step_type(&self) -> StepType {
        StepType::DhcpLeaseAllocate
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        let Some(cluster) = ctx.cluster.filter(|c| c.vip_dhcp_allocation) else {
            return Ok(Vec::new());
        };
        let machine_network: IpNetwork = cluster
            .primary_machine_network()
            .ok_or_else(|| {
                CoreError::ValidationContext(format!("cluster {} has no machine network", cluster.id))
            })?
            .parse()
            .map_err(|e| CoreError::ValidationContext(format!("cluster {}: invalid machine network: {e}", cluster.id)))?;

        let inventory = ctx.require_inventory()?;
        let interface = inventory
            .interfaces
            .iter()
            .find(|nic| {
                nic.ipv4_addresses
                    .iter()
                    .chain(&nic.ipv6_addresses)
                    .filter_map(|cidr| cidr.parse::<IpNetwork>().ok())
                    .any(|addr| machine_network.contains(addr.ip()))
            })
            .ok_or_else(|| {
                CoreError::ValidationContext(format!(
                    "host {} has no interface in machine network {machine_network}",
                    ctx.host.id
                ))
            })?;

        single(
            self.step_type(),
            &DhcpAllocationRequest {
                api_vip_mac: vip_mac(cluster.id, 0),
                ingress_vip_mac: vip_mac(cluster.id, 1),
                interface: interface.name.clone(),
                cluster_id: cluster.id,
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct InventoryRequest {
    host_id: Uuid,
    infra_env_id: Uuid,
}

/// Collects the hardware inventory
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryCmd;

impl CommandGenerator for InventoryCmd {
    fn step_type(&self) -> StepType {
        StepType::Inventory
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        single(
            self.step_type(),
            &InventoryRequest {
                host_id: ctx.host.id,
                infra_env_id: ctx.host.infra_env_id,
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct NtpSyncRequest {
    ntp_source: String,
}

/// Synchronises the host clock, with the cluster's extra NTP source if any
#[derive(Debug, Clone, Copy, Default)]
pub struct NtpSyncCmd;

impl CommandGenerator for NtpSyncCmd {
    fn step_type(&self) -> StepType {
        StepType::NtpSynchronizer
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        let ntp_source = ctx
            .cluster
            .and_then(|c| c.additional_ntp_source.clone())
            .unwrap_or_default();
        single(self.step_type(), &NtpSyncRequest { ntp_source })
    }
}

/// Installation disk of the host: the one chosen by the user, otherwise the
/// first eligible disk
fn installation_disk(hardware: &dyn HardwareValidator, ctx: &StepContext<'_>) -> Result<String> {
    if let Some(path) = ctx.host.installation_disk_path.as_deref().filter(|p| !p.is_empty()) {
        return Ok(path.to_string());
    }
    let inventory = ctx.require_inventory()?;
    hardware
        .eligible_disks(inventory)
        .first()
        .map(|disk| disk.device_path())
        .ok_or_else(|| CoreError::ValidationContext(format!("host {} has no eligible installation disk", ctx.host.id)))
}

#[derive(Debug, Serialize)]
struct InstallRequest {
    cluster_id: Uuid,
    host_id: Uuid,
    infra_env_id: Uuid,
    role: HostRole,
    high_availability_mode: String,
    boot_device: String,
}

/// Starts the installer on the host
pub struct InstallCmd {
    hardware: Arc<dyn HardwareValidator>,
}

impl InstallCmd {
    pub fn new(hardware: Arc<dyn HardwareValidator>) -> Self {
        Self { hardware }
    }
}

impl CommandGenerator for InstallCmd {
    fn step_type(&self) -> StepType {
        StepType::Install
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        let cluster = ctx.require_cluster()?;
        let boot_device = installation_disk(self.hardware.as_ref(), ctx)?;
        let role = if ctx.host.bootstrap {
            HostRole::Bootstrap
        } else {
            ctx.host.effective_role()
        };
        single(
            self.step_type(),
            &InstallRequest {
                cluster_id: cluster.id,
                host_id: ctx.host.id,
                infra_env_id: ctx.host.infra_env_id,
                role,
                high_availability_mode: cluster.high_availability_mode.as_str().to_string(),
                boot_device,
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct DiskSpeedCheckRequest {
    path: String,
}

/// Measures the installation disk's sync latency once
pub struct DiskSpeedCheckCmd {
    hardware: Arc<dyn HardwareValidator>,
}

impl DiskSpeedCheckCmd {
    pub fn new(hardware: Arc<dyn HardwareValidator>) -> Self {
        Self { hardware }
    }
}

impl CommandGenerator for DiskSpeedCheckCmd {
    fn step_type(&self) -> StepType {
        StepType::InstallationDiskSpeedCheck
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        if ctx.host.disk_speed.as_ref().is_some_and(|speed| speed.tested) {
            return Ok(Vec::new());
        }
        let path = installation_disk(self.hardware.as_ref(), ctx)?;
        single(self.step_type(), &DiskSpeedCheckRequest { path })
    }
}

#[derive(Debug, Serialize)]
struct ImageAvailabilityRequest {
    images: Vec<String>,
}

/// Pulls the configured installation images the host has not pulled yet
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAvailabilityCmd;

impl CommandGenerator for ImageAvailabilityCmd {
    fn step_type(&self) -> StepType {
        StepType::ContainerImageAvailability
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        let images: Vec<String> = ctx
            .config
            .installation_images
            .iter()
            .filter(|image| {
                ctx.host
                    .images_status
                    .get(image.as_str())
                    .is_none_or(|status| status.result != ImageAvailabilityResult::Success)
            })
            .cloned()
            .collect();
        if images.is_empty() {
            return Ok(Vec::new());
        }
        single(self.step_type(), &ImageAvailabilityRequest { images })
    }
}

/// Step without arguments
#[derive(Debug, Clone, Copy)]
pub struct BareCmd(pub StepType);

impl CommandGenerator for BareCmd {
    fn step_type(&self) -> StepType {
        self.0
    }

    fn steps(&self, _ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        Ok(vec![Step::new(self.0, Vec::new())])
    }
}

#[derive(Debug, Serialize)]
struct LogsGatherRequest {
    cluster_id: Option<Uuid>,
    host_id: Uuid,
    bootstrap: bool,
}

/// Uploads installation logs until they are collected
#[derive(Debug, Clone, Copy, Default)]
pub struct LogsGatherCmd;

impl CommandGenerator for LogsGatherCmd {
    fn step_type(&self) -> StepType {
        StepType::LogsGather
    }

    fn steps(&self, ctx: &StepContext<'_>) -> Result<Vec<Step>> {
        if matches!(ctx.host.logs_info, LogsState::Completed | LogsState::Timeout) {
            return Ok(Vec::new());
        }
        single(
            self.step_type(),
            &LogsGatherRequest {
                cluster_id: ctx.host.cluster_id,
                host_id: ctx.host.id,
                bootstrap: ctx.host.bootstrap,
            },
        )
    }
}
