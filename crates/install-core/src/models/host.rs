//! Host model.
//!
//! A host is one physical or virtual machine. `status` is only ever written
//! through a state-machine transition, and every such write is guarded by the
//! status the writer last observed.

use crate::error::{CoreError, Result};
use crate::models::inventory::Inventory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

string_enum! {
    /// Lifecycle status of a host
    pub enum HostStatus {
        /// Row not created yet
        Unregistered => "",
        Discovering => "discovering",
        Known => "known",
        Disconnected => "disconnected",
        Insufficient => "insufficient",
        Disabled => "disabled",
        PreparingForInstallation => "preparing-for-installation",
        PreparingSuccessful => "preparing-successful",
        PendingForInput => "pending-for-input",
        Installing => "installing",
        InstallingInProgress => "installing-in-progress",
        InstallingPendingUserAction => "installing-pending-user-action",
        Resetting => "resetting",
        ResettingPendingUserAction => "resetting-pending-user-action",
        Installed => "installed",
        Error => "error",
        Cancelled => "cancelled",
        AddedToExistingCluster => "added-to-existing-cluster",
        DiscoveringUnbound => "discovering-unbound",
        KnownUnbound => "known-unbound",
        DisconnectedUnbound => "disconnected-unbound",
        InsufficientUnbound => "insufficient-unbound",
        DisabledUnbound => "disabled-unbound",
        Binding => "binding",
        Unbinding => "unbinding",
        UnbindingPendingUserAction => "unbinding-pending-user-action",
        Reclaiming => "reclaiming",
        ReclaimingRebooting => "reclaiming-rebooting",
    }
}

impl HostStatus {
    /// Statuses of hosts that are not bound to any cluster
    pub const UNBOUND: &'static [HostStatus] = &[
        HostStatus::DiscoveringUnbound,
        HostStatus::KnownUnbound,
        HostStatus::DisconnectedUnbound,
        HostStatus::InsufficientUnbound,
        HostStatus::DisabledUnbound,
        HostStatus::Unbinding,
        HostStatus::UnbindingPendingUserAction,
        HostStatus::Reclaiming,
        HostStatus::ReclaimingRebooting,
    ];

    /// Whether the host sits in the pool (not part of a cluster)
    #[must_use]
    pub fn is_unbound(self) -> bool {
        Self::UNBOUND.contains(&self)
    }
}

impl Default for HostStatus {
    fn default() -> Self {
        Self::Unregistered
    }
}

string_enum! {
    /// Role of a host in the cluster
    pub enum HostRole {
        AutoAssign => "auto-assign",
        Master => "master",
        Worker => "worker",
        Bootstrap => "bootstrap",
    }
}

impl Default for HostRole {
    fn default() -> Self {
        Self::AutoAssign
    }
}

string_enum! {
    /// Whether the host takes part in the initial bring-up or joins an
    /// existing cluster
    pub enum HostKind {
        Host => "Host",
        AddToExistingClusterHost => "AddToExistingClusterHost",
    }
}

impl Default for HostKind {
    fn default() -> Self {
        Self::Host
    }
}

string_enum! {
    /// Installation stage reported by the agent
    pub enum HostStage {
        StartingInstallation => "Starting installation",
        WaitingForControlPlane => "Waiting for control plane",
        WaitingForController => "Waiting for controller",
        WaitingForBootkube => "Waiting for bootkube",
        Installing => "Installing",
        WritingImageToDisk => "Writing image to disk",
        Rebooting => "Rebooting",
        WaitingForIgnition => "Waiting for ignition",
        Configuring => "Configuring",
        Joined => "Joined",
        Done => "Done",
        Failed => "Failed",
    }
}

impl HostStage {
    /// Stages in which a wrong boot order makes the host look stuck
    pub const WRONG_BOOT_ORDER_STAGES: &'static [HostStage] = &[
        HostStage::WaitingForControlPlane,
        HostStage::WaitingForController,
        HostStage::WaitingForBootkube,
        HostStage::Rebooting,
    ];

    /// Ordered stages a host goes through for the given role
    #[must_use]
    pub fn stages_for(role: HostRole, bootstrap: bool) -> &'static [HostStage] {
        const BOOTSTRAP: &[HostStage] = &[
            HostStage::StartingInstallation,
            HostStage::Installing,
            HostStage::WaitingForControlPlane,
            HostStage::WritingImageToDisk,
            HostStage::Rebooting,
            HostStage::Configuring,
            HostStage::Joined,
            HostStage::Done,
        ];
        const MASTER: &[HostStage] = &[
            HostStage::StartingInstallation,
            HostStage::Installing,
            HostStage::WritingImageToDisk,
            HostStage::Rebooting,
            HostStage::WaitingForIgnition,
            HostStage::Configuring,
            HostStage::Joined,
            HostStage::Done,
        ];
        const WORKER: &[HostStage] = &[
            HostStage::StartingInstallation,
            HostStage::Installing,
            HostStage::WritingImageToDisk,
            HostStage::Rebooting,
            HostStage::WaitingForIgnition,
            HostStage::Configuring,
            HostStage::Done,
        ];
        match (role, bootstrap) {
            (_, true) | (HostRole::Bootstrap, _) => BOOTSTRAP,
            (HostRole::Master, false) => MASTER,
            _ => WORKER,
        }
    }
}

string_enum! {
    /// Log collection state
    pub enum LogsState {
        Empty => "",
        Requested => "requested",
        Collecting => "collecting",
        Completed => "completed",
        Timeout => "timeout",
    }
}

impl Default for LogsState {
    fn default() -> Self {
        Self::Empty
    }
}

string_enum! {
    /// Whether the discovery image is still reachable by the host
    pub enum MediaStatus {
        Connected => "connected",
        Disconnected => "disconnected",
    }
}

/// Installation progress of a host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostProgress {
    /// Current installation stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<HostStage>,
    /// Free-form detail reported with the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<String>,
    /// When the current stage started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_started_at: Option<DateTime<Utc>>,
    /// Last time the stage timestamp was refreshed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_updated_at: Option<DateTime<Utc>>,
    /// Percentage of stages done
    #[serde(default)]
    pub installation_percentage: i64,
}

/// Result of the installation disk speed check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpeed {
    /// Whether the check ran to completion
    pub tested: bool,
    /// Exit code of the check; 0 on success
    pub exit_code: i64,
    /// Measured sync duration in milliseconds
    pub speed_ms: i64,
}

string_enum! {
    /// Outcome of pulling a container image
    pub enum ImageAvailabilityResult {
        Success => "success",
        Failure => "failure",
    }
}

/// Container image pull report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAvailability {
    /// Image reference
    pub name: String,
    /// Pull outcome
    pub result: ImageAvailabilityResult,
    /// Download rate in MB/s
    #[serde(default)]
    pub download_rate: f64,
}

/// One NTP source as seen by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtpSource {
    /// Source address or name
    pub source_name: String,
    /// Whether the host is synced against this source
    pub synced: bool,
}

/// A machine being provisioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Host ID
    pub id: Uuid,
    /// Infra-env (discovery image) the host booted from
    pub infra_env_id: Uuid,
    /// Owning cluster; `None` while the host sits in the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<Uuid>,
    /// Day-1 or day-2 host
    #[serde(default)]
    pub kind: HostKind,
    /// Lifecycle status
    #[serde(default)]
    pub status: HostStatus,
    /// Human-readable explanation of the status
    #[serde(default)]
    pub status_info: String,
    /// When the status last changed
    pub status_updated_at: DateTime<Utc>,
    /// Last agent check-in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Assigned role
    #[serde(default)]
    pub role: HostRole,
    /// Role inferred from hardware
    #[serde(default)]
    pub suggested_role: HostRole,
    /// Whether the host runs the bootstrap control plane
    #[serde(default)]
    pub bootstrap: bool,
    /// Hostname requested by the user, overrides the reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_hostname: Option<String>,
    /// Raw inventory JSON as reported by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    /// Device path of the disk the OS goes on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_disk_path: Option<String>,
    /// Installation disk speed check result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_speed: Option<DiskSpeed>,
    /// Serialized per-category validation results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validations_info: Option<String>,
    /// Installation progress
    #[serde(default)]
    pub progress: HostProgress,
    /// Discovery media state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_status: Option<MediaStatus>,
    /// NTP sources reported by the agent
    #[serde(default)]
    pub ntp_sources: Vec<NtpSource>,
    /// Container image pull results keyed by image name
    #[serde(default)]
    pub images_status: BTreeMap<String, ImageAvailability>,
    /// Whether the API VIP of the existing cluster is reachable (day-2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_vip_connectivity: Option<bool>,
    /// Log collection state
    #[serde(default)]
    pub logs_info: LogsState,
    /// When log collection was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_started_at: Option<DateTime<Utc>>,
    /// When logs were last received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_collected_at: Option<DateTime<Utc>>,
    /// Agent version that registered the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_agent_version: Option<String>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

impl Host {
    /// A fresh, unregistered host
    #[must_use]
    pub fn new(id: Uuid, infra_env_id: Uuid, cluster_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            infra_env_id,
            cluster_id,
            kind: HostKind::Host,
            status: HostStatus::Unregistered,
            status_info: String::new(),
            status_updated_at: now,
            checked_in_at: None,
            role: HostRole::AutoAssign,
            suggested_role: HostRole::AutoAssign,
            bootstrap: false,
            requested_hostname: None,
            inventory: None,
            installation_disk_path: None,
            disk_speed: None,
            validations_info: None,
            progress: HostProgress::default(),
            media_status: None,
            ntp_sources: Vec::new(),
            images_status: BTreeMap::new(),
            api_vip_connectivity: None,
            logs_info: LogsState::Empty,
            logs_started_at: None,
            logs_collected_at: None,
            discovery_agent_version: None,
            created_at: now,
        }
    }

    /// Whether this host joins an already installed cluster
    #[must_use]
    pub fn is_day2(&self) -> bool {
        self.kind == HostKind::AddToExistingClusterHost
    }

    /// Parses the stored inventory, `None` when nothing was reported yet
    pub fn parsed_inventory(&self) -> Result<Option<Inventory>> {
        match self.inventory.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| CoreError::ValidationContext(format!("host {}: invalid inventory: {e}", self.id))),
        }
    }

    /// Requested hostname if set, otherwise the one the agent reported
    #[must_use]
    pub fn effective_hostname(&self, inventory: Option<&Inventory>) -> Option<String> {
        self.requested_hostname
            .clone()
            .filter(|h| !h.is_empty())
            .or_else(|| inventory.map(|inv| inv.hostname.clone()).filter(|h| !h.is_empty()))
    }

    /// Effective role, treating the bootstrap flag as a master
    #[must_use]
    pub fn effective_role(&self) -> HostRole {
        match self.role {
            HostRole::AutoAssign => self.suggested_role,
            HostRole::Bootstrap => HostRole::Master,
            role => role,
        }
    }

    /// Name used in status messages and events
    #[must_use]
    pub fn display_name(&self) -> String {
        self.requested_hostname
            .clone()
            .or_else(|| {
                self.parsed_inventory()
                    .ok()
                    .flatten()
                    .map(|inv| inv.hostname)
                    .filter(|h| !h.is_empty())
            })
            .unwrap_or_else(|| self.id.to_string())
    }
}
