//! Cluster model.

use crate::models::host::LogsState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Control-plane nodes required for a highly available cluster
pub const MIN_MASTERS_NEEDED_FOR_INSTALLATION: usize = 3;

/// Workers required before finalizing when workers were requested
pub const MIN_WORKERS_NEEDED_FOR_INSTALLATION: usize = 2;

string_enum! {
    /// Lifecycle status of a cluster
    pub enum ClusterStatus {
        /// Row not created yet
        Unregistered => "",
        Insufficient => "insufficient",
        Ready => "ready",
        Error => "error",
        PreparingForInstallation => "preparing-for-installation",
        PendingForInput => "pending-for-input",
        Installing => "installing",
        Finalizing => "finalizing",
        Installed => "installed",
        AddingHosts => "adding-hosts",
        Cancelled => "cancelled",
        InstallingPendingUserAction => "installing-pending-user-action",
    }
}

impl Default for ClusterStatus {
    fn default() -> Self {
        Self::Unregistered
    }
}

string_enum! {
    /// New cluster bring-up, or a day-2 cluster receiving extra hosts
    pub enum ClusterKind {
        Cluster => "Cluster",
        AddHostsCluster => "AddHostsCluster",
    }
}

impl Default for ClusterKind {
    fn default() -> Self {
        Self::Cluster
    }
}

string_enum! {
    /// Control plane topology
    pub enum HighAvailabilityMode {
        Full => "Full",
        /// Single-node cluster
        None => "None",
    }
}

impl Default for HighAvailabilityMode {
    fn default() -> Self {
        Self::Full
    }
}

string_enum! {
    /// Cluster network plugin
    pub enum NetworkType {
        OpenShiftSdn => "OpenShiftSDN",
        OvnKubernetes => "OVNKubernetes",
    }
}

string_enum! {
    /// Target platform
    pub enum PlatformType {
        Baremetal => "baremetal",
        None => "none",
        VSphere => "vsphere",
    }
}

impl Default for PlatformType {
    fn default() -> Self {
        Self::Baremetal
    }
}

string_enum! {
    /// Outcome of the asynchronous pre-install work
    pub enum PreparationStatus {
        Pending => "",
        Succeeded => "success",
        Failed => "failed",
    }
}

impl Default for PreparationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

string_enum! {
    /// Sub-phase of finalizing, each with its own timeout
    pub enum FinalizingStage {
        WaitingForFinalizing => "Waiting for finalizing",
        WaitingForClusterOperators => "Waiting for cluster operators",
        WaitingForOlmOperatorsCsvInitialization => "Waiting for OLM operators CSV initialization",
        WaitingForOlmOperatorsCsv => "Waiting for OLM operators CSV",
        Done => "Done",
    }
}

impl FinalizingStage {
    /// Stages whose timeout depends on the OLM operators installed
    #[must_use]
    pub fn is_olm(self) -> bool {
        matches!(
            self,
            Self::WaitingForOlmOperatorsCsvInitialization | Self::WaitingForOlmOperatorsCsv
        )
    }

    /// Stages whose timeout never fails the installation
    #[must_use]
    pub fn is_non_failing(self) -> bool {
        self.is_olm()
    }
}

string_enum! {
    /// Kind of monitored operator
    pub enum OperatorType {
        Builtin => "builtin",
        Olm => "olm",
    }
}

string_enum! {
    /// Reported operator status
    pub enum OperatorStatus {
        Progressing => "progressing",
        Available => "available",
        Failed => "failed",
    }
}

/// An operator whose rollout is tracked while finalizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredOperator {
    /// Operator name, e.g. `console`, `odf`
    pub name: String,
    /// Built-in or OLM
    pub operator_type: OperatorType,
    /// Latest reported status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OperatorStatus>,
    /// Timeout declared by the operator, in seconds
    #[serde(default)]
    pub timeout_seconds: i64,
}

/// A cluster network entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNetwork {
    /// Pod network CIDR
    pub cidr: String,
    /// Prefix handed out to each node
    pub host_prefix: u8,
}

/// Weighted installation progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterProgress {
    /// Preparing-for-installation stage percentage
    #[serde(default)]
    pub preparing_for_installation_stage_percentage: i64,
    /// Installing stage percentage
    #[serde(default)]
    pub installing_stage_percentage: i64,
    /// Finalizing stage percentage
    #[serde(default)]
    pub finalizing_stage_percentage: i64,
    /// Weighted total
    #[serde(default)]
    pub total_percentage: i64,
    /// Current finalizing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizing_stage: Option<FinalizingStage>,
    /// When the current finalizing stage started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizing_stage_started_at: Option<DateTime<Utc>>,
    /// Set once a soft timeout fired for the current finalizing stage
    #[serde(default)]
    pub finalizing_stage_timed_out: bool,
}

/// The cluster being assembled from hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster ID
    pub id: Uuid,
    /// Cluster name
    pub name: String,
    /// New or day-2 cluster
    #[serde(default)]
    pub kind: ClusterKind,
    /// Lifecycle status
    #[serde(default)]
    pub status: ClusterStatus,
    /// Human-readable explanation of the status
    #[serde(default)]
    pub status_info: String,
    /// When the status last changed
    pub status_updated_at: DateTime<Utc>,
    /// Control plane topology
    #[serde(default)]
    pub high_availability_mode: HighAvailabilityMode,
    /// Target platform
    #[serde(default)]
    pub platform: PlatformType,
    /// Base DNS domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dns_domain: Option<String>,
    /// Whether a pull secret was provided
    #[serde(default)]
    pub pull_secret_set: bool,
    /// Machine network CIDRs
    #[serde(default)]
    pub machine_networks: Vec<String>,
    /// Cluster (pod) networks
    #[serde(default)]
    pub cluster_networks: Vec<ClusterNetwork>,
    /// Service network CIDRs
    #[serde(default)]
    pub service_networks: Vec<String>,
    /// API virtual IPs
    #[serde(default)]
    pub api_vips: Vec<String>,
    /// Ingress virtual IPs
    #[serde(default)]
    pub ingress_vips: Vec<String>,
    /// VIPs are allocated through DHCP
    #[serde(default)]
    pub vip_dhcp_allocation: bool,
    /// Networking is managed outside the installer
    #[serde(default)]
    pub user_managed_networking: bool,
    /// Network plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<NetworkType>,
    /// Extra NTP source pushed to the hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_ntp_source: Option<String>,
    /// Operators tracked while finalizing
    #[serde(default)]
    pub monitored_operators: Vec<MonitoredOperator>,
    /// Weighted progress
    #[serde(default)]
    pub progress: ClusterProgress,
    /// Outcome of pre-install work
    #[serde(default)]
    pub installation_preparation_completion_status: PreparationStatus,
    /// When installation started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_started_at: Option<DateTime<Utc>>,
    /// When installation finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_completed_at: Option<DateTime<Utc>>,
    /// Controller log collection state
    #[serde(default)]
    pub logs_info: LogsState,
    /// When controller log collection started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_logs_started_at: Option<DateTime<Utc>>,
    /// When controller logs were last received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_logs_collected_at: Option<DateTime<Utc>>,
    /// Serialized per-category validation results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validations_info: Option<String>,
    /// Hosts grouped by the machine network they can all reach, keyed by CIDR
    #[serde(default)]
    pub connectivity_majority_groups: BTreeMap<String, Vec<Uuid>>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

impl Cluster {
    /// A fresh, unregistered cluster
    #[must_use]
    pub fn new(id: Uuid, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ClusterKind::Cluster,
            status: ClusterStatus::Unregistered,
            status_info: String::new(),
            status_updated_at: now,
            high_availability_mode: HighAvailabilityMode::Full,
            platform: PlatformType::Baremetal,
            base_dns_domain: None,
            pull_secret_set: false,
            machine_networks: Vec::new(),
            cluster_networks: Vec::new(),
            service_networks: Vec::new(),
            api_vips: Vec::new(),
            ingress_vips: Vec::new(),
            vip_dhcp_allocation: false,
            user_managed_networking: false,
            network_type: None,
            additional_ntp_source: None,
            monitored_operators: Vec::new(),
            progress: ClusterProgress::default(),
            installation_preparation_completion_status: PreparationStatus::Pending,
            install_started_at: None,
            install_completed_at: None,
            logs_info: LogsState::Empty,
            controller_logs_started_at: None,
            controller_logs_collected_at: None,
            validations_info: None,
            connectivity_majority_groups: BTreeMap::new(),
            created_at: now,
        }
    }

    /// Single-node cluster
    #[must_use]
    pub fn is_single_node(&self) -> bool {
        self.high_availability_mode == HighAvailabilityMode::None
    }

    /// Masters required before install may start
    #[must_use]
    pub fn required_masters(&self) -> usize {
        if self.is_single_node() { 1 } else { MIN_MASTERS_NEEDED_FOR_INSTALLATION }
    }

    /// Whether the cluster has a given OLM operator
    #[must_use]
    pub fn has_operator(&self, name: &str) -> bool {
        self.monitored_operators.iter().any(|o| o.name == name)
    }

    /// First machine network, if any
    #[must_use]
    pub fn primary_machine_network(&self) -> Option<&str> {
        self.machine_networks.first().map(String::as_str)
    }
}
