//! Runtime configuration.
//!
//! `Config` is built once at startup and handed to every manager by
//! reference. Values come from environment variables, with hardware
//! thresholds optionally overridden by a YAML file.
//!
//! Duration values use `humantime` syntax (`90m`, `1h30m`, `45s`).
//! Anything that fails to parse is a startup error; nothing falls back to a
//! default silently.

use crate::error::{CoreError, Result};
use crate::models::{FinalizingStage, HostRole, HostStage, MonitoredOperator, OperatorType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// Poll interval handed to agents when nothing more specific applies
pub const DEFAULT_NEXT_STEP_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum hardware for one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirements {
    /// Logical CPU cores
    pub cpu_cores: i64,
    /// RAM in MiB
    pub ram_mib: i64,
    /// Installation disk size in GB
    pub disk_size_gb: i64,
    /// Maximum acceptable installation disk sync latency
    pub installation_disk_speed_threshold_ms: i64,
}

impl RoleRequirements {
    /// RAM requirement in bytes
    #[must_use]
    pub fn ram_bytes(&self) -> i64 {
        self.ram_mib * 1024 * 1024
    }

    /// Disk requirement in bytes
    #[must_use]
    pub fn disk_bytes(&self) -> i64 {
        self.disk_size_gb * 1_000_000_000
    }
}

/// Per-role hardware thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareRequirements {
    /// Control plane nodes in a highly available cluster
    pub master: RoleRequirements,
    /// Control plane node of a single-node cluster
    pub single_node_master: RoleRequirements,
    /// Compute nodes
    pub worker: RoleRequirements,
    /// Floor applied before a role is known
    pub generic: RoleRequirements,
}

impl Default for HardwareRequirements {
    fn default() -> Self {
        Self {
            master: RoleRequirements {
                cpu_cores: 4,
                ram_mib: 16 * 1024,
                disk_size_gb: 100,
                installation_disk_speed_threshold_ms: 10,
            },
            single_node_master: RoleRequirements {
                cpu_cores: 8,
                ram_mib: 16 * 1024,
                disk_size_gb: 100,
                installation_disk_speed_threshold_ms: 10,
            },
            worker: RoleRequirements {
                cpu_cores: 2,
                ram_mib: 8 * 1024,
                disk_size_gb: 100,
                installation_disk_speed_threshold_ms: 10,
            },
            generic: RoleRequirements {
                cpu_cores: 2,
                ram_mib: 8 * 1024,
                disk_size_gb: 100,
                installation_disk_speed_threshold_ms: 10,
            },
        }
    }
}

impl HardwareRequirements {
    /// Requirements for an assigned role; `None` while the role is still
    /// `auto-assign`
    #[must_use]
    pub fn for_role(&self, role: HostRole, single_node: bool) -> Option<&RoleRequirements> {
        match role {
            HostRole::Master | HostRole::Bootstrap if single_node => Some(&self.single_node_master),
            HostRole::Master | HostRole::Bootstrap => Some(&self.master),
            HostRole::Worker => Some(&self.worker),
            HostRole::AutoAssign => None,
        }
    }
}

/// Timeout tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Per installation stage
    pub host_stages: BTreeMap<HostStage, Duration>,
    /// Stages missing from `host_stages`
    pub host_stage_default: Duration,
    /// Rebooting on a single-node cluster takes longer
    pub single_node_reboot: Duration,
    /// Per finalizing stage; a missing entry means no timeout
    pub finalizing_stages: BTreeMap<FinalizingStage, Duration>,
    /// Host in `installing` without progress
    pub host_installation: Duration,
    /// Whole cluster installation
    pub cluster_installation: Duration,
    /// Cluster in `preparing-for-installation`
    pub cluster_prepare: Duration,
    /// Host log upload
    pub host_log_collection: Duration,
    /// Host log upload not started
    pub host_log_pending: Duration,
    /// Controller log upload
    pub cluster_log_collection: Duration,
    /// Controller log upload not started
    pub cluster_log_pending: Duration,
    /// Host considered gone after this long without a check-in
    pub host_disconnection: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let host_stages = [
            (HostStage::StartingInstallation, 30 * MINUTE),
            (HostStage::WaitingForControlPlane, 60 * MINUTE),
            (HostStage::WaitingForController, 60 * MINUTE),
            (HostStage::WaitingForBootkube, 60 * MINUTE),
            (HostStage::Installing, 60 * MINUTE),
            (HostStage::WritingImageToDisk, 30 * MINUTE),
            (HostStage::Rebooting, 70 * MINUTE),
            (HostStage::WaitingForIgnition, 60 * MINUTE),
            (HostStage::Configuring, 60 * MINUTE),
            (HostStage::Joined, 60 * MINUTE),
        ]
        .into_iter()
        .map(|(stage, secs)| (stage, Duration::from_secs(secs)))
        .collect();

        let finalizing_stages = [
            (FinalizingStage::WaitingForFinalizing, 5 * HOUR),
            (FinalizingStage::WaitingForClusterOperators, 10 * HOUR),
            (FinalizingStage::WaitingForOlmOperatorsCsvInitialization, 10 * MINUTE),
            (FinalizingStage::WaitingForOlmOperatorsCsv, 70 * MINUTE),
        ]
        .into_iter()
        .map(|(stage, secs)| (stage, Duration::from_secs(secs)))
        .collect();

        Self {
            host_stages,
            host_stage_default: Duration::from_secs(60 * MINUTE),
            single_node_reboot: Duration::from_secs(80 * MINUTE),
            finalizing_stages,
            host_installation: Duration::from_secs(20 * MINUTE),
            cluster_installation: Duration::from_secs(24 * HOUR),
            cluster_prepare: Duration::from_secs(10 * MINUTE),
            host_log_collection: Duration::from_secs(10 * MINUTE),
            host_log_pending: Duration::from_secs(2 * MINUTE),
            cluster_log_collection: Duration::from_secs(10 * MINUTE),
            cluster_log_pending: Duration::from_secs(2 * MINUTE),
            host_disconnection: Duration::from_secs(3 * MINUTE),
        }
    }
}

impl Timeouts {
    /// Maximum time a host may spend in `stage`
    #[must_use]
    pub fn host_stage(&self, stage: Option<HostStage>, single_node: bool) -> Duration {
        match stage {
            Some(HostStage::Rebooting) if single_node => self.single_node_reboot,
            Some(stage) => self.host_stages.get(&stage).copied().unwrap_or(self.host_stage_default),
            None => self.host_stage_default,
        }
    }

    /// Maximum time the cluster may spend in a finalizing stage.
    ///
    /// The OLM stages wait for the slowest OLM operator, so their timeout is
    /// the larger of the configured one and any operator-declared timeout.
    /// Other stages ignore operator timeouts. `None` means no timeout.
    #[must_use]
    pub fn finalizing_stage(&self, stage: FinalizingStage, operators: &[MonitoredOperator]) -> Option<Duration> {
        let configured = self.finalizing_stages.get(&stage).copied()?;
        if !stage.is_olm() {
            return Some(configured);
        }
        let declared = operators
            .iter()
            .filter(|o| o.operator_type == OperatorType::Olm)
            .filter_map(|o| u64::try_from(o.timeout_seconds).ok())
            .max()
            .map(Duration::from_secs)
            .unwrap_or_default();
        Some(configured.max(declared))
    }
}

/// Orchestration core configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Hardware thresholds
    pub hardware: HardwareRequirements,
    /// Timeout tables
    pub timeouts: Timeouts,
    /// Host validation IDs excluded from guard evaluation
    pub disabled_host_validations: Vec<String>,
    /// Cluster validation IDs excluded from guard evaluation
    pub disabled_cluster_validations: Vec<String>,
    /// Step types never handed to agents
    pub disabled_steps: Vec<String>,
    /// Images hosts must be able to pull before installing
    pub installation_images: Vec<String>,
    /// Entities loaded per monitor query
    pub monitor_batch_size: usize,
    /// Period of the host monitor pass
    pub host_monitor_interval: Duration,
    /// Period of the cluster monitor pass
    pub cluster_monitor_interval: Duration,
    /// Default agent poll interval
    pub next_step_interval: Duration,
    /// Timed-out finalizing stages warn instead of failing the cluster
    pub enable_soft_timeouts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hardware: HardwareRequirements::default(),
            timeouts: Timeouts::default(),
            disabled_host_validations: Vec::new(),
            disabled_cluster_validations: Vec::new(),
            disabled_steps: Vec::new(),
            installation_images: Vec::new(),
            monitor_batch_size: 100,
            host_monitor_interval: Duration::from_secs(8),
            cluster_monitor_interval: Duration::from_secs(10),
            next_step_interval: DEFAULT_NEXT_STEP_INTERVAL,
            enable_soft_timeouts: false,
        }
    }
}

/// Layout of the optional `INSTALL_CONFIG_FILE`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    hardware: Option<HardwareRequirements>,
}

impl Config {
    /// Reads configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns the raw value of
    /// a variable or `None` when unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for stage in HostStage::ALL {
            let key = stage_env_key("HOST_STAGE", stage.as_str());
            if let Some(raw) = get(&key) {
                config.timeouts.host_stages.insert(*stage, parse_duration(&key, &raw)?);
            }
        }
        for stage in FinalizingStage::ALL {
            let key = stage_env_key("FINALIZING_STAGE", stage.as_str());
            if let Some(raw) = get(&key) {
                config.timeouts.finalizing_stages.insert(*stage, parse_duration(&key, &raw)?);
            }
        }

        let timeouts = &mut config.timeouts;
        for (key, slot) in [
            ("HOST_INSTALLATION_TIMEOUT", &mut timeouts.host_installation),
            ("CLUSTER_INSTALLATION_TIMEOUT", &mut timeouts.cluster_installation),
            ("CLUSTER_PREPARE_TIMEOUT", &mut timeouts.cluster_prepare),
            ("HOST_LOG_COLLECTION_TIMEOUT", &mut timeouts.host_log_collection),
            ("HOST_LOG_PENDING_TIMEOUT", &mut timeouts.host_log_pending),
            ("CLUSTER_LOG_COLLECTION_TIMEOUT", &mut timeouts.cluster_log_collection),
            ("CLUSTER_LOG_PENDING_TIMEOUT", &mut timeouts.cluster_log_pending),
            ("HOST_DISCONNECTION_TIMEOUT", &mut timeouts.host_disconnection),
        ] {
            if let Some(raw) = get(key) {
                *slot = parse_duration(key, &raw)?;
            }
        }

        if let Some(raw) = get("DISABLED_HOST_VALIDATIONS") {
            config.disabled_host_validations = parse_id_list("DISABLED_HOST_VALIDATIONS", &raw)?;
        }
        if let Some(raw) = get("DISABLED_CLUSTER_VALIDATIONS") {
            config.disabled_cluster_validations = parse_id_list("DISABLED_CLUSTER_VALIDATIONS", &raw)?;
        }
        if let Some(raw) = get("DISABLED_STEPS") {
            config.disabled_steps = parse_id_list("DISABLED_STEPS", &raw)?;
        }
        if let Some(raw) = get("INSTALLATION_IMAGES") {
            config.installation_images = parse_id_list("INSTALLATION_IMAGES", &raw)?;
        }

        if let Some(raw) = get("MONITOR_BATCH_SIZE") {
            config.monitor_batch_size = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| CoreError::Configuration(format!("MONITOR_BATCH_SIZE: expected a positive integer, got '{raw}'")))?;
        }
        if let Some(raw) = get("HOST_MONITOR_INTERVAL") {
            config.host_monitor_interval = parse_duration("HOST_MONITOR_INTERVAL", &raw)?;
        }
        if let Some(raw) = get("CLUSTER_MONITOR_INTERVAL") {
            config.cluster_monitor_interval = parse_duration("CLUSTER_MONITOR_INTERVAL", &raw)?;
        }
        if let Some(raw) = get("NEXT_STEP_INTERVAL") {
            config.next_step_interval = parse_duration("NEXT_STEP_INTERVAL", &raw)?;
        }
        if let Some(raw) = get("ENABLE_SOFT_TIMEOUTS") {
            config.enable_soft_timeouts = parse_bool("ENABLE_SOFT_TIMEOUTS", &raw)?;
        }

        if let Some(path) = get("INSTALL_CONFIG_FILE") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| CoreError::Configuration(format!("INSTALL_CONFIG_FILE: cannot read {path}: {e}")))?;
            let file: FileConfig = serde_yaml::from_str(&raw)
                .map_err(|e| CoreError::Configuration(format!("INSTALL_CONFIG_FILE: invalid YAML in {path}: {e}")))?;
            if let Some(hardware) = file.hardware {
                info!("Loaded hardware requirements from {}", path);
                config.hardware = hardware;
            }
        }

        Ok(config)
    }
}

/// `HOST_STAGE_WRITING_IMAGE_TO_DISK_TIMEOUT` style key for a stage name
#[must_use]
pub fn stage_env_key(prefix: &str, stage: &str) -> String {
    format!("{prefix}_{}_TIMEOUT", stage.to_uppercase().replace(' ', "_"))
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| CoreError::Configuration(format!("{key}: invalid duration '{raw}': {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CoreError::Configuration(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

/// Parses a comma separated list or a JSON array of IDs
pub fn parse_id_list(key: &str, raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    let items: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| CoreError::Configuration(format!("{key}: invalid JSON list: {e}")))?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };

    items
        .into_iter()
        .map(|item| {
            let item = item.trim().to_string();
            if item.is_empty() {
                Err(CoreError::Configuration(format!("{key}: empty element in '{raw}'")))
            } else {
                Ok(item)
            }
        })
        .collect()
}
