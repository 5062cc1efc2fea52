//! Instruction manager.
//!
//! Answers agent polls with the steps that fit the host's status. Hosts
//! installing a new cluster and day-2 hosts joining an existing one have
//! separate status tables; unbound pool hosts only report their inventory.

pub mod commands;
pub mod step;


use crate::config::Config;
use crate::error::Result;
use crate::models::{Cluster, Host, HostStatus};
use crate::store::Store;
use crate::validation::{ConnectivityValidator, HardwareValidator};
use commands::{
    ApiVipConnectivityCheckCmd, BareCmd, CommandGenerator, ConnectivityCheckCmd, DhcpAllocateCmd, DiskSpeedCheckCmd,
    FreeAddressesCmd, ImageAvailabilityCmd, InstallCmd, InventoryCmd, LogsGatherCmd, NtpSyncCmd, StepContext,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub use step::{new_step_id, PostStepAction, Step, StepType, Steps};

/// Poll interval for statuses where the agent has little to do
pub const BACKED_OFF_NEXT_STEP_INTERVAL: Duration = Duration::from_secs(120);

type Generator = Arc<dyn CommandGenerator>;

/// Generators for one status and the poll interval that goes with them
#[derive(Clone)]
struct StatusSteps {
    commands: Vec<Generator>,
    interval: Duration,
}

type StatusTable = BTreeMap<HostStatus, StatusSteps>;

struct Generators {
    connectivity: Generator,
    api_vip: Generator,
    free_addresses: Generator,
    dhcp: Generator,
    inventory: Generator,
    ntp: Generator,
    install: Generator,
    disk_speed: Generator,
    images: Generator,
    reset: Generator,
    stop: Generator,
    logs: Generator,
}

/// Builds agent instructions from host status
pub struct InstructionManager {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    day1: StatusTable,
    day2: StatusTable,
    unbound: StatusSteps,
    disabled: BTreeSet<StepType>,
}

impl std::fmt::Debug for InstructionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionManager")
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

fn plan(commands: &[&Generator], interval: Duration) -> StatusSteps {
    StatusSteps {
        commands: commands.iter().map(|g| Arc::clone(*g)).collect(),
        interval,
    }
}

fn day1_table(g: &Generators, default: Duration) -> StatusTable {
    let backed_off = BACKED_OFF_NEXT_STEP_INTERVAL;
    let discovery = [&g.inventory, &g.connectivity, &g.free_addresses, &g.dhcp, &g.ntp];
    BTreeMap::from([
        (
            HostStatus::Known,
            plan(&[&g.connectivity, &g.free_addresses, &g.dhcp, &g.inventory, &g.ntp], default),
        ),
        (HostStatus::Insufficient, plan(&discovery, default)),
        (HostStatus::PendingForInput, plan(&discovery, default)),
        (HostStatus::Disconnected, plan(&[&g.inventory], backed_off)),
        (HostStatus::Discovering, plan(&[&g.inventory], default)),
        (HostStatus::Installing, plan(&[&g.install, &g.dhcp], backed_off)),
        (HostStatus::InstallingInProgress, plan(&[&g.inventory, &g.dhcp], default)),
        (
            HostStatus::PreparingForInstallation,
            plan(&[&g.dhcp, &g.disk_speed, &g.images], default),
        ),
        (HostStatus::PreparingSuccessful, plan(&[&g.dhcp], default)),
        (HostStatus::Disabled, plan(&[], backed_off)),
        (HostStatus::Resetting, plan(&[&g.reset], backed_off)),
        (HostStatus::Error, plan(&[&g.logs, &g.stop], backed_off)),
        (HostStatus::Cancelled, plan(&[&g.logs, &g.stop], backed_off)),
    ])
}

fn day2_table(g: &Generators, default: Duration) -> StatusTable {
    let backed_off = BACKED_OFF_NEXT_STEP_INTERVAL;
    BTreeMap::from([
        (
            HostStatus::Known,
            plan(&[&g.connectivity, &g.api_vip, &g.inventory, &g.ntp], default),
        ),
        (
            HostStatus::Insufficient,
            plan(&[&g.inventory, &g.connectivity, &g.api_vip, &g.ntp], default),
        ),
        (HostStatus::Discovering, plan(&[&g.inventory, &g.ntp], default)),
        (
            HostStatus::PendingForInput,
            plan(&[&g.inventory, &g.connectivity, &g.api_vip], default),
        ),
        (HostStatus::Disconnected, plan(&[&g.inventory], backed_off)),
        (HostStatus::Installing, plan(&[&g.install], backed_off)),
        (HostStatus::InstallingInProgress, plan(&[&g.inventory], default)),
        (HostStatus::Disabled, plan(&[], backed_off)),
        (HostStatus::Resetting, plan(&[&g.reset], backed_off)),
        (HostStatus::Error, plan(&[&g.stop], backed_off)),
        (HostStatus::Cancelled, plan(&[&g.stop], backed_off)),
    ])
}

/// Step types named in `configured`; unknown names are logged and ignored
fn disabled_steps(configured: &[String]) -> BTreeSet<StepType> {
    configured
        .iter()
        .filter_map(|name| match name.parse::<StepType>() {
            Ok(step_type) => Some(step_type),
            Err(_) => {
                warn!("Ignoring unknown step type '{name}' in DISABLED_STEPS");
                None
            }
        })
        .collect()
}

impl InstructionManager {
    /// Creates the manager and its status tables
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        hardware: Arc<dyn HardwareValidator>,
        connectivity: Arc<dyn ConnectivityValidator>,
    ) -> Self {
        let generators = Generators {
            connectivity: Arc::new(ConnectivityCheckCmd::new(connectivity)),
            api_vip: Arc::new(ApiVipConnectivityCheckCmd),
            free_addresses: Arc::new(FreeAddressesCmd),
            dhcp: Arc::new(DhcpAllocateCmd),
            inventory: Arc::new(InventoryCmd),
            ntp: Arc::new(NtpSyncCmd),
            install: Arc::new(InstallCmd::new(Arc::clone(&hardware))),
            disk_speed: Arc::new(DiskSpeedCheckCmd::new(hardware)),
            images: Arc::new(ImageAvailabilityCmd),
            reset: Arc::new(BareCmd(StepType::ResetInstallation)),
            stop: Arc::new(BareCmd(StepType::StopInstallation)),
            logs: Arc::new(LogsGatherCmd),
        };
        let interval = config.next_step_interval;
        Self {
            day1: day1_table(&generators, interval),
            day2: day2_table(&generators, interval),
            unbound: plan(&[&generators.inventory], interval),
            disabled: disabled_steps(&config.disabled_steps),
            config,
            store,
        }
    }

    fn status_steps(&self, host: &Host) -> Option<&StatusSteps> {
        if host.status.is_unbound() {
            return Some(&self.unbound);
        }
        let table = if host.is_day2() { &self.day2 } else { &self.day1 };
        table.get(&host.status)
    }

    /// Steps for the host `host_id` and when it should poll again.
    ///
    /// The host is read from the store on every poll so the status table
    /// follows the latest transition. Statuses without a table entry get no
    /// steps and the default interval. A generator that fails is logged and
    /// skipped.
    pub async fn next_steps(&self, host_id: Uuid) -> Result<Steps> {
        let host = self.store.get_host(host_id).await?;
        self.steps_for(&host).await
    }

    async fn steps_for(&self, host: &Host) -> Result<Steps> {
        let mut steps = Steps {
            instructions: Vec::new(),
            next_instruction_seconds: self.config.next_step_interval.as_secs(),
            post_step_action: PostStepAction::Continue,
        };
        let Some(status_steps) = self.status_steps(host) else {
            info!("Host {}: no steps for status {}", host.id, host.status);
            return Ok(steps);
        };
        steps.next_instruction_seconds = status_steps.interval.as_secs();

        let (cluster, siblings) = self.load_cluster(host).await?;
        let inventory = match host.parsed_inventory() {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!("Host {}: {e}", host.id);
                None
            }
        };
        let ctx = StepContext {
            host,
            inventory: inventory.as_ref(),
            cluster: cluster.as_ref(),
            siblings: &siblings,
            config: &self.config,
        };

        for command in &status_steps.commands {
            let step_type = command.step_type();
            if self.disabled.contains(&step_type) {
                info!("Host {}: step {step_type} is disabled", host.id);
                continue;
            }
            match command.steps(&ctx) {
                Ok(generated) => steps.instructions.extend(generated.into_iter().map(|mut step| {
                    if step.step_id.is_empty() {
                        step.step_id = new_step_id(step.step_type);
                    }
                    step
                })),
                Err(e) => warn!("Host {}: failed to generate {step_type} step: {e}", host.id),
            }
        }

        if steps.instructions.is_empty() {
            info!("Host {}: no steps required in status {}", host.id, host.status);
        }
        for step in &steps.instructions {
            info!(
                "Host {}: submitting step {} ({}) args {:?}",
                host.id, step.step_type, step.step_id, step.args
            );
        }
        Ok(steps)
    }

    async fn load_cluster(&self, host: &Host) -> Result<(Option<Cluster>, Vec<Host>)> {
        let Some(cluster_id) = host.cluster_id else {
            return Ok((None, Vec::new()));
        };
        let cluster = self.store.get_cluster(cluster_id).await?;
        let siblings = self.store.list_cluster_hosts(cluster_id).await?;
        Ok((Some(cluster), siblings))
    }
}
