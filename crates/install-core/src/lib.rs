//! Installation Orchestration Core
//!
//! Drives hosts and clusters through a bare-metal cluster installation.
//! Agents running on discovered hosts report inventory and step results;
//! this crate turns those facts into validations, status transitions and
//! the next instructions each agent should run.
//!
//! # Example
//!
//! ```no_run
//! use install_core::{
//!     AlwaysLeader, ClusterManager, ClusterValidator, Config, DefaultConnectivityValidator,
//!     DefaultHardwareValidator, HardwareValidator, HostManager, HostValidator, MemoryStore,
//!     Monitor, NoopMetrics, TracingEventSink, BuiltinOperatorsValidator,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::from_env()?);
//! let store = Arc::new(MemoryStore::new());
//! let hardware: Arc<dyn HardwareValidator> = Arc::new(DefaultHardwareValidator::new(config.hardware));
//! let operators = Arc::new(BuiltinOperatorsValidator::new(Arc::clone(&hardware)));
//!
//! let hosts = Arc::new(HostManager::new(
//!     Arc::clone(&config),
//!     store.clone(),
//!     HostValidator::new(Arc::clone(&config), hardware, Arc::new(DefaultConnectivityValidator), operators.clone()),
//!     Arc::new(TracingEventSink),
//!     Arc::new(NoopMetrics),
//! ));
//! let clusters = Arc::new(ClusterManager::new(
//!     Arc::clone(&config),
//!     store.clone(),
//!     ClusterValidator::new(operators),
//!     Arc::new(TracingEventSink),
//!     Arc::new(NoopMetrics),
//! ));
//!
//! let monitor = Monitor::new(store, hosts, clusters, Arc::new(AlwaysLeader), Arc::new(NoopMetrics));
//! let report = monitor.host_monitoring(chrono::Utc::now()).await?;
//! println!("refreshed {} hosts", report.monitored);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - **validation**: host and cluster checks producing `ValidationsInfo`
//! - **conditions**: validation results as named guard conditions
//! - **state_machine**: generic rule table with guarded transitions
//! - **host** / **cluster**: the lifecycle managers and their rule tables
//! - **monitor**: periodic batched refresh of every live entity
//! - **instructions**: steps handed to polling agents
//! - **store**: persistence seam with guarded status writes

#[macro_use]
mod macros;

pub mod cluster;
pub mod conditions;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod instructions;
pub mod leader;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod state_machine;
pub mod store;
pub mod time;
pub mod validation;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
#[cfg(test)]
mod test_utils;

pub use cluster::ClusterManager;
pub use config::Config;
pub use error::{CoreError, Result};
pub use events::{Event, EventSink, Severity, TracingEventSink};
pub use host::HostManager;
pub use instructions::{InstructionManager, Step, StepType, Steps};
pub use leader::{AlwaysLeader, LeaderElector};
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use monitor::{Monitor, MonitorReport};
pub use state_machine::{StateMachine, Transition};
pub use store::{MemoryStore, Store};
pub use validation::{
    BuiltinOperatorsValidator, ClusterValidator, DefaultConnectivityValidator, DefaultHardwareValidator,
    HardwareValidator, HostValidator,
};
