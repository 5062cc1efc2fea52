//! Domain models
//!
//! - `host`: machines being provisioned and their install progress
//! - `cluster`: the cluster assembled from hosts, network config and progress
//! - `inventory`: hardware facts reported by the discovery agent

pub mod cluster;
pub mod host;
pub mod inventory;

pub use cluster::*;
pub use host::*;
pub use inventory::*;
