//! Test utilities for unit tests
//!
//! Builders for hosts, clusters and inventories in the shapes the tests need.

use crate::config::Config;
use crate::store::Store;
use crate::models::{
    Cluster, ClusterNetwork, Cpu, Disk, Host, HostKind, HostRole, Interface, Inventory, Memory, NetworkType,
};
use crate::validation::{
    BuiltinOperatorsValidator, ClusterValidator, DefaultConnectivityValidator, DefaultHardwareValidator,
    HardwareValidator, HostValidator,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

const GIB: i64 = 1024 * 1024 * 1024;

/// Machine network used by every fixture
pub const MACHINE_NETWORK: &str = "192.168.127.0/24";
/// API VIP inside `MACHINE_NETWORK`
pub const API_VIP: &str = "192.168.127.100";
/// Ingress VIP inside `MACHINE_NETWORK`
pub const INGRESS_VIP: &str = "192.168.127.101";

/// Inventory that satisfies every role, with one address in `MACHINE_NETWORK`
pub fn sufficient_inventory(hostname: &str, address: &str, now: DateTime<Utc>) -> Inventory {
    Inventory {
        hostname: hostname.to_string(),
        cpu: Cpu {
            count: 8,
            flags: vec!["vmx".to_string()],
            architecture: "x86_64".to_string(),
        },
        memory: Memory {
            physical_bytes: 32 * GIB,
            usable_bytes: 32 * GIB,
        },
        disks: vec![test_disk("sda", 200), test_disk("sdb", 200)],
        interfaces: vec![Interface {
            name: "eth0".to_string(),
            mac_address: "52:54:00:00:00:01".to_string(),
            ipv4_addresses: vec![format!("{address}/24")],
            ipv6_addresses: Vec::new(),
            has_carrier: true,
        }],
        routes: Vec::new(),
        timestamp: now.timestamp(),
        system_vendor: Default::default(),
    }
}

/// SSD of the given size in GB
pub fn test_disk(name: &str, gb: i64) -> Disk {
    Disk {
        name: name.to_string(),
        size_bytes: gb * 1_000_000_000,
        drive_type: "SSD".to_string(),
        ..Disk::default()
    }
}

/// Host that checked in at `now` with the given inventory
pub fn host_with_inventory(cluster_id: Option<Uuid>, inventory: &Inventory, now: DateTime<Utc>) -> Host {
    let mut host = Host::new(Uuid::new_v4(), Uuid::new_v4(), cluster_id, now);
    host.checked_in_at = Some(now);
    host.inventory = Some(serde_json::to_string(inventory).unwrap());
    host
}

/// Host with an assigned role and a sufficient inventory
pub fn host_with_role(cluster_id: Uuid, hostname: &str, address: &str, role: HostRole, now: DateTime<Utc>) -> Host {
    let mut host = host_with_inventory(Some(cluster_id), &sufficient_inventory(hostname, address, now), now);
    host.role = role;
    host
}

/// Day-2 host joining an installed cluster
pub fn day2_host(cluster_id: Uuid, now: DateTime<Utc>) -> Host {
    let mut host = host_with_role(cluster_id, "day2-worker", "192.168.127.50", HostRole::Worker, now);
    host.kind = HostKind::AddToExistingClusterHost;
    host
}

/// Highly available cluster with every setting a ready cluster needs
pub fn configured_cluster(now: DateTime<Utc>) -> Cluster {
    let mut cluster = Cluster::new(Uuid::new_v4(), "test-cluster", now);
    cluster.base_dns_domain = Some("example.com".to_string());
    cluster.pull_secret_set = true;
    cluster.machine_networks = vec![MACHINE_NETWORK.to_string()];
    cluster.cluster_networks = vec![ClusterNetwork {
        cidr: "10.128.0.0/14".to_string(),
        host_prefix: 23,
    }];
    cluster.service_networks = vec!["172.30.0.0/16".to_string()];
    cluster.api_vips = vec![API_VIP.to_string()];
    cluster.ingress_vips = vec![INGRESS_VIP.to_string()];
    cluster.network_type = Some(NetworkType::OvnKubernetes);
    cluster
}

/// Three masters of `cluster`, addresses .10 to .12
pub fn three_masters(cluster: &Cluster, now: DateTime<Utc>) -> Vec<Host> {
    (0..3)
        .map(|i| {
            host_with_role(
                cluster.id,
                &format!("master-{i}"),
                &format!("192.168.127.{}", 10 + i),
                HostRole::Master,
                now,
            )
        })
        .collect()
}

/// Host validator over the default collaborators
pub fn test_host_validator(config: Arc<Config>) -> HostValidator {
    let hardware: Arc<dyn HardwareValidator> = Arc::new(DefaultHardwareValidator::new(config.hardware));
    HostValidator::new(
        config,
        Arc::clone(&hardware),
        Arc::new(DefaultConnectivityValidator),
        Arc::new(BuiltinOperatorsValidator::new(hardware)),
    )
}

/// Cluster validator over the default collaborators
pub fn test_cluster_validator(config: Arc<Config>) -> ClusterValidator {
    let hardware: Arc<dyn HardwareValidator> = Arc::new(DefaultHardwareValidator::new(config.hardware));
    ClusterValidator::new(Arc::new(BuiltinOperatorsValidator::new(hardware)))
}

/// Puts every host in the connectivity majority group of the cluster's
/// primary machine network
pub fn with_majority_group(cluster: &mut Cluster, hosts: &[Host]) {
    cluster
        .connectivity_majority_groups
        .insert(MACHINE_NETWORK.to_string(), hosts.iter().map(|h| h.id).collect());
}

/// Writes a cluster and its hosts into `store`
pub async fn seed(store: &dyn Store, cluster: &Cluster, hosts: &[Host]) {
    store.create_cluster(cluster.clone()).await.unwrap();
    for host in hosts {
        store.create_host(host.clone()).await.unwrap();
    }
}
