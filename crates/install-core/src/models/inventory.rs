//! Hardware and network facts reported by the discovery agent.
//!
//! Only the fields the validations read are modelled; unknown fields in the
//! agent payload are ignored.

use serde::{Deserialize, Serialize};

/// Hardware inventory of a host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Hostname reported by the OS
    #[serde(default)]
    pub hostname: String,
    /// CPU information
    #[serde(default)]
    pub cpu: Cpu,
    /// Memory information
    #[serde(default)]
    pub memory: Memory,
    /// Block devices
    #[serde(default)]
    pub disks: Vec<Disk>,
    /// Network interfaces
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Routing table
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Host clock as a unix timestamp
    #[serde(default)]
    pub timestamp: i64,
    /// Platform vendor details
    #[serde(default)]
    pub system_vendor: SystemVendor,
}

/// CPU information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cpu {
    /// Logical core count
    #[serde(default)]
    pub count: i64,
    /// CPU feature flags
    #[serde(default)]
    pub flags: Vec<String>,
    /// Architecture, e.g. x86_64
    #[serde(default)]
    pub architecture: String,
}

/// Memory information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// Physical memory in bytes
    #[serde(default)]
    pub physical_bytes: i64,
    /// Memory usable by the OS in bytes
    #[serde(default)]
    pub usable_bytes: i64,
}

/// A block device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Kernel name, e.g. `sda`
    pub name: String,
    /// Stable by-id path when available
    #[serde(default)]
    pub by_id: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub size_bytes: i64,
    /// Drive type, e.g. HDD / SSD / ODD
    #[serde(default)]
    pub drive_type: String,
    /// Serial number
    #[serde(default)]
    pub serial: String,
    /// Whether the disk is removable media
    #[serde(default)]
    pub removable: bool,
    /// Whether the disk is marked as the boot device
    #[serde(default)]
    pub bootable: bool,
}

impl Disk {
    /// Device path as used for the installation disk
    #[must_use]
    pub fn device_path(&self) -> String {
        self.by_id.clone().unwrap_or_else(|| format!("/dev/{}", self.name))
    }

    /// Whether `path` designates this disk (by-id or /dev path)
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        self.by_id.as_deref() == Some(path) || format!("/dev/{}", self.name) == path
    }
}

/// A network interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// MAC address
    #[serde(default)]
    pub mac_address: String,
    /// IPv4 addresses in CIDR notation
    #[serde(default)]
    pub ipv4_addresses: Vec<String>,
    /// IPv6 addresses in CIDR notation
    #[serde(default)]
    pub ipv6_addresses: Vec<String>,
    /// Whether link is up
    #[serde(default)]
    pub has_carrier: bool,
}

/// A route entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Outgoing interface
    #[serde(default)]
    pub interface: String,
    /// Destination network, `0.0.0.0` / `::` for the default route
    #[serde(default)]
    pub destination: String,
    /// Gateway address
    #[serde(default)]
    pub gateway: String,
}

impl Route {
    /// Whether this is a default route with a gateway
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self.destination.as_str(), "0.0.0.0" | "::" | "0.0.0.0/0" | "::/0") && !self.gateway.is_empty()
    }
}

/// Platform vendor details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemVendor {
    /// Manufacturer
    #[serde(default)]
    pub manufacturer: String,
    /// Product name
    #[serde(default)]
    pub product_name: String,
    /// Whether the host is a virtual machine
    #[serde(default)]
    pub virtual_machine: bool,
}
