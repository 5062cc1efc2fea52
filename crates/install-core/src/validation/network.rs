//! CIDR and address helpers.

use crate::models::Inventory;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Parses a CIDR such as `10.0.0.0/16`
pub fn parse_cidr(raw: &str) -> Result<IpNetwork, String> {
    raw.trim()
        .parse::<IpNetwork>()
        .map_err(|e| format!("'{raw}' is not a valid CIDR: {e}"))
}

/// Parses a bare IP address
pub fn parse_ip(raw: &str) -> Result<IpAddr, String> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|e| format!("'{raw}' is not a valid IP address: {e}"))
}

/// Whether two networks share at least one address
#[must_use]
pub fn networks_overlap(a: &IpNetwork, b: &IpNetwork) -> bool {
    a.contains(b.network()) || b.contains(a.network())
}

/// Network address and prefix, host bits cleared
#[must_use]
pub fn canonical(net: &IpNetwork) -> String {
    format!("{}/{}", net.network(), net.prefix())
}

/// Whether the address is the network or the broadcast address of `net`
#[must_use]
pub fn is_reserved_address(net: &IpNetwork, ip: IpAddr) -> bool {
    match net {
        IpNetwork::V4(v4) => {
            v4.prefix() < 31 && (IpAddr::V4(v4.network()) == ip || IpAddr::V4(v4.broadcast()) == ip)
        }
        IpNetwork::V6(v6) => IpAddr::V6(v6.network()) == ip,
    }
}

/// Every interface address of the host, in CIDR form
pub fn interface_networks(inventory: &Inventory) -> impl Iterator<Item = IpNetwork> + '_ {
    inventory
        .interfaces
        .iter()
        .flat_map(|iface| iface.ipv4_addresses.iter().chain(iface.ipv6_addresses.iter()))
        .filter_map(|raw| raw.parse::<IpNetwork>().ok())
}

/// Whether any interface address of the host lies in `net`
#[must_use]
pub fn belongs_to_network(inventory: &Inventory, net: &IpNetwork) -> bool {
    interface_networks(inventory).any(|addr| net.contains(addr.ip()))
}

/// Canonical network of the host interface that contains `ip`
#[must_use]
pub fn network_containing(inventory: &Inventory, ip: IpAddr) -> Option<String> {
    interface_networks(inventory)
        .find(|addr| addr.contains(ip))
        .map(|addr| canonical(&addr))
}

/// Address families present in a list of CIDRs: (has IPv4, has IPv6)
#[must_use]
pub fn address_families(cidrs: &[IpNetwork]) -> (bool, bool) {
    (
        cidrs.iter().any(IpNetwork::is_ipv4),
        cidrs.iter().any(IpNetwork::is_ipv6),
    )
}
