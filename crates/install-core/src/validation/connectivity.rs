//! Connectivity validator seam.

use crate::error::{CoreError, Result};
use crate::models::{Host, Interface};

/// Network interface checks over a host
pub trait ConnectivityValidator: Send + Sync {
    /// Interfaces usable for cluster traffic
    fn valid_interfaces(&self, host: &Host) -> Result<Vec<Interface>>;
}

/// Interfaces with carrier and at least one address
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectivityValidator;

impl ConnectivityValidator for DefaultConnectivityValidator {
    fn valid_interfaces(&self, host: &Host) -> Result<Vec<Interface>> {
        let inventory = host
            .parsed_inventory()?
            .ok_or_else(|| CoreError::ValidationContext(format!("host {} has no inventory", host.id)))?;
        Ok(inventory
            .interfaces
            .into_iter()
            .filter(|iface| iface.has_carrier)
            .filter(|iface| !iface.ipv4_addresses.is_empty() || !iface.ipv6_addresses.is_empty())
            .collect())
    }
}
