//! Cluster validations.

use crate::models::{Cluster, ClusterKind, Host, HostRole, HostStatus, NetworkType};
use crate::validation::host::MAX_CLOCK_SKEW;
use crate::validation::network::{
    address_families, canonical, is_reserved_address, network_containing, networks_overlap, parse_cidr, parse_ip,
};
use crate::validation::operators::{OperatorsValidator, CNV, LSO, ODF};
use crate::validation::{ValidationCategory, ValidationId, ValidationStatus};
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;

string_enum! {
    /// Cluster validation IDs, in evaluation order
    pub enum ClusterValidationId {
        MachineCidrDefined => "machine-cidr-defined",
        ClusterCidrDefined => "cluster-cidr-defined",
        ServiceCidrDefined => "service-cidr-defined",
        DnsDomainDefined => "dns-domain-defined",
        PullSecretSet => "pull-secret-set",
        ApiVipsDefined => "api-vips-defined",
        IngressVipsDefined => "ingress-vips-defined",
        ApiVipsValid => "api-vips-valid",
        IngressVipsValid => "ingress-vips-valid",
        MachineCidrEqualsToCalculatedCidr => "machine-cidr-equals-to-calculated-cidr",
        NoCidrsOverlapping => "no-cidrs-overlapping",
        NetworkPrefixValid => "network-prefix-valid",
        NetworkTypeValid => "network-type-valid",
        NetworksSameAddressFamilies => "networks-same-address-families",
        NtpServerConfigured => "ntp-server-configured",
        AllHostsAreReadyToInstall => "all-hosts-are-ready-to-install",
        SufficientMastersCount => "sufficient-masters-count",
        LsoRequirementsSatisfied => "lso-requirements-satisfied",
        OdfRequirementsSatisfied => "odf-requirements-satisfied",
        CnvRequirementsSatisfied => "cnv-requirements-satisfied",
    }
}

impl ValidationId for ClusterValidationId {
    fn all() -> &'static [Self] {
        Self::ALL
    }

    fn category(self) -> ValidationCategory {
        match self {
            Self::MachineCidrDefined
            | Self::ClusterCidrDefined
            | Self::ServiceCidrDefined
            | Self::DnsDomainDefined
            | Self::ApiVipsDefined
            | Self::IngressVipsDefined
            | Self::ApiVipsValid
            | Self::IngressVipsValid
            | Self::MachineCidrEqualsToCalculatedCidr
            | Self::NoCidrsOverlapping
            | Self::NetworkPrefixValid
            | Self::NetworkTypeValid
            | Self::NetworksSameAddressFamilies
            | Self::NtpServerConfigured => ValidationCategory::Network,
            Self::PullSecretSet | Self::AllHostsAreReadyToInstall | Self::SufficientMastersCount => {
                ValidationCategory::Configuration
            }
            Self::LsoRequirementsSatisfied | Self::OdfRequirementsSatisfied | Self::CnvRequirementsSatisfied => {
                ValidationCategory::Operators
            }
        }
    }

    fn as_str(self) -> &'static str {
        ClusterValidationId::as_str(self)
    }
}

/// Read-only snapshot a cluster validation pass works on
#[derive(Debug, Clone, Copy)]
pub struct ClusterValidationContext<'a> {
    /// Cluster under validation
    pub cluster: &'a Cluster,
    /// Every host of the cluster, disabled ones included
    pub hosts: &'a [Host],
    /// Evaluation time
    pub now: DateTime<Utc>,
}

impl<'a> ClusterValidationContext<'a> {
    #[must_use]
    pub fn new(cluster: &'a Cluster, hosts: &'a [Host], now: DateTime<Utc>) -> Self {
        Self { cluster, hosts, now }
    }

    /// Hosts taking part in the installation
    pub fn active_hosts(&self) -> impl Iterator<Item = &'a Host> + 'a {
        self.hosts.iter().filter(|h| h.status != HostStatus::Disabled)
    }

    fn count_role(&self, role: HostRole) -> usize {
        self.active_hosts().filter(|h| h.effective_role() == role).count()
    }

    fn is_day2(&self) -> bool {
        self.cluster.kind == ClusterKind::AddHostsCluster
    }
}

/// Computes cluster validations
#[derive(Clone)]
pub struct ClusterValidator {
    operators: Arc<dyn OperatorsValidator>,
}

impl std::fmt::Debug for ClusterValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterValidator").finish_non_exhaustive()
    }
}

type Outcome = (ValidationStatus, String);

fn ok(message: impl Into<String>) -> Outcome {
    (ValidationStatus::Success, message.into())
}

fn failed(message: impl Into<String>) -> Outcome {
    (ValidationStatus::Failure, message.into())
}

fn pending(message: impl Into<String>) -> Outcome {
    (ValidationStatus::Pending, message.into())
}

impl ClusterValidator {
    #[must_use]
    pub fn new(operators: Arc<dyn OperatorsValidator>) -> Self {
        Self { operators }
    }

    /// Evaluates one validation, returning its status and message
    #[must_use]
    pub fn validate(&self, id: ClusterValidationId, ctx: &ClusterValidationContext<'_>) -> Outcome {
        let cluster = ctx.cluster;
        match id {
            ClusterValidationId::MachineCidrDefined => {
                if cluster.user_managed_networking {
                    ok("Machine Network CIDR is not required: User Managed Networking")
                } else if ctx.is_day2() {
                    ok("Machine Network CIDR is not required: Day2 cluster")
                } else if cluster.machine_networks.is_empty() {
                    if cluster.vip_dhcp_allocation {
                        failed("The Machine Network CIDR is undefined")
                    } else {
                        failed("The Machine Network CIDR is undefined; setting the API or Ingress virtual IPs will define it")
                    }
                } else {
                    ok("The Machine Network CIDR is defined")
                }
            }
            ClusterValidationId::ClusterCidrDefined => defined(!cluster.cluster_networks.is_empty(), "Cluster Network CIDR"),
            ClusterValidationId::ServiceCidrDefined => defined(!cluster.service_networks.is_empty(), "Service Network CIDR"),
            ClusterValidationId::DnsDomainDefined => defined(
                cluster.base_dns_domain.as_deref().is_some_and(|d| !d.is_empty()),
                "base domain",
            ),
            ClusterValidationId::PullSecretSet => {
                if cluster.pull_secret_set {
                    ok("The pull secret is set.")
                } else {
                    failed("The pull secret is not set.")
                }
            }
            ClusterValidationId::ApiVipsDefined => vips_defined(cluster, &cluster.api_vips, "API"),
            ClusterValidationId::IngressVipsDefined => vips_defined(cluster, &cluster.ingress_vips, "Ingress"),
            ClusterValidationId::ApiVipsValid => vips_valid(ctx, &cluster.api_vips, &[], "API"),
            ClusterValidationId::IngressVipsValid => vips_valid(ctx, &cluster.ingress_vips, &cluster.api_vips, "Ingress"),
            ClusterValidationId::MachineCidrEqualsToCalculatedCidr => machine_cidr_matches(ctx),
            ClusterValidationId::NoCidrsOverlapping => no_cidrs_overlapping(cluster),
            ClusterValidationId::NetworkPrefixValid => network_prefix_valid(ctx),
            ClusterValidationId::NetworkTypeValid => network_type_valid(cluster),
            ClusterValidationId::NetworksSameAddressFamilies => same_address_families(cluster),
            ClusterValidationId::NtpServerConfigured => ntp_configured(ctx),
            ClusterValidationId::AllHostsAreReadyToInstall => {
                if ctx.is_day2() || ctx.active_hosts().all(|h| h.status == HostStatus::Known) {
                    ok("All hosts in the cluster are ready to install.")
                } else {
                    failed("The cluster has hosts that are not ready to install.")
                }
            }
            ClusterValidationId::SufficientMastersCount => sufficient_masters(ctx),
            ClusterValidationId::LsoRequirementsSatisfied => self.operators.validate_cluster(LSO, ctx),
            ClusterValidationId::OdfRequirementsSatisfied => self.operators.validate_cluster(ODF, ctx),
            ClusterValidationId::CnvRequirementsSatisfied => self.operators.validate_cluster(CNV, ctx),
        }
    }
}

fn defined(present: bool, what: &str) -> Outcome {
    if present {
        ok(format!("The {what} is defined."))
    } else {
        failed(format!("The {what} is undefined."))
    }
}

fn vips_defined(cluster: &Cluster, vips: &[String], kind: &str) -> Outcome {
    if cluster.user_managed_networking {
        return ok(format!("{kind} virtual IPs are not required: User Managed Networking"));
    }
    match (vips.is_empty(), cluster.vip_dhcp_allocation) {
        (false, _) => ok(format!("{kind} virtual IPs are defined.")),
        (true, true) => pending(format!("{kind} virtual IPs are not allocated yet by DHCP.")),
        (true, false) => failed(format!("{kind} virtual IPs are undefined and must be provided.")),
    }
}

fn parse_machine_networks(cluster: &Cluster) -> Result<Vec<IpNetwork>, String> {
    cluster.machine_networks.iter().map(|raw| parse_cidr(raw)).collect()
}

fn vips_valid(ctx: &ClusterValidationContext<'_>, vips: &[String], other: &[String], kind: &str) -> Outcome {
    let cluster = ctx.cluster;
    if cluster.user_managed_networking {
        return ok(format!("{kind} virtual IPs are not required: User Managed Networking"));
    }
    if vips.is_empty() {
        return pending(format!("{kind} virtual IPs are undefined."));
    }
    if cluster.machine_networks.is_empty() {
        return pending(format!("Machine Network CIDR is undefined, cannot validate {kind} virtual IPs."));
    }
    let networks = match parse_machine_networks(cluster) {
        Ok(networks) => networks,
        Err(e) => return failed(e),
    };

    let host_addresses: Vec<IpAddr> = ctx
        .active_hosts()
        .filter_map(|h| h.parsed_inventory().ok().flatten())
        .flat_map(|inv| crate::validation::network::interface_networks(&inv).map(|n| n.ip()).collect::<Vec<_>>())
        .collect();

    let mut problems = Vec::new();
    for raw in vips {
        let ip = match parse_ip(raw) {
            Ok(ip) => ip,
            Err(e) => {
                problems.push(e);
                continue;
            }
        };
        match networks.iter().find(|net| net.contains(ip)) {
            None => problems.push(format!(
                "{kind} virtual IP {raw} does not belong to machine network CIDRs {}",
                cluster.machine_networks.join(",")
            )),
            Some(net) if is_reserved_address(net, ip) => {
                problems.push(format!("{kind} virtual IP {raw} is the network or broadcast address of {}", canonical(net)));
            }
            Some(_) => {}
        }
        if other.iter().any(|o| o == raw) {
            problems.push(format!("{kind} virtual IP {raw} is already used as an API virtual IP"));
        }
        if host_addresses.contains(&ip) {
            problems.push(format!("{kind} virtual IP {raw} is already in use by a host"));
        }
    }

    if problems.is_empty() {
        ok(format!("{kind} virtual IPs {} belong to the Machine Network and are not in use.", vips.join(",")))
    } else {
        failed(problems.join("; "))
    }
}

fn machine_cidr_matches(ctx: &ClusterValidationContext<'_>) -> Outcome {
    let cluster = ctx.cluster;
    if cluster.user_managed_networking {
        return ok("The Cluster Machine CIDR is not required: User Managed Networking");
    }
    if cluster.vip_dhcp_allocation {
        return ok("The Cluster Machine CIDR is not required: Machine Network CIDR is allocated by DHCP");
    }
    let (Some(machine), Some(vip)) = (cluster.machine_networks.first(), cluster.api_vips.first()) else {
        return pending("The Machine Network CIDR or API virtual IP is undefined.");
    };
    let inventories: Vec<_> = ctx
        .active_hosts()
        .filter_map(|h| h.parsed_inventory().ok().flatten())
        .collect();
    if inventories.is_empty() {
        return pending("Hosts have not reported their inventory yet.");
    }
    let (machine, vip) = match (parse_cidr(machine), parse_ip(vip)) {
        (Ok(machine), Ok(vip)) => (machine, vip),
        (Err(e), _) | (_, Err(e)) => return failed(e),
    };
    let calculated = inventories.iter().find_map(|inv| network_containing(inv, vip));
    match calculated {
        Some(calculated) if calculated == canonical(&machine) => {
            ok("The Cluster Machine CIDR is equivalent to the calculated CIDR.")
        }
        Some(calculated) => failed(format!(
            "The Cluster Machine CIDR {} is different than the calculated CIDR {calculated}.",
            canonical(&machine)
        )),
        None => failed(format!("No host has an interface in the network of the API virtual IP {vip}.")),
    }
}

fn no_cidrs_overlapping(cluster: &Cluster) -> Outcome {
    if cluster.cluster_networks.is_empty() || cluster.service_networks.is_empty() {
        return pending("At least one of the CIDRs (Cluster Network, Service Network) is undefined.");
    }
    let groups = match cidr_groups(cluster) {
        Ok(groups) => groups,
        Err(e) => return failed(e),
    };

    let mut overlaps = Vec::new();
    for (i, (kind_a, nets_a)) in groups.iter().enumerate() {
        for (kind_b, nets_b) in &groups[i + 1..] {
            for a in nets_a {
                for b in nets_b {
                    if networks_overlap(a, b) {
                        overlaps.push(format!("{kind_a} CIDR {} overlaps with {kind_b} CIDR {}", canonical(a), canonical(b)));
                    }
                }
            }
        }
    }
    if overlaps.is_empty() {
        ok("No CIDRS are overlapping.")
    } else {
        failed(overlaps.join("; "))
    }
}

fn cidr_groups(cluster: &Cluster) -> Result<Vec<(&'static str, Vec<IpNetwork>)>, String> {
    let cluster_networks = cluster
        .cluster_networks
        .iter()
        .map(|n| parse_cidr(&n.cidr))
        .collect::<Result<Vec<_>, _>>()?;
    let service_networks = cluster
        .service_networks
        .iter()
        .map(|raw| parse_cidr(raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(vec![
        ("machine", parse_machine_networks(cluster)?),
        ("cluster", cluster_networks),
        ("service", service_networks),
    ])
}

fn network_prefix_valid(ctx: &ClusterValidationContext<'_>) -> Outcome {
    let cluster = ctx.cluster;
    if cluster.cluster_networks.is_empty() {
        return pending("The Cluster Network CIDR is undefined.");
    }
    let hosts = ctx.active_hosts().count().max(1);
    for network in &cluster.cluster_networks {
        let cidr = match parse_cidr(&network.cidr) {
            Ok(cidr) => cidr,
            Err(e) => return failed(e),
        };
        let max_prefix = if cidr.is_ipv4() { 30 } else { 128 };
        if network.host_prefix <= cidr.prefix() || network.host_prefix > max_prefix {
            return failed(format!(
                "Host prefix {} is invalid for cluster network {}, it must be larger than {} and at most {max_prefix}.",
                network.host_prefix,
                network.cidr,
                cidr.prefix()
            ));
        }
        let subnet_bits = u32::from(network.host_prefix - cidr.prefix());
        let subnets = 1u128.checked_shl(subnet_bits).unwrap_or(u128::MAX);
        if subnets < hosts as u128 {
            return failed(format!(
                "Cluster network CIDR prefix {} does not contain enough addresses for {hosts} hosts each one with {} prefix",
                cidr.prefix(),
                network.host_prefix
            ));
        }
    }
    ok("The Cluster Network prefix is valid.")
}

fn network_type_valid(cluster: &Cluster) -> Outcome {
    let Some(network_type) = cluster.network_type else {
        return ok("The network type will be chosen during installation.");
    };
    if network_type == NetworkType::OvnKubernetes {
        return ok("The network type is valid.");
    }
    let ipv6 = cluster
        .cluster_networks
        .iter()
        .map(|n| n.cidr.as_str())
        .chain(cluster.service_networks.iter().map(String::as_str))
        .chain(cluster.machine_networks.iter().map(String::as_str))
        .any(|raw| parse_cidr(raw).is_ok_and(|n| n.is_ipv6()));
    if ipv6 {
        failed("The network type OpenShiftSDN does not support IPv6, use OVNKubernetes.")
    } else if cluster.is_single_node() {
        failed("The network type OpenShiftSDN is not supported on single-node clusters, use OVNKubernetes.")
    } else {
        ok("The network type is valid.")
    }
}

fn same_address_families(cluster: &Cluster) -> Outcome {
    if cluster.cluster_networks.is_empty() || cluster.service_networks.is_empty() {
        return pending("At least one of the CIDRs (Cluster Network, Service Network) is undefined.");
    }
    let families = |raw: Vec<&str>| -> Result<Option<(bool, bool)>, String> {
        if raw.is_empty() {
            return Ok(None);
        }
        let nets = raw.into_iter().map(parse_cidr).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(address_families(&nets)))
    };
    let groups = [
        families(cluster.machine_networks.iter().map(String::as_str).collect()),
        families(cluster.cluster_networks.iter().map(|n| n.cidr.as_str()).collect()),
        families(cluster.service_networks.iter().map(String::as_str).collect()),
    ];
    let mut seen = Vec::new();
    for group in groups {
        match group {
            Ok(Some(families)) => seen.push(families),
            Ok(None) => {}
            Err(e) => return failed(e),
        }
    }
    if seen.windows(2).all(|w| w[0] == w[1]) {
        ok("Same address families for all networks.")
    } else {
        failed("Address families of the machine, cluster and service networks differ.")
    }
}

fn ntp_configured(ctx: &ClusterValidationContext<'_>) -> Outcome {
    let now = ctx.now.timestamp();
    let mut skewed: Vec<String> = ctx
        .active_hosts()
        .filter_map(|h| {
            let inventory = h.parsed_inventory().ok().flatten()?;
            let skew = (now - inventory.timestamp).unsigned_abs();
            (inventory.timestamp != 0 && skew > MAX_CLOCK_SKEW.as_secs()).then(|| h.display_name())
        })
        .collect();
    if skewed.is_empty() {
        return ok("No ntp problems found");
    }
    skewed.sort();
    failed(format!(
        "Hosts' clocks are not synchronized (there's a difference of more than {} minutes between them), please configure an NTP server via DHCP or set clocks manually. Affected hosts: {}",
        MAX_CLOCK_SKEW.as_secs() / 60,
        skewed.join(", ")
    ))
}

fn sufficient_masters(ctx: &ClusterValidationContext<'_>) -> Outcome {
    if ctx.is_day2() {
        return ok("The cluster has a sufficient number of master candidates.");
    }
    let masters = ctx.count_role(HostRole::Master);
    let workers = ctx.count_role(HostRole::Worker);
    if ctx.cluster.is_single_node() {
        if masters == 1 && workers == 0 {
            ok("The cluster has a sufficient number of master candidates.")
        } else {
            failed("Single-node clusters must have a single control plane node and no workers.")
        }
    } else if masters != ctx.cluster.required_masters() {
        failed(format!(
            "Clusters must have exactly {} dedicated control plane nodes. Add or remove hosts, or change their roles configurations to meet the requirement.",
            ctx.cluster.required_masters()
        ))
    } else if workers == 1 {
        failed("Clusters with workers require at least 2 of them. Add another worker or remove the only one.")
    } else {
        ok("The cluster has a sufficient number of master candidates.")
    }
}
