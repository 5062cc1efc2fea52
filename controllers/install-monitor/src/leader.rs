//! Kubernetes `Lease` based leader election.
//!
//! Every replica runs `LeaseElector::run`, which tries to acquire or renew
//! the lease on a fixed interval. The monitor only asks `is_leader`, which
//! reads an atomic flag and never touches the API server.

use crate::error::ControllerError;
use chrono::{DateTime, TimeDelta, Utc};
use install_core::LeaderElector;
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::{Api, Patch, PatchParams, PostParams};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a lease stays valid without renewal
pub const LEASE_DURATION: Duration = Duration::from_secs(15);
/// How often the lease is acquired or renewed
pub const RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Holder fields read from an existing lease
#[derive(Debug, Clone, PartialEq, Eq)]
struct LeaseHolder {
    identity: Option<String>,
    renewed_at: Option<DateTime<Utc>>,
    duration: Duration,
    transitions: i32,
}

impl LeaseHolder {
    fn from_lease(lease: &Lease) -> Self {
        let spec = lease.spec.clone().unwrap_or_default();
        // MicroTime serializes as RFC 3339
        let renewed_at = serde_json::to_value(&spec.renew_time)
            .ok()
            .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
            .map(|t| t.with_timezone(&Utc));
        let seconds = spec
            .lease_duration_seconds
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(LEASE_DURATION.as_secs());
        Self {
            identity: spec.holder_identity,
            renewed_at,
            duration: Duration::from_secs(seconds),
            transitions: spec.lease_transitions.unwrap_or(0),
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        let Some(renewed_at) = self.renewed_at else {
            return true;
        };
        let duration = TimeDelta::from_std(self.duration).unwrap_or(TimeDelta::MAX);
        renewed_at.checked_add_signed(duration).is_none_or(|until| until < now)
    }
}

/// What this replica may do with the lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// We hold it and extend it
    Renew,
    /// Free or expired; we take it
    TakeOver,
    /// Someone else holds a live lease
    Held,
}

fn claim(holder: &LeaseHolder, identity: &str, now: DateTime<Utc>) -> Claim {
    match holder.identity.as_deref() {
        Some(current) if current == identity => Claim::Renew,
        Some(_) if !holder.expired(now) => Claim::Held,
        _ => Claim::TakeOver,
    }
}

fn micro_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Leader elector backed by a `coordination.k8s.io/v1` Lease
pub struct LeaseElector {
    api: Api<Lease>,
    name: String,
    identity: String,
    leader: AtomicBool,
}

impl std::fmt::Debug for LeaseElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseElector")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("leader", &self.leader.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LeaderElector for LeaseElector {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }
}

impl LeaseElector {
    /// Elector for lease `name` in the namespace of `api`, competing as
    /// `identity`
    pub fn new(api: Api<Lease>, name: String, identity: String) -> Self {
        Self {
            api,
            name,
            identity,
            leader: AtomicBool::new(false),
        }
    }

    /// Acquires or renews the lease forever
    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("Leader election on lease {} as {}", self.name, self.identity);
        let mut ticker = tokio::time::interval(RENEW_INTERVAL);
        loop {
            ticker.tick().await;
            let leading = match self.try_acquire_or_renew(Utc::now()).await {
                Ok(leading) => leading,
                Err(e) => {
                    warn!("Lease {}: acquire or renew failed: {}", self.name, e);
                    false
                }
            };
            let was_leading = self.leader.swap(leading, Ordering::AcqRel);
            if was_leading != leading {
                if leading {
                    info!("Acquired lease {}; this replica is the leader", self.name);
                } else {
                    info!("Lost lease {}", self.name);
                }
            }
        }
    }

    async fn try_acquire_or_renew(&self, now: DateTime<Utc>) -> Result<bool, ControllerError> {
        let Some(lease) = self.api.get_opt(&self.name).await? else {
            return self.create(now).await;
        };
        let holder = LeaseHolder::from_lease(&lease);
        let (acquired_at, transitions) = match claim(&holder, &self.identity, now) {
            Claim::Held => {
                debug!(
                    "Lease {} held by {}",
                    self.name,
                    holder.identity.as_deref().unwrap_or("<none>")
                );
                return Ok(false);
            }
            Claim::Renew => (None, holder.transitions),
            Claim::TakeOver => (Some(micro_time(now)), holder.transitions + 1),
        };

        let mut spec = json!({
            "holderIdentity": self.identity,
            "leaseDurationSeconds": LEASE_DURATION.as_secs(),
            "renewTime": micro_time(now),
            "leaseTransitions": transitions,
        });
        if let Some(acquired_at) = acquired_at {
            spec["acquireTime"] = json!(acquired_at);
        }
        // resourceVersion turns the patch into a compare-and-swap
        let patch = json!({
            "metadata": { "resourceVersion": lease.metadata.resource_version },
            "spec": spec,
        });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(true)
    }

    async fn create(&self, now: DateTime<Utc>) -> Result<bool, ControllerError> {
        let lease: Lease = serde_json::from_value(json!({
            "metadata": { "name": self.name },
            "spec": {
                "holderIdentity": self.identity,
                "leaseDurationSeconds": LEASE_DURATION.as_secs(),
                "acquireTime": micro_time(now),
                "renewTime": micro_time(now),
                "leaseTransitions": 0,
            },
        }))
        .map_err(|e| ControllerError::InvalidConfig(format!("lease {}: {}", self.name, e)))?;
        self.api.create(&PostParams::default(), &lease).await?;
        Ok(true)
    }
}
