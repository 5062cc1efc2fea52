//! Leader election seam.
//!
//! Only the leader runs monitor passes. The check is cheap and is repeated
//! between batches so leadership can move mid-pass.

/// Answers whether this replica currently leads
pub trait LeaderElector: Send + Sync {
    /// Whether this replica is the leader right now
    fn is_leader(&self) -> bool;
}

/// Single-replica elector that always leads
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLeader;

impl LeaderElector for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}
