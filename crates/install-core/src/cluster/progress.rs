//! Weighted installation progress.
//!
//! The total is 10 % preparing, 70 % installing and 20 % finalizing. The
//! installing share follows the average host progress, the finalizing share
//! the fraction of monitored operators that settled.

use crate::models::{Cluster, ClusterProgress, ClusterStatus, Host, HostStatus, OperatorStatus};

const PREPARING_WEIGHT: i64 = 10;
const INSTALLING_WEIGHT: i64 = 70;
const FINALIZING_WEIGHT: i64 = 20;

/// Average installation percentage of the hosts taking part in the
/// installation
#[must_use]
pub fn installing_percentage(hosts: &[Host]) -> i64 {
    let percentages: Vec<i64> = hosts
        .iter()
        .filter(|h| h.status != HostStatus::Disabled)
        .map(|h| h.progress.installation_percentage.clamp(0, 100))
        .collect();
    if percentages.is_empty() {
        return 0;
    }
    percentages.iter().sum::<i64>() / i64::try_from(percentages.len()).unwrap_or(1)
}

/// Share of monitored operators that are available or failed
#[must_use]
pub fn finalizing_percentage(cluster: &Cluster) -> i64 {
    let total = cluster.monitored_operators.len();
    if total == 0 {
        return 0;
    }
    let settled = cluster
        .monitored_operators
        .iter()
        .filter(|o| matches!(o.status, Some(OperatorStatus::Available | OperatorStatus::Failed)))
        .count();
    i64::try_from(settled * 100 / total).unwrap_or(100)
}

fn total(progress: &ClusterProgress) -> i64 {
    (progress.preparing_for_installation_stage_percentage * PREPARING_WEIGHT
        + progress.installing_stage_percentage * INSTALLING_WEIGHT
        + progress.finalizing_stage_percentage * FINALIZING_WEIGHT)
        / 100
}

/// Progress of `cluster` given its hosts.
///
/// Outside of an installation the stored progress is returned unchanged.
/// While finalizing the total never goes down.
#[must_use]
pub fn compute_progress(cluster: &Cluster, hosts: &[Host]) -> ClusterProgress {
    let mut progress = cluster.progress.clone();
    match cluster.status {
        ClusterStatus::PreparingForInstallation => {
            progress.installing_stage_percentage = 0;
            progress.finalizing_stage_percentage = 0;
        }
        ClusterStatus::Installing | ClusterStatus::InstallingPendingUserAction => {
            progress.preparing_for_installation_stage_percentage = 100;
            progress.installing_stage_percentage = installing_percentage(hosts);
            progress.finalizing_stage_percentage = 0;
        }
        ClusterStatus::Finalizing => {
            progress.preparing_for_installation_stage_percentage = 100;
            progress.installing_stage_percentage = 100;
            progress.finalizing_stage_percentage = finalizing_percentage(cluster);
            progress.total_percentage = total(&progress).max(cluster.progress.total_percentage);
            return progress;
        }
        ClusterStatus::Installed => return completed(&progress),
        _ => return progress,
    }
    progress.total_percentage = total(&progress);
    progress
}

/// Every stage at 100 %
#[must_use]
pub fn completed(progress: &ClusterProgress) -> ClusterProgress {
    ClusterProgress {
        preparing_for_installation_stage_percentage: 100,
        installing_stage_percentage: 100,
        finalizing_stage_percentage: 100,
        total_percentage: 100,
        ..progress.clone()
    }
}
