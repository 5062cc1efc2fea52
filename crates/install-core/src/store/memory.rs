//! In-memory store.
//!
//! Rows live in ordered maps behind a lock, so a guarded update checks the
//! status and writes under the same critical section. Used by tests and by
//! single-process deployments.

use super::{check_status_guard, ClusterChanges, HostChanges, Store};
use crate::error::{CoreError, Result};
use crate::models::{Cluster, ClusterStatus, Host, HostStatus};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    hosts: BTreeMap<Uuid, Host>,
    clusters: BTreeMap<Uuid, Cluster>,
}

/// Store keeping every row in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_host(&self, id: Uuid) -> Result<Host> {
        self.read(|t| t.hosts.get(&id).cloned())
            .ok_or_else(|| CoreError::host_not_found(id))
    }

    async fn get_cluster(&self, id: Uuid) -> Result<Cluster> {
        self.read(|t| t.clusters.get(&id).cloned())
            .ok_or_else(|| CoreError::cluster_not_found(id))
    }

    async fn list_cluster_hosts(&self, cluster_id: Uuid) -> Result<Vec<Host>> {
        Ok(self.read(|t| {
            t.hosts
                .values()
                .filter(|h| h.cluster_id == Some(cluster_id))
                .cloned()
                .collect()
        }))
    }

    async fn create_host(&self, host: Host) -> Result<()> {
        self.write(|t| {
            if t.hosts.contains_key(&host.id) {
                return Err(CoreError::InvalidArgument(format!("host {} already exists", host.id)));
            }
            t.hosts.insert(host.id, host);
            Ok(())
        })
    }

    async fn create_cluster(&self, cluster: Cluster) -> Result<()> {
        self.write(|t| {
            if t.clusters.contains_key(&cluster.id) {
                return Err(CoreError::InvalidArgument(format!("cluster {} already exists", cluster.id)));
            }
            t.clusters.insert(cluster.id, cluster);
            Ok(())
        })
    }

    async fn delete_host(&self, id: Uuid) -> Result<()> {
        self.write(|t| t.hosts.remove(&id))
            .map(|_| ())
            .ok_or_else(|| CoreError::host_not_found(id))
    }

    async fn delete_cluster(&self, id: Uuid) -> Result<()> {
        self.write(|t| {
            t.clusters.remove(&id)?;
            t.hosts.retain(|_, h| h.cluster_id != Some(id));
            Some(())
        })
        .ok_or_else(|| CoreError::cluster_not_found(id))
    }

    async fn update_host(&self, id: Uuid, expected_status: Option<HostStatus>, changes: HostChanges) -> Result<u64> {
        check_status_guard(expected_status, changes.status, "host", id)?;
        Ok(self.write(|t| match t.hosts.get_mut(&id) {
            Some(host) if expected_status.is_none_or(|s| s == host.status) => {
                changes.apply(host);
                1
            }
            _ => 0,
        }))
    }

    async fn update_cluster(
        &self,
        id: Uuid,
        expected_status: Option<ClusterStatus>,
        changes: ClusterChanges,
    ) -> Result<u64> {
        check_status_guard(expected_status, changes.status, "cluster", id)?;
        Ok(self.write(|t| match t.clusters.get_mut(&id) {
            Some(cluster) if expected_status.is_none_or(|s| s == cluster.status) => {
                changes.apply(cluster);
                1
            }
            _ => 0,
        }))
    }

    async fn list_hosts_by_status(&self, statuses: &[HostStatus], limit: usize, offset: usize) -> Result<Vec<Host>> {
        Ok(self.read(|t| {
            t.hosts
                .values()
                .filter(|h| statuses.contains(&h.status))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        }))
    }

    async fn list_clusters_by_status(
        &self,
        statuses: &[ClusterStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Cluster>> {
        Ok(self.read(|t| {
            t.clusters
                .values()
                .filter(|c| statuses.contains(&c.status))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::expect_updated;
    use chrono::Utc;

    async fn store_with_host(status: HostStatus) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let mut host = Host::new(Uuid::new_v4(), Uuid::new_v4(), None, Utc::now());
        host.status = status;
        let id = host.id;
        store.create_host(host).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_guarded_update_applies_on_match() {
        let (store, id) = store_with_host(HostStatus::Known).await;
        let rows = store
            .update_host(id, Some(HostStatus::Known), HostChanges::status(HostStatus::Insufficient, "no"))
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let host = store.get_host(id).await.unwrap();
        assert_eq!(host.status, HostStatus::Insufficient);
        assert_eq!(host.status_info, "no");
    }

    #[tokio::test]
    async fn test_stale_expected_status_touches_nothing() {
        let (store, id) = store_with_host(HostStatus::Insufficient).await;
        for _ in 0..2 {
            let rows = store
                .update_host(id, Some(HostStatus::Known), HostChanges::status(HostStatus::Disabled, "x"))
                .await
                .unwrap();
            assert_eq!(rows, 0);
            assert!(matches!(
                expect_updated(rows, "host", id, HostStatus::Known),
                Err(CoreError::GuardedUpdateConflict { .. })
            ));
        }
        assert_eq!(store.get_host(id).await.unwrap().status, HostStatus::Insufficient);
    }

    #[tokio::test]
    async fn test_concurrent_guarded_updates_have_one_winner() {
        let (store, id) = store_with_host(HostStatus::Known).await;
        let mut tasks = Vec::new();
        for target in [HostStatus::Insufficient, HostStatus::Disabled, HostStatus::PendingForInput] {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let rows = store
                    .update_host(id, Some(HostStatus::Known), HostChanges::status(target, "race"))
                    .await
                    .unwrap();
                (target, rows)
            }));
        }
        let mut winners = Vec::new();
        for task in tasks {
            let (target, rows) = task.await.unwrap();
            if rows == 1 {
                winners.push(target);
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(store.get_host(id).await.unwrap().status, winners[0]);
    }

    #[tokio::test]
    async fn test_unguarded_status_change_is_rejected() {
        let (store, id) = store_with_host(HostStatus::Known).await;
        let err = store
            .update_host(id, None, HostChanges::status(HostStatus::Error, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));

        let changes = HostChanges {
            role: Some(crate::models::HostRole::Worker),
            ..HostChanges::default()
        };
        assert_eq!(store.update_host(id, None, changes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_by_status_pages_in_id_order() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            let mut host = Host::new(Uuid::new_v4(), Uuid::new_v4(), None, Utc::now());
            host.status = HostStatus::Known;
            store.create_host(host).await.unwrap();
        }
        let first = store.list_hosts_by_status(&[HostStatus::Known], 3, 0).await.unwrap();
        let second = store.list_hosts_by_status(&[HostStatus::Known], 3, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        let ids: Vec<Uuid> = first.iter().chain(second.iter()).map(|h| h.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(store.list_hosts_by_status(&[HostStatus::Error], 10, 0).await.unwrap().is_empty());
    }
}
