//! Unit tests for the host manager and its transition tables

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::host::common::*;
    use crate::host::HostManager;
    use crate::mock::{MetricCall, RecordingEventSink, RecordingMetrics};
    use crate::models::{Cluster, ClusterStatus, Host, HostRole, HostStage, HostStatus, LogsState, MediaStatus};
    use crate::store::{HostChanges, MemoryStore, Store};
    use crate::test_utils::*;
    use crate::validation::{parse_validations_info, ValidationStatus};
    use chrono::{DateTime, TimeDelta, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Env {
        store: Arc<MemoryStore>,
        events: Arc<RecordingEventSink>,
        metrics: Arc<RecordingMetrics>,
        manager: HostManager,
    }

    fn env(config: Config) -> Env {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let manager = HostManager::new(
            Arc::clone(&config),
            store.clone(),
            test_host_validator(config),
            events.clone(),
            metrics.clone(),
        );
        Env {
            store,
            events,
            metrics,
            manager,
        }
    }

    /// Ready cluster with three discovering masters, adjusted by `prepare`
    /// before it is stored
    async fn seeded(
        env: &Env,
        now: DateTime<Utc>,
        prepare: impl FnOnce(&mut Cluster, &mut Vec<Host>),
    ) -> (Cluster, Vec<Host>) {
        let mut cluster = configured_cluster(now);
        let mut masters = three_masters(&cluster, now);
        for host in &mut masters {
            host.status = HostStatus::Discovering;
        }
        with_majority_group(&mut cluster, &masters);
        prepare(&mut cluster, &mut masters);
        seed(env.store.as_ref(), &cluster, &masters).await;
        (cluster, masters)
    }

    async fn stored(env: &Env, id: Uuid) -> Host {
        env.store.get_host(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_new_host() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, now, |_, _| {}).await;

        let host = Host::new(Uuid::new_v4(), Uuid::new_v4(), Some(cluster.id), now);
        let t = env
            .manager
            .register_host(host.clone(), Some("v1.2".to_string()), now)
            .await
            .unwrap();
        assert_eq!(t.source, HostStatus::Unregistered);
        assert_eq!(t.destination, HostStatus::Discovering);

        let host = stored(&env, host.id).await;
        assert_eq!(host.status, HostStatus::Discovering);
        assert_eq!(host.status_info, STATUS_INFO_DISCOVERING);
        assert_eq!(host.discovery_agent_version.as_deref(), Some("v1.2"));
    }

    #[tokio::test]
    async fn test_re_register_resets_inventory() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            hosts[0].status = HostStatus::Known;
            hosts[0].bootstrap = true;
        })
        .await;

        let t = env.manager.register_host(masters[0].clone(), None, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Discovering);
        let host = stored(&env, masters[0].id).await;
        assert!(host.inventory.is_none());
        assert!(!host.bootstrap);
    }

    #[tokio::test]
    async fn test_register_during_reboot_names_the_disk() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, hosts| {
            cluster.status = ClusterStatus::Installing;
            let mut inventory = sufficient_inventory("master-0", "192.168.127.10", now);
            inventory.disks[0].serial = "SER123".to_string();
            let host = &mut hosts[0];
            host.inventory = Some(serde_json::to_string(&inventory).unwrap());
            host.installation_disk_path = Some("/dev/sda".to_string());
            host.status = HostStatus::InstallingInProgress;
            host.progress.current_stage = Some(HostStage::Rebooting);
        })
        .await;
        let id = masters[0].id;

        let t = env.manager.register_host(masters[0].clone(), None, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::InstallingPendingUserAction);
        let host = stored(&env, id).await;
        assert!(host.status_info.starts_with("Expected the host to boot from disk"));
        assert!(host.status_info.ends_with("/dev/sda (SER123)"));

        let err = env.manager.register_host(host, None, now).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(ref m) if m == "Host is required to be booted from disk"));
        assert_eq!(stored(&env, id).await.status, HostStatus::InstallingPendingUserAction);
    }

    #[tokio::test]
    async fn test_register_during_installation_is_an_error() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            hosts[0].status = HostStatus::InstallingInProgress;
            hosts[0].progress.current_stage = Some(HostStage::Installing);
        })
        .await;

        let t = env.manager.register_host(masters[0].clone(), None, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Error);
        assert_eq!(stored(&env, masters[0].id).await.status_info, STATUS_INFO_UNEXPECTED_RESTART);
    }

    #[tokio::test]
    async fn test_refresh_to_known() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, _| {}).await;
        let id = masters[0].id;

        let t = env.manager.refresh_status(id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Known);

        let host = stored(&env, id).await;
        assert_eq!(host.status_info, STATUS_INFO_KNOWN);
        assert_eq!(host.status_updated_at, now);
        let validations = parse_validations_info(host.validations_info.as_deref()).unwrap();
        assert!(validations.values().flatten().all(|r| r.status == ValidationStatus::Success));

        let messages = env.events.messages_for(id);
        assert!(messages
            .iter()
            .any(|m| m == "Host master-0: updated status from \"discovering\" to \"known\" (Host is ready to be installed)"));
    }

    #[tokio::test]
    async fn test_refresh_without_change_keeps_status_timestamp() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, _| {}).await;
        let id = masters[0].id;

        env.manager.refresh_status(id, now).await.unwrap();
        let later = now + TimeDelta::seconds(30);
        env.manager.update_checked_in(id, later).await.unwrap();
        let t = env.manager.refresh_status(id, later).await.unwrap();
        assert!(!t.is_changed());
        assert_eq!(stored(&env, id).await.status_updated_at, now);
    }

    #[tokio::test]
    async fn test_refresh_without_inventory_is_discovering() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            hosts[0].status = HostStatus::Known;
            hosts[0].inventory = None;
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Discovering);
    }

    #[tokio::test]
    async fn test_refresh_disconnected_reports_failed_validation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, _| {}).await;
        let id = masters[0].id;
        env.manager.refresh_status(id, now).await.unwrap();

        let later = now + TimeDelta::minutes(10);
        let t = env.manager.refresh_status(id, later).await.unwrap();
        assert_eq!(t.destination, HostStatus::Disconnected);
        assert_eq!(stored(&env, id).await.status_info, STATUS_INFO_DISCONNECTED);

        assert!(env.metrics.calls().contains(&MetricCall::ValidationFailed {
            entity: "host".to_string(),
            validation: "connected".to_string(),
        }));
        assert!(env
            .events
            .messages_for(id)
            .iter()
            .any(|m| m.contains("validation 'connected' that used to succeed is now failing")));
    }

    #[tokio::test]
    async fn test_refresh_insufficient_hardware() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            let mut inventory = sufficient_inventory("master-0", "192.168.127.10", now);
            inventory.cpu.count = 1;
            hosts[0].inventory = Some(serde_json::to_string(&inventory).unwrap());
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Insufficient);
        assert_eq!(
            stored(&env, masters[0].id).await.status_info,
            STATUS_INFO_INSUFFICIENT_HARDWARE
        );
    }

    #[tokio::test]
    async fn test_refresh_pending_for_input() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, _| cluster.machine_networks.clear()).await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::PendingForInput);
    }

    #[tokio::test]
    async fn test_refresh_not_ready_lists_failing_validations() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, hosts| {
            with_majority_group(cluster, &hosts[1..]);
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Insufficient);
        let info = stored(&env, masters[0].id).await.status_info;
        assert!(info.starts_with("Host cannot be installed due to following failing validation(s): "));
        assert!(!info.contains("$FAILING_VALIDATIONS"));
    }

    #[tokio::test]
    async fn test_disabled_validation_counts_as_passing() {
        let config = Config {
            disabled_host_validations: vec!["belongs-to-majority-group".to_string()],
            ..Config::default()
        };
        let env = env(config);
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, _| cluster.connectivity_majority_groups.clear()).await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Known);
        let host = stored(&env, masters[0].id).await;
        let validations = parse_validations_info(host.validations_info.as_deref()).unwrap();
        let result = validations
            .values()
            .flatten()
            .find(|r| r.id == "belongs-to-majority-group")
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Disabled);
    }

    #[tokio::test]
    async fn test_known_host_follows_cluster_preparation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, masters) = seeded(&env, now, |cluster, hosts| {
            cluster.status = ClusterStatus::PreparingForInstallation;
            hosts[0].status = HostStatus::Known;
        })
        .await;
        let id = masters[0].id;

        let t = env.manager.refresh_status(id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::PreparingForInstallation);

        // disk speed and images not reported yet
        let t = env.manager.refresh_status(id, now).await.unwrap();
        assert!(!t.is_changed());

        env.store
            .update_host(
                id,
                None,
                HostChanges {
                    disk_speed: Some(Some(crate::models::DiskSpeed {
                        tested: true,
                        exit_code: 0,
                        speed_ms: 2,
                    })),
                    ..HostChanges::default()
                },
            )
            .await
            .unwrap();
        let t = env.manager.refresh_status(id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::PreparingSuccessful);

        env.store
            .update_cluster(
                cluster.id,
                Some(ClusterStatus::PreparingForInstallation),
                crate::store::ClusterChanges::status(ClusterStatus::Installing, "installing"),
            )
            .await
            .unwrap();
        let t = env.manager.refresh_status(id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Installing);
    }

    #[tokio::test]
    async fn test_preparing_host_returns_to_known_when_cluster_stops_preparing() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| hosts[0].status = HostStatus::PreparingForInstallation).await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Known);
        assert_eq!(stored(&env, masters[0].id).await.status_info, STATUS_INFO_PREPARING_TIMED_OUT);
    }

    #[tokio::test]
    async fn test_install_requires_a_role() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            hosts[0].status = HostStatus::Known;
            hosts[0].role = HostRole::AutoAssign;
        })
        .await;

        let err = env.manager.install(masters[0].id, now).await.unwrap_err();
        match err {
            CoreError::Conflict(message) => {
                assert!(message.contains("invalid host role: auto-assign"));
                assert!(message.ends_with("should be one of [master worker]"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(stored(&env, masters[0].id).await.status, HostStatus::Known);
    }

    #[tokio::test]
    async fn test_install_progress() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, hosts| {
            cluster.status = ClusterStatus::Installing;
            hosts[0].status = HostStatus::Installing;
        })
        .await;
        let id = masters[0].id;

        env.manager
            .update_install_progress(id, HostStage::StartingInstallation, None, now)
            .await
            .unwrap();
        let host = stored(&env, id).await;
        assert_eq!(host.status, HostStatus::InstallingInProgress);
        assert_eq!(host.progress.current_stage, Some(HostStage::StartingInstallation));
        assert_eq!(host.progress.installation_percentage, 12);
        assert_eq!(host.progress.stage_started_at, Some(now));

        let later = now + TimeDelta::minutes(5);
        env.manager
            .update_install_progress(id, HostStage::Installing, Some("writing".to_string()), later)
            .await
            .unwrap();
        let host = stored(&env, id).await;
        assert_eq!(host.progress.installation_percentage, 25);
        assert_eq!(host.progress.progress_info.as_deref(), Some("writing"));

        let err = env
            .manager
            .update_install_progress(id, HostStage::StartingInstallation, None, later)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(ref m) if m.starts_with("Can't assign lower stage")));

        env.manager
            .update_install_progress(id, HostStage::Done, None, later)
            .await
            .unwrap();
        let host = stored(&env, id).await;
        assert_eq!(host.status, HostStatus::Installed);
        assert_eq!(host.progress.installation_percentage, 100);

        let finished: Vec<MetricCall> = env
            .metrics
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MetricCall::HostStageFinished { .. }))
            .collect();
        assert_eq!(finished.len(), 2);
    }

    #[tokio::test]
    async fn test_install_progress_rejected_outside_installation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| hosts[0].status = HostStatus::Known).await;

        let err = env
            .manager
            .update_install_progress(masters[0].id, HostStage::Installing, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(ref m) if m == "Can't set progress <Installing> to host in status <known>"));
    }

    #[tokio::test]
    async fn test_failed_stage_moves_to_error() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| hosts[0].status = HostStatus::InstallingInProgress).await;

        env.manager
            .update_install_progress(masters[0].id, HostStage::Failed, Some("disk error".to_string()), now)
            .await
            .unwrap();
        let host = stored(&env, masters[0].id).await;
        assert_eq!(host.status, HostStatus::Error);
        assert_eq!(host.status_info, "Failed - disk error");
    }

    #[tokio::test]
    async fn test_day2_host_is_added_when_rebooting() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, now, |_, _| {}).await;
        let mut host = day2_host(cluster.id, now);
        host.status = HostStatus::InstallingInProgress;
        host.progress.current_stage = Some(HostStage::WritingImageToDisk);
        env.store.create_host(host.clone()).await.unwrap();

        env.manager
            .update_install_progress(host.id, HostStage::Rebooting, None, now)
            .await
            .unwrap();
        let host = stored(&env, host.id).await;
        assert_eq!(host.status, HostStatus::AddedToExistingCluster);
        assert_eq!(host.status_info, STATUS_INFO_REBOOTING_DAY2);
        assert_eq!(host.progress.current_stage, Some(HostStage::Done));
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, hosts| {
            cluster.status = ClusterStatus::Installing;
            let host = &mut hosts[0];
            host.status = HostStatus::InstallingInProgress;
            host.progress.current_stage = Some(HostStage::WritingImageToDisk);
            host.progress.stage_updated_at = Some(now - TimeDelta::minutes(31));
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Error);
        assert_eq!(
            stored(&env, masters[0].id).await.status_info,
            "Host failed to install because its installation stage Writing image to disk took longer than expected 30m"
        );
    }

    #[tokio::test]
    async fn test_wrong_boot_order_keeps_stage_fresh() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, hosts| {
            cluster.status = ClusterStatus::InstallingPendingUserAction;
            let host = &mut hosts[0];
            host.status = HostStatus::InstallingInProgress;
            host.progress.current_stage = Some(HostStage::Rebooting);
            host.progress.stage_updated_at = Some(now - TimeDelta::hours(2));
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.rule, "refresh-wrong-boot-order");
        let host = stored(&env, masters[0].id).await;
        assert_eq!(host.status, HostStatus::InstallingInProgress);
        assert_eq!(host.progress.stage_updated_at, Some(now));
    }

    #[tokio::test]
    async fn test_cluster_error_aborts_installation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |cluster, hosts| {
            cluster.status = ClusterStatus::Error;
            hosts[0].status = HostStatus::Installing;
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Error);
        assert_eq!(
            stored(&env, masters[0].id).await.status_info,
            STATUS_INFO_ABORTING_DUE_CLUSTER_ERRORS
        );
    }

    #[tokio::test]
    async fn test_logs_timeout() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            let host = &mut hosts[0];
            host.status = HostStatus::Error;
            host.logs_info = LogsState::Requested;
            host.logs_started_at = Some(now - TimeDelta::minutes(3));
        })
        .await;

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.rule, "refresh-logs-timed-out");
        assert_eq!(stored(&env, masters[0].id).await.logs_info, LogsState::Timeout);

        let t = env.manager.refresh_status(masters[0].id, now).await.unwrap();
        assert_eq!(t.rule, "refresh-no-op");
    }

    #[tokio::test]
    async fn test_stale_host_is_a_conflict() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, _| {}).await;
        let stale = masters[0].clone();
        env.store
            .update_host(
                stale.id,
                Some(HostStatus::Discovering),
                HostChanges::status(HostStatus::Disabled, STATUS_INFO_DISABLED),
            )
            .await
            .unwrap();

        let err = env.manager.refresh_host(&stale, now).await.unwrap_err();
        assert!(matches!(err, CoreError::GuardedUpdateConflict { .. }));
        assert_eq!(stored(&env, stale.id).await.status, HostStatus::Disabled);
    }

    #[tokio::test]
    async fn test_media_disconnected() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, hosts) = seeded(&env, now, |_, hosts| {
            hosts[0].status = HostStatus::Known;
            hosts[1].status = HostStatus::InstallingInProgress;
        })
        .await;

        let t = env.manager.handle_media_disconnected(hosts[0].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Disconnected);
        let host = stored(&env, hosts[0].id).await;
        assert_eq!(host.media_status, Some(MediaStatus::Disconnected));
        assert_eq!(host.status_info, STATUS_INFO_MEDIA_DISCONNECTED);

        let t = env.manager.handle_media_disconnected(hosts[1].id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Error);
        assert_eq!(stored(&env, hosts[1].id).await.media_status, Some(MediaStatus::Disconnected));
    }

    #[tokio::test]
    async fn test_media_disconnected_without_rule_writes_nothing() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, hosts) = seeded(&env, now, |_, hosts| {
            hosts[0].status = HostStatus::Installed;
        })
        .await;

        let err = env.manager.handle_media_disconnected(hosts[0].id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
        let host = stored(&env, hosts[0].id).await;
        assert_eq!(host.status, HostStatus::Installed);
        assert_eq!(host.media_status, None);
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, _| {}).await;
        let id = masters[0].id;

        env.manager.disable(id, now).await.unwrap();
        assert_eq!(stored(&env, id).await.status, HostStatus::Disabled);

        env.manager.enable(id, now).await.unwrap();
        let host = stored(&env, id).await;
        assert_eq!(host.status, HostStatus::Discovering);
        assert!(host.inventory.is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_logs() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| {
            let host = &mut hosts[0];
            host.status = HostStatus::Error;
            host.logs_started_at = Some(now);
            host.logs_collected_at = Some(now);
        })
        .await;
        let later = now + TimeDelta::minutes(1);

        env.manager.reset_host(masters[0].id, "cluster reset", later).await.unwrap();
        let host = stored(&env, masters[0].id).await;
        assert_eq!(host.status, HostStatus::Resetting);
        assert_eq!(host.status_info, "cluster reset");
        assert_eq!(host.status_updated_at, later);
        assert!(host.logs_started_at.is_none());
        assert!(host.logs_collected_at.is_none());
    }

    #[tokio::test]
    async fn test_update_role_only_before_installation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, hosts| hosts[1].status = HostStatus::Installing).await;

        env.manager.update_role(masters[0].id, HostRole::Worker).await.unwrap();
        assert_eq!(stored(&env, masters[0].id).await.role, HostRole::Worker);

        let err = env.manager.update_role(masters[1].id, HostRole::Worker).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidArgument(ref m)
                if m == "Host is in installing state, host role can be set only in one of [discovering known disconnected insufficient pending-for-input] states"
        ));
    }

    #[tokio::test]
    async fn test_update_hostname_validates() {
        let env = env(Config::default());
        let now = Utc::now();
        let (_, masters) = seeded(&env, now, |_, _| {}).await;

        assert!(matches!(
            env.manager.update_hostname(masters[0].id, "Bad_Name").await,
            Err(CoreError::InvalidArgument(_))
        ));
        env.manager.update_hostname(masters[0].id, "node-a").await.unwrap();
        assert_eq!(
            stored(&env, masters[0].id).await.requested_hostname.as_deref(),
            Some("node-a")
        );
    }

    #[tokio::test]
    async fn test_select_role() {
        let env = env(Config::default());
        let now = Utc::now();
        let cluster = configured_cluster(now);
        let masters = three_masters(&cluster, now);
        let candidate = host_with_inventory(
            Some(cluster.id),
            &sufficient_inventory("candidate", "192.168.127.40", now),
            now,
        );

        let role = env.manager.select_role(&candidate, Some(&cluster), &masters).unwrap();
        assert_eq!(role, HostRole::Worker);
        let role = env.manager.select_role(&candidate, Some(&cluster), &masters[..1]).unwrap();
        assert_eq!(role, HostRole::Master);
        let role = env
            .manager
            .select_role(&day2_host(cluster.id, now), Some(&cluster), &[])
            .unwrap();
        assert_eq!(role, HostRole::Worker);
    }

    #[tokio::test]
    async fn test_refresh_sets_suggested_role_and_auto_assign_uses_it() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, now, |_, _| {}).await;
        let mut host = host_with_inventory(
            Some(cluster.id),
            &sufficient_inventory("worker-0", "192.168.127.20", now),
            now,
        );
        host.status = HostStatus::Discovering;
        env.store.create_host(host.clone()).await.unwrap();

        env.manager.refresh_status(host.id, now).await.unwrap();
        assert_eq!(stored(&env, host.id).await.suggested_role, HostRole::Worker);

        assert!(env.manager.auto_assign_role(host.id).await.unwrap());
        assert_eq!(stored(&env, host.id).await.role, HostRole::Worker);
        assert!(!env.manager.auto_assign_role(host.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_pool_host_lifecycle() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, now, |_, _| {}).await;
        let host = host_with_inventory(None, &sufficient_inventory("pool-0", "192.168.127.30", now), now);

        let t = env.manager.register_host(host.clone(), None, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::DiscoveringUnbound);

        let t = env.manager.refresh_status(host.id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::KnownUnbound);
        assert_eq!(stored(&env, host.id).await.status_info, STATUS_INFO_READY_TO_BE_BOUND);

        let t = env.manager.bind_host(host.id, cluster.id, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Binding);
        assert_eq!(stored(&env, host.id).await.cluster_id, Some(cluster.id));

        // the agent reboots into the cluster's image
        let bound = stored(&env, host.id).await;
        let t = env.manager.register_host(bound, None, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Discovering);

        let t = env.manager.unbind_host(host.id, false, now).await.unwrap();
        assert_eq!(t.destination, HostStatus::Unbinding);
        assert_eq!(stored(&env, host.id).await.cluster_id, None);
    }

    #[tokio::test]
    async fn test_bind_requires_known_unbound() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, masters) = seeded(&env, now, |_, _| {}).await;

        let err = env.manager.bind_host(masters[0].id, cluster.id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
    }

    #[tokio::test]
    async fn test_require_user_action_reset() {
        let env = env(Config::default());
        let now = Utc::now();
        let mut host = Host::new(Uuid::new_v4(), Uuid::new_v4(), None, now);
        host.status = HostStatus::Resetting;
        assert!(!env.manager.is_require_user_action_reset(&host));
        host.progress.current_stage = Some(HostStage::Configuring);
        assert!(env.manager.is_require_user_action_reset(&host));
    }
}
