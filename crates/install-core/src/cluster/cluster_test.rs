//! Unit tests for the cluster manager and its transition table

#[cfg(test)]
mod tests {
    use crate::cluster::common::*;
    use crate::cluster::ClusterManager;
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::mock::{MetricCall, RecordingEventSink, RecordingMetrics};
    use crate::models::{
        Cluster, ClusterKind, ClusterStatus, FinalizingStage, Host, HostStatus, LogsState, MonitoredOperator,
        OperatorStatus, OperatorType, PreparationStatus,
    };
    use crate::store::{ClusterChanges, HostChanges, MemoryStore, Store};
    use crate::test_utils::*;
    use crate::validation::parse_validations_info;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Env {
        store: Arc<MemoryStore>,
        events: Arc<RecordingEventSink>,
        metrics: Arc<RecordingMetrics>,
        manager: ClusterManager,
    }

    fn env(config: Config) -> Env {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let manager = ClusterManager::new(
            Arc::clone(&config),
            store.clone(),
            test_cluster_validator(config),
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

    /// Configured cluster in `status` with three known masters, adjusted by
    /// `prepare` before it is stored
    async fn seeded(
        env: &Env,
        status: ClusterStatus,
        now: DateTime<Utc>,
        prepare: impl FnOnce(&mut Cluster, &mut Vec<Host>),
    ) -> (Cluster, Vec<Host>) {
        let mut cluster = configured_cluster(now);
        cluster.status = status;
        let mut masters = three_masters(&cluster, now);
        for host in &mut masters {
            host.status = HostStatus::Known;
        }
        with_majority_group(&mut cluster, &masters);
        prepare(&mut cluster, &mut masters);
        seed(env.store.as_ref(), &cluster, &masters).await;
        (cluster, masters)
    }

    async fn stored(env: &Env, id: Uuid) -> Cluster {
        env.store.get_cluster(id).await.unwrap()
    }

    async fn set_host_status(env: &Env, host: &Host, status: HostStatus) {
        let rows = env
            .store
            .update_host(host.id, Some(host.status), HostChanges::status(status, ""))
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    fn operator(name: &str, operator_type: OperatorType, status: Option<OperatorStatus>) -> MonitoredOperator {
        MonitoredOperator {
            name: name.to_string(),
            operator_type,
            status,
            timeout_seconds: 0,
        }
    }

    #[tokio::test]
    async fn test_register_cluster() {
        let env = env(Config::default());
        let now = Utc::now();
        let cluster = configured_cluster(now);

        let t = env.manager.register_cluster(cluster.clone(), now).await.unwrap();
        assert_eq!(t.source, ClusterStatus::Unregistered);
        assert_eq!(t.destination, ClusterStatus::Insufficient);
        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.status_info, STATUS_INFO_INSUFFICIENT);
        assert_eq!(
            env.events.messages_for(cluster.id),
            vec!["Registered cluster test-cluster".to_string()]
        );

        assert!(env.manager.register_cluster(cluster, now).await.is_err());
    }

    #[tokio::test]
    async fn test_register_add_hosts_cluster() {
        let env = env(Config::default());
        let now = Utc::now();
        let mut cluster = configured_cluster(now);
        cluster.kind = ClusterKind::AddHostsCluster;

        let t = env.manager.register_cluster(cluster, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::AddingHosts);
    }

    #[tokio::test]
    async fn test_refresh_to_ready() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Insufficient, now, |_, _| {}).await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Ready);
        assert!(t.is_changed());

        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.status_info, STATUS_INFO_READY);
        let validations = parse_validations_info(stored.validations_info.as_deref()).unwrap();
        assert!(!validations.is_empty());
        assert!(validations.values().flatten().all(|v| v.status.is_ok()));
    }

    #[tokio::test]
    async fn test_missing_master_makes_ready_cluster_insufficient() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Ready, now, |_, hosts| {
            hosts.pop();
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.source, ClusterStatus::Ready);
        assert_eq!(t.destination, ClusterStatus::Insufficient);
        assert!(t.is_changed());
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_INSUFFICIENT);
    }

    #[tokio::test]
    async fn test_newly_failing_validation_is_reported() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, hosts) = seeded(&env, ClusterStatus::Insufficient, now, |_, _| {}).await;
        env.manager.refresh_status(cluster.id, now).await.unwrap();

        env.store.delete_host(hosts[2].id).await.unwrap();
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Insufficient);
        assert!(env.metrics.calls().contains(&MetricCall::ValidationFailed {
            entity: "cluster".to_string(),
            validation: "sufficient-masters-count".to_string(),
        }));
        assert!(env
            .events
            .messages_for(cluster.id)
            .iter()
            .any(|m| m.contains("validation 'sufficient-masters-count' that used to succeed is now failing")));
    }

    #[tokio::test]
    async fn test_refresh_pending_for_input() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Insufficient, now, |cluster, _| {
            cluster.pull_secret_set = false;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::PendingForInput);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_PENDING_FOR_INPUT);
    }

    #[tokio::test]
    async fn test_missing_vips_without_dhcp_need_user_input() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Insufficient, now, |cluster, _| {
            cluster.vip_dhcp_allocation = false;
            cluster.api_vips.clear();
            cluster.ingress_vips.clear();
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::PendingForInput);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_PENDING_FOR_INPUT);
    }

    #[tokio::test]
    async fn test_missing_vips_with_dhcp_is_insufficient() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::PendingForInput, now, |cluster, _| {
            cluster.vip_dhcp_allocation = true;
            cluster.api_vips.clear();
            cluster.ingress_vips.clear();
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Insufficient);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_INSUFFICIENT);
    }

    #[tokio::test]
    async fn test_disabled_validation_counts_as_passing() {
        let config = Config {
            disabled_cluster_validations: vec!["pull-secret-set".to_string()],
            ..Config::default()
        };
        let env = env(config);
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Insufficient, now, |cluster, _| {
            cluster.pull_secret_set = false;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Ready);
    }

    #[tokio::test]
    async fn test_host_not_ready_keeps_cluster_insufficient() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Ready, now, |_, hosts| {
            hosts[0].status = HostStatus::Insufficient;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Insufficient);
    }

    #[tokio::test]
    async fn test_prepare_for_installation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Ready, now, |_, _| {}).await;

        let t = env.manager.prepare_for_installation(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::PreparingForInstallation);
        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.install_started_at, Some(now));
        assert_eq!(stored.installation_preparation_completion_status, PreparationStatus::Pending);
        assert_eq!(stored.status_info, STATUS_INFO_PREPARING_FOR_INSTALLATION);
    }

    #[tokio::test]
    async fn test_prepare_requires_ready_cluster() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Insufficient, now, |_, _| {}).await;

        let err = env.manager.prepare_for_installation(cluster.id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
    }

    #[tokio::test]
    async fn test_preparation_success_starts_installing() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::PreparingForInstallation, now, |_, hosts| {
            for host in hosts.iter_mut() {
                host.status = HostStatus::PreparingSuccessful;
            }
        })
        .await;

        // Hosts are done, the cluster-level work is not
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::PreparingForInstallation);
        assert!(!t.is_changed());

        env.manager.handle_pre_install_success(cluster.id, now).await.unwrap();
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Installing);
        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.progress.preparing_for_installation_stage_percentage, 100);
        assert_eq!(stored.progress.total_percentage, 10);
    }

    #[tokio::test]
    async fn test_preparation_error_returns_to_ready() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::PreparingForInstallation, now, |_, hosts| {
            for host in hosts.iter_mut() {
                host.status = HostStatus::PreparingForInstallation;
            }
        })
        .await;

        env.manager
            .handle_pre_install_error(cluster.id, "release image unreachable", now)
            .await
            .unwrap();
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Ready);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_PREPARING_FAILED);
        assert!(env
            .events
            .messages_for(cluster.id)
            .contains(&"Failed to prepare the installation: release image unreachable".to_string()));
    }

    #[tokio::test]
    async fn test_pre_install_result_requires_preparing_cluster() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Ready, now, |_, _| {}).await;

        let err = env.manager.handle_pre_install_success(cluster.id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::GuardedUpdateConflict { .. }));
    }

    #[tokio::test]
    async fn test_host_that_stopped_preparing_makes_cluster_insufficient() {
        for preparation in [PreparationStatus::Pending, PreparationStatus::Succeeded, PreparationStatus::Failed] {
            let env = env(Config::default());
            let now = Utc::now();
            let (cluster, _) = seeded(&env, ClusterStatus::PreparingForInstallation, now, |cluster, hosts| {
                cluster.installation_preparation_completion_status = preparation;
                hosts[0].status = HostStatus::PreparingForInstallation;
                hosts[1].status = HostStatus::PreparingForInstallation;
                hosts[2].status = HostStatus::Insufficient;
            })
            .await;

            let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
            assert_eq!(t.destination, ClusterStatus::Insufficient, "preparation {preparation:?}");
            assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_UNPREPARING_HOST_EXISTS);
        }
    }

    #[tokio::test]
    async fn test_prepared_hosts_wait_for_the_last_one() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::PreparingForInstallation, now, |_, hosts| {
            hosts[0].status = HostStatus::PreparingSuccessful;
            hosts[1].status = HostStatus::PreparingSuccessful;
            hosts[2].status = HostStatus::PreparingForInstallation;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::PreparingForInstallation);
        assert!(!t.is_changed());
    }

    #[tokio::test]
    async fn test_preparation_timeout() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::PreparingForInstallation, now, |cluster, hosts| {
            cluster.status_updated_at = now - TimeDelta::minutes(11);
            for host in hosts.iter_mut() {
                host.status = HostStatus::PreparingForInstallation;
            }
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Ready);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_PREPARING_TIMED_OUT);
    }

    #[tokio::test]
    async fn test_installing_tracks_progress_then_finalizes() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, hosts) = seeded(&env, ClusterStatus::Installing, now, |cluster, hosts| {
            cluster.install_started_at = Some(now);
            for host in hosts.iter_mut() {
                host.status = HostStatus::InstallingInProgress;
                host.progress.installation_percentage = 50;
            }
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert!(!t.is_changed());
        let progress = stored(&env, cluster.id).await.progress;
        assert_eq!(progress.installing_stage_percentage, 50);
        assert_eq!(progress.total_percentage, 45);

        for host in &hosts {
            let host = env.store.get_host(host.id).await.unwrap();
            set_host_status(&env, &host, HostStatus::Installed).await;
        }
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Finalizing);
        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.status_info, STATUS_INFO_FINALIZING);
        assert_eq!(stored.progress.finalizing_stage, Some(FinalizingStage::WaitingForFinalizing));
        assert_eq!(stored.progress.finalizing_stage_started_at, Some(now));
        assert_eq!(stored.progress.total_percentage, 80);
    }

    #[tokio::test]
    async fn test_failed_master_fails_the_installation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Installing, now, |cluster, hosts| {
            cluster.install_started_at = Some(now);
            hosts[0].status = HostStatus::Error;
            hosts[1].status = HostStatus::InstallingInProgress;
            hosts[2].status = HostStatus::Installed;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Error);
        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.status_info, STATUS_INFO_HOSTS_FAILED);
        assert_eq!(stored.install_completed_at, Some(now));
        assert!(env.metrics.calls().contains(&MetricCall::ClusterInstallationFinished {
            result: "error".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_installation_timeout_while_pending_user_action() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::InstallingPendingUserAction, now, |cluster, hosts| {
            cluster.install_started_at = Some(now - TimeDelta::hours(25));
            for host in hosts.iter_mut() {
                host.status = HostStatus::InstallingInProgress;
            }
            hosts[0].status = HostStatus::InstallingPendingUserAction;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Error);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_INSTALLATION_TIMED_OUT);
    }

    #[tokio::test]
    async fn test_long_installation_keeps_installing() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Installing, now, |cluster, hosts| {
            cluster.install_started_at = Some(now - TimeDelta::hours(25));
            for host in hosts.iter_mut() {
                host.status = HostStatus::InstallingInProgress;
                host.progress.installation_percentage = 70;
            }
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert!(!t.is_changed());
        assert_eq!(stored(&env, cluster.id).await.status, ClusterStatus::Installing);
    }

    #[tokio::test]
    async fn test_pending_user_action_round_trip() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, hosts) = seeded(&env, ClusterStatus::Installing, now, |cluster, hosts| {
            cluster.install_started_at = Some(now);
            for host in hosts.iter_mut() {
                host.status = HostStatus::InstallingInProgress;
            }
            hosts[0].status = HostStatus::InstallingPendingUserAction;
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::InstallingPendingUserAction);

        set_host_status(&env, &hosts[0], HostStatus::InstallingInProgress).await;
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Installing);
        assert_eq!(stored(&env, cluster.id).await.status_info, STATUS_INFO_INSTALLING);
    }

    #[tokio::test]
    async fn test_finalizing_completes_when_operators_settle() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Finalizing, now, |cluster, hosts| {
            cluster.monitored_operators = vec![
                operator("console", OperatorType::Builtin, Some(OperatorStatus::Progressing)),
                operator("odf", OperatorType::Olm, None),
            ];
            for host in hosts.iter_mut() {
                host.status = HostStatus::Installed;
            }
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Finalizing);

        env.manager
            .update_operator_status(cluster.id, "console", OperatorStatus::Available)
            .await
            .unwrap();
        env.manager
            .update_operator_status(cluster.id, "odf", OperatorStatus::Failed)
            .await
            .unwrap();
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Installed);

        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.status_info, "Cluster is installed but degraded. Failed OLM operators: odf");
        assert_eq!(stored.progress.total_percentage, 100);
        assert_eq!(stored.install_completed_at, Some(now));
        assert!(env.metrics.calls().contains(&MetricCall::ClusterInstallationFinished {
            result: "installed".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_unknown_operator_is_rejected() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Finalizing, now, |_, _| {}).await;
        let err = env
            .manager
            .update_operator_status(cluster.id, "console", OperatorStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_finalizing_stage_timeout() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Finalizing, now, |cluster, _| {
            cluster.monitored_operators = vec![operator("console", OperatorType::Builtin, None)];
            cluster.status_updated_at = now - TimeDelta::hours(6);
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Error);
        assert_eq!(
            stored(&env, cluster.id).await.status_info,
            "Timeout while waiting for the cluster to finalize: stage Waiting for finalizing took longer than 5h"
        );
    }

    #[tokio::test]
    async fn test_soft_timeout_warns_once() {
        let config = Config {
            enable_soft_timeouts: true,
            ..Config::default()
        };
        let env = env(config);
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Finalizing, now, |cluster, _| {
            cluster.monitored_operators = vec![operator("console", OperatorType::Builtin, None)];
            cluster.status_updated_at = now - TimeDelta::hours(6);
        })
        .await;

        for _ in 0..3 {
            let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
            assert_eq!(t.destination, ClusterStatus::Finalizing);
        }
        let warnings: Vec<String> = env
            .events
            .messages_for(cluster.id)
            .into_iter()
            .filter(|m| m.contains("is taking longer than expected"))
            .collect();
        assert_eq!(
            warnings,
            vec!["Cluster test-cluster: finalizing stage Waiting for finalizing is taking longer than expected 5h".to_string()]
        );

        // A new stage gets its own warning
        env.manager
            .update_finalizing_stage(cluster.id, FinalizingStage::WaitingForClusterOperators, now)
            .await
            .unwrap();
        let stored = stored(&env, cluster.id).await;
        assert!(!stored.progress.finalizing_stage_timed_out);
    }

    #[tokio::test]
    async fn test_finalizing_stage_only_while_finalizing() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Installing, now, |_, _| {}).await;
        let err = env
            .manager
            .update_finalizing_stage(cluster.id, FinalizingStage::WaitingForClusterOperators, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_complete_installation() {
        let env = env(Config::default());
        let now = Utc::now();
        let (ok, _) = seeded(&env, ClusterStatus::Finalizing, now, |_, _| {}).await;
        let t = env.manager.complete_installation(ok.id, true, None, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Installed);
        assert_eq!(stored(&env, ok.id).await.status_info, STATUS_INFO_INSTALLED);

        let (failed, _) = seeded(&env, ClusterStatus::Finalizing, now, |_, _| {}).await;
        let t = env
            .manager
            .complete_installation(failed.id, false, Some("cluster operators degraded"), now)
            .await
            .unwrap();
        assert_eq!(t.destination, ClusterStatus::Error);
        assert_eq!(stored(&env, failed.id).await.status_info, "cluster operators degraded");

        let err = env
            .manager
            .complete_installation(failed.id, true, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_installation() {
        let env = env(Config::default());
        let now = Utc::now();

        let (preparing, _) = seeded(&env, ClusterStatus::PreparingForInstallation, now, |_, _| {}).await;
        let t = env.manager.cancel_installation(preparing.id, "user", now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Ready);

        let (installing, _) = seeded(&env, ClusterStatus::Installing, now, |_, _| {}).await;
        let t = env.manager.cancel_installation(installing.id, "user", now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Cancelled);
        assert_eq!(stored(&env, installing.id).await.status_info, "Installation was cancelled: user");
        assert!(env.metrics.calls().contains(&MetricCall::ClusterInstallationFinished {
            result: "cancelled".to_string(),
        }));

        let (idle, _) = seeded(&env, ClusterStatus::Insufficient, now, |_, _| {}).await;
        let err = env.manager.cancel_installation(idle.id, "user", now).await.unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingTransition { .. }));
    }

    #[tokio::test]
    async fn test_reset_cluster() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Error, now, |cluster, _| {
            cluster.install_started_at = Some(now - TimeDelta::hours(1));
            cluster.progress.total_percentage = 40;
            cluster.logs_info = LogsState::Completed;
        })
        .await;

        let t = env.manager.reset_cluster(cluster.id, "Reset by user", now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Insufficient);
        let stored = stored(&env, cluster.id).await;
        assert_eq!(stored.status_info, "Reset by user");
        assert_eq!(stored.install_started_at, None);
        assert_eq!(stored.progress.total_percentage, 0);
        assert_eq!(stored.logs_info, LogsState::Empty);
    }

    #[tokio::test]
    async fn test_deregister_cluster() {
        let env = env(Config::default());
        let now = Utc::now();
        let (installing, _) = seeded(&env, ClusterStatus::Installing, now, |_, _| {}).await;
        let err = env.manager.deregister_cluster(installing.id, now).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let (idle, hosts) = seeded(&env, ClusterStatus::Insufficient, now, |_, _| {}).await;
        env.manager.deregister_cluster(idle.id, now).await.unwrap();
        assert!(matches!(
            env.store.get_cluster(idle.id).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            env.store.get_host(hosts[0].id).await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_logs_timeout() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Error, now, |cluster, _| {
            cluster.logs_info = LogsState::Requested;
            cluster.controller_logs_started_at = Some(now - TimeDelta::minutes(3));
        })
        .await;

        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert_eq!(t.destination, ClusterStatus::Error);
        assert_eq!(stored(&env, cluster.id).await.logs_info, LogsState::Timeout);

        // Settled logs leave the cluster alone
        let t = env.manager.refresh_status(cluster.id, now).await.unwrap();
        assert!(!t.is_changed());
    }

    #[tokio::test]
    async fn test_stale_cluster_is_a_conflict() {
        let env = env(Config::default());
        let now = Utc::now();
        let (cluster, _) = seeded(&env, ClusterStatus::Insufficient, now, |_, _| {}).await;

        // Someone else moved the cluster on
        env.store
            .update_cluster(
                cluster.id,
                Some(ClusterStatus::Insufficient),
                ClusterChanges::status(ClusterStatus::PendingForInput, STATUS_INFO_PENDING_FOR_INPUT),
            )
            .await
            .unwrap();

        let err = env.manager.refresh_cluster(&cluster, now).await.unwrap_err();
        assert!(matches!(err, CoreError::GuardedUpdateConflict { .. }));
        assert_eq!(stored(&env, cluster.id).await.status, ClusterStatus::PendingForInput);
    }
}
