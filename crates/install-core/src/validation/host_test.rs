//! Unit tests for host validations

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::models::{DiskSpeed, HostRole, ImageAvailability, ImageAvailabilityResult, MonitoredOperator, OperatorType};
    use crate::test_utils::*;
    use crate::validation::host::{hostname_problem, HostValidationContext, HostValidationId};
    use crate::validation::ValidationStatus;
    use chrono::{TimeDelta, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn olm_operator(name: &str) -> MonitoredOperator {
        MonitoredOperator {
            name: name.to_string(),
            operator_type: OperatorType::Olm,
            status: None,
            timeout_seconds: 3600,
        }
    }

    #[test]
    fn test_missing_inventory_is_pending() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let mut host = crate::models::Host::new(Uuid::new_v4(), Uuid::new_v4(), Some(cluster.id), now);
        host.checked_in_at = Some(now);
        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);

        for id in [
            HostValidationId::HasMinCpuCores,
            HostValidationId::HasMinMemory,
            HostValidationId::HasMinValidDisks,
            HostValidationId::HostnameValid,
        ] {
            let (status, message) = validator.validate(id, &ctx);
            assert_eq!(status, ValidationStatus::Pending, "{id}");
            assert_eq!(message, "Missing inventory", "{id}");
        }
        let (status, _) = validator.validate(HostValidationId::HasInventory, &ctx);
        assert_eq!(status, ValidationStatus::Failure);
        let (status, message) = validator.validate(HostValidationId::Connected, &ctx);
        assert_eq!(status, ValidationStatus::Success);
        assert_eq!(message, "Host is connected");
    }

    #[test]
    fn test_unparsable_inventory_is_an_error() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let mut host = crate::models::Host::new(Uuid::new_v4(), Uuid::new_v4(), None, now);
        host.inventory = Some("{broken".to_string());
        let ctx = HostValidationContext::new(&host, None, &[], now);
        let (status, message) = validator.validate(HostValidationId::HasInventory, &ctx);
        assert_eq!(status, ValidationStatus::Error);
        assert!(message.starts_with("Inventory could not be parsed"));
    }

    #[test]
    fn test_disconnected_after_timeout() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let mut host = host_with_role(cluster.id, "master-0", "192.168.127.10", HostRole::Master, now);
        host.checked_in_at = Some(now - TimeDelta::minutes(4));
        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        let (status, message) = validator.validate(HostValidationId::Connected, &ctx);
        assert_eq!(status, ValidationStatus::Failure);
        assert_eq!(message, "Host is disconnected");
    }

    #[test]
    fn test_every_validation_has_a_message() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let hosts = three_masters(&cluster, now);
        let bare = crate::models::Host::new(Uuid::new_v4(), Uuid::new_v4(), Some(cluster.id), now);

        for host in [&hosts[0], &bare] {
            let ctx = HostValidationContext::new(host, Some(&cluster), &hosts, now);
            for id in HostValidationId::ALL {
                let (_, message) = validator.validate(*id, &ctx);
                assert!(!message.is_empty(), "{id} has no message");
            }
        }
    }

    #[test]
    fn test_role_requirements() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let mut host = host_with_role(cluster.id, "master-0", "192.168.127.10", HostRole::Master, now);

        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        assert_eq!(validator.validate(HostValidationId::HasCpuCoresForRole, &ctx).0, ValidationStatus::Success);
        assert_eq!(validator.validate(HostValidationId::HasMemoryForRole, &ctx).0, ValidationStatus::Success);

        host.role = HostRole::AutoAssign;
        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        let (status, message) = validator.validate(HostValidationId::HasCpuCoresForRole, &ctx);
        assert_eq!(status, ValidationStatus::Error);
        assert_eq!(message, "Role could not be determined for the host");
    }

    #[test]
    fn test_hostname_checks() {
        assert!(hostname_problem("master-0.example.com").is_none());
        assert!(hostname_problem("localhost").is_some());
        assert!(hostname_problem("Bad_Name").is_some());
        assert!(hostname_problem("-leading").is_some());

        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let mut hosts = three_masters(&cluster, now);
        hosts[1].requested_hostname = Some("master-0".to_string());
        let ctx = HostValidationContext::new(&hosts[0], Some(&cluster), &hosts, now);
        let (status, message) = validator.validate(HostValidationId::HostnameUnique, &ctx);
        assert_eq!(status, ValidationStatus::Failure);
        assert_eq!(message, "Hostname master-0 is not unique in cluster");

        let ctx = HostValidationContext::new(&hosts[2], Some(&cluster), &hosts, now);
        assert_eq!(validator.validate(HostValidationId::HostnameUnique, &ctx).0, ValidationStatus::Success);
    }

    #[test]
    fn test_belongs_to_machine_cidr() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let mut cluster = configured_cluster(now);
        let inside = host_with_role(cluster.id, "inside", "192.168.127.10", HostRole::Worker, now);
        let outside = host_with_role(cluster.id, "outside", "10.0.0.10", HostRole::Worker, now);

        let ctx = HostValidationContext::new(&inside, Some(&cluster), &[], now);
        assert_eq!(validator.validate(HostValidationId::BelongsToMachineCidr, &ctx).0, ValidationStatus::Success);
        let ctx = HostValidationContext::new(&outside, Some(&cluster), &[], now);
        assert_eq!(validator.validate(HostValidationId::BelongsToMachineCidr, &ctx).0, ValidationStatus::Failure);

        cluster.user_managed_networking = true;
        let ctx = HostValidationContext::new(&outside, Some(&cluster), &[], now);
        let (status, message) = validator.validate(HostValidationId::BelongsToMachineCidr, &ctx);
        assert_eq!(status, ValidationStatus::Success);
        assert!(message.contains("User Managed Networking"));
    }

    #[test]
    fn test_majority_group_pending_without_groups() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let mut cluster = configured_cluster(now);
        let hosts = three_masters(&cluster, now);

        let ctx = HostValidationContext::new(&hosts[0], Some(&cluster), &hosts, now);
        assert_eq!(validator.validate(HostValidationId::BelongsToMajorityGroup, &ctx).0, ValidationStatus::Pending);

        cluster
            .connectivity_majority_groups
            .insert(MACHINE_NETWORK.to_string(), vec![hosts[0].id, hosts[1].id]);
        let ctx = HostValidationContext::new(&hosts[0], Some(&cluster), &hosts, now);
        assert_eq!(validator.validate(HostValidationId::BelongsToMajorityGroup, &ctx).0, ValidationStatus::Success);
        let ctx = HostValidationContext::new(&hosts[2], Some(&cluster), &hosts, now);
        assert_eq!(validator.validate(HostValidationId::BelongsToMajorityGroup, &ctx).0, ValidationStatus::Failure);
    }

    #[test]
    fn test_disk_speed_and_api_vip() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let mut host = host_with_role(cluster.id, "master-0", "192.168.127.10", HostRole::Master, now);

        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        assert_eq!(
            validator.validate(HostValidationId::SufficientInstallationDiskSpeed, &ctx).0,
            ValidationStatus::SuccessSuppressOutput
        );
        assert_eq!(
            validator.validate(HostValidationId::ApiVipConnected, &ctx).0,
            ValidationStatus::SuccessSuppressOutput
        );

        host.disk_speed = Some(DiskSpeed {
            tested: true,
            exit_code: 0,
            speed_ms: 25,
        });
        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        assert_eq!(
            validator.validate(HostValidationId::SufficientInstallationDiskSpeed, &ctx).0,
            ValidationStatus::Failure
        );

        let day2 = day2_host(cluster.id, now);
        let ctx = HostValidationContext::new(&day2, Some(&cluster), &[], now);
        assert_eq!(validator.validate(HostValidationId::ApiVipConnected, &ctx).0, ValidationStatus::Pending);
    }

    #[test]
    fn test_container_images() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let cluster = configured_cluster(now);
        let mut host = host_with_role(cluster.id, "master-0", "192.168.127.10", HostRole::Master, now);
        host.images_status.insert(
            "quay.io/release".to_string(),
            ImageAvailability {
                name: "quay.io/release".to_string(),
                result: ImageAvailabilityResult::Failure,
                download_rate: 0.0,
            },
        );
        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        let (status, message) = validator.validate(HostValidationId::ContainerImagesAvailable, &ctx);
        assert_eq!(status, ValidationStatus::Failure);
        assert!(message.contains("quay.io/release"));
    }

    #[test]
    fn test_operator_requirements() {
        let now = Utc::now();
        let validator = test_host_validator(Arc::new(Config::default()));
        let mut cluster = configured_cluster(now);
        let mut host = host_with_role(cluster.id, "master-0", "192.168.127.10", HostRole::Master, now);

        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        let (status, message) = validator.validate(HostValidationId::OdfRequirementsSatisfied, &ctx);
        assert_eq!(status, ValidationStatus::Success);
        assert!(message.ends_with("is disabled"));

        cluster.monitored_operators = vec![olm_operator("odf"), olm_operator("cnv")];
        let mut inventory = sufficient_inventory("master-0", "192.168.127.10", now);
        inventory.disks.truncate(1);
        inventory.cpu.flags.clear();
        host.inventory = Some(serde_json::to_string(&inventory).unwrap());
        let ctx = HostValidationContext::new(&host, Some(&cluster), &[], now);
        assert_eq!(
            validator.validate(HostValidationId::OdfRequirementsSatisfied, &ctx).0,
            ValidationStatus::Failure
        );
        assert_eq!(
            validator.validate(HostValidationId::CnvRequirementsSatisfied, &ctx).0,
            ValidationStatus::Failure
        );
    }
}
