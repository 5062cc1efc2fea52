//! Validation engine.
//!
//! A validation is a named, categorised check computed from an immutable
//! context snapshot. It always yields a status and a non-empty message;
//! missing inputs degrade to `pending`, collaborator failures to `error`.
//!
//! - `host` / `cluster`: the validation IDs and their check + message pairs
//! - `hardware`, `connectivity`, `operators`: injected collaborators
//! - `network`: CIDR and address helpers shared by both entity kinds

pub mod cluster;
pub mod connectivity;
pub mod hardware;
pub mod host;
#[cfg(test)]
mod host_test;
pub mod network;
pub mod operators;

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use cluster::{ClusterValidationContext, ClusterValidationId, ClusterValidator};
pub use connectivity::{ConnectivityValidator, DefaultConnectivityValidator};
pub use hardware::{DefaultHardwareValidator, HardwareValidator};
pub use host::{HostValidationContext, HostValidationId, HostValidator};
pub use operators::{BuiltinOperatorsValidator, OperatorsValidator};

string_enum! {
    /// Outcome of a single validation
    pub enum ValidationStatus {
        Success => "success",
        Failure => "failure",
        Pending => "pending",
        Error => "error",
        /// Excluded by configuration; counts as passing
        Disabled => "disabled",
        /// Passing, but not worth showing to the user
        SuccessSuppressOutput => "success-suppress-output",
    }
}

impl ValidationStatus {
    /// Whether the status satisfies a guard
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Success | Self::SuccessSuppressOutput | Self::Disabled)
    }

    /// Whether the result is persisted and shown
    #[must_use]
    pub fn is_reported(self) -> bool {
        self != Self::SuccessSuppressOutput
    }
}

string_enum! {
    /// Presentation group of a validation
    pub enum ValidationCategory {
        Network => "network",
        Hardware => "hardware",
        Operators => "operators",
        Configuration => "configuration",
    }
}

/// A computed validation as persisted in `validations_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Validation ID
    pub id: String,
    /// Outcome
    pub status: ValidationStatus,
    /// Human-readable message for the outcome
    pub message: String,
}

/// Validation results grouped by category, each group sorted by ID
pub type ValidationsInfo = BTreeMap<ValidationCategory, Vec<ValidationResult>>;

/// Message reported for validations excluded by configuration
pub const VALIDATION_DISABLED_MESSAGE: &str = "Validation disabled by configuration";

/// Common shape of host and cluster validation IDs
pub trait ValidationId:
    Copy + Eq + fmt::Display + fmt::Debug + FromStr<Err = CoreError> + Send + Sync + 'static
{
    /// Every ID in evaluation order
    fn all() -> &'static [Self];

    /// Category the ID is presented under
    fn category(self) -> ValidationCategory;

    /// Wire form
    fn as_str(self) -> &'static str;
}

/// Category lookup for a raw ID.
///
/// An ID that maps to nothing is an internal configuration error.
pub fn category_of<I: ValidationId>(raw: &str) -> Result<ValidationCategory> {
    raw.parse::<I>()
        .map(ValidationId::category)
        .map_err(|_| CoreError::Configuration(format!("validation ID '{raw}' has no category")))
}

/// Groups raw results per category and sorts each group by ID
#[must_use]
pub fn group_results<I: ValidationId>(results: &[(I, ValidationStatus, String)]) -> ValidationsInfo {
    let mut grouped = ValidationsInfo::new();
    for (id, status, message) in results {
        if !status.is_reported() {
            continue;
        }
        grouped.entry(id.category()).or_default().push(ValidationResult {
            id: id.as_str().to_string(),
            status: *status,
            message: message.clone(),
        });
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| a.id.cmp(&b.id));
    }
    grouped
}

/// Messages of failing validations, sorted
#[must_use]
pub fn failing_messages(info: &ValidationsInfo) -> Vec<String> {
    let mut messages: Vec<String> = info
        .values()
        .flatten()
        .filter(|r| r.status == ValidationStatus::Failure)
        .map(|r| r.message.clone())
        .collect();
    messages.sort();
    messages
}

/// IDs that were `success` in `previous` and are `failure` in `current`
#[must_use]
pub fn newly_failed(previous: &ValidationsInfo, current: &ValidationsInfo) -> Vec<String> {
    let was_success = |id: &str| {
        previous
            .values()
            .flatten()
            .any(|r| r.id == id && r.status == ValidationStatus::Success)
    };
    current
        .values()
        .flatten()
        .filter(|r| r.status == ValidationStatus::Failure && was_success(&r.id))
        .map(|r| r.id.clone())
        .collect()
}

/// Parses a persisted `validations_info` blob
pub fn parse_validations_info(raw: Option<&str>) -> Result<ValidationsInfo> {
    match raw {
        None | Some("") => Ok(ValidationsInfo::new()),
        Some(raw) => Ok(serde_json::from_str(raw)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_host_id_has_a_category() {
        for id in HostValidationId::ALL {
            assert!(category_of::<HostValidationId>(id.as_str()).is_ok(), "{id}");
        }
        for id in ClusterValidationId::ALL {
            assert!(category_of::<ClusterValidationId>(id.as_str()).is_ok(), "{id}");
        }
    }

    #[test]
    fn test_unknown_id_is_a_configuration_error() {
        let err = category_of::<HostValidationId>("no-such-validation").unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn test_grouping_sorts_and_drops_suppressed() {
        let results = vec![
            (HostValidationId::HostnameValid, ValidationStatus::Success, "ok".to_string()),
            (HostValidationId::Connected, ValidationStatus::Failure, "down".to_string()),
            (
                HostValidationId::SufficientInstallationDiskSpeed,
                ValidationStatus::SuccessSuppressOutput,
                "not measured".to_string(),
            ),
        ];
        let info = group_results(&results);
        let network = &info[&ValidationCategory::Network];
        assert_eq!(network[0].id, "connected");
        assert_eq!(network[1].id, "hostname-valid");
        assert!(info
            .values()
            .flatten()
            .all(|r| r.id != "sufficient-installation-disk-speed"));
    }

    #[test]
    fn test_newly_failed_only_reports_success_to_failure() {
        let before = group_results(&[
            (HostValidationId::Connected, ValidationStatus::Success, String::new()),
            (HostValidationId::NtpSynced, ValidationStatus::Pending, String::new()),
        ]);
        let after = group_results(&[
            (HostValidationId::Connected, ValidationStatus::Failure, String::new()),
            (HostValidationId::NtpSynced, ValidationStatus::Failure, String::new()),
        ]);
        assert_eq!(newly_failed(&before, &after), vec!["connected".to_string()]);
    }

    #[test]
    fn test_validations_info_serialization() {
        let info = group_results(&[(HostValidationId::HasInventory, ValidationStatus::Pending, "Missing inventory".to_string())]);
        let raw = serde_json::to_string(&info).unwrap();
        assert!(raw.contains("\"hardware\""));
        assert_eq!(parse_validations_info(Some(&raw)).unwrap(), info);
        assert!(parse_validations_info(None).unwrap().is_empty());
    }
}
