//! Agent-facing step types.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

string_enum! {
    /// Kind of work an agent is asked to run
    pub enum StepType {
        ConnectivityCheck => "connectivity-check",
        FreeNetworkAddresses => "free-network-addresses",
        DhcpLeaseAllocate => "dhcp-lease-allocate",
        Inventory => "inventory",
        NtpSynchronizer => "ntp-synchronizer",
        Install => "install",
        InstallationDiskSpeedCheck => "installation-disk-speed-check",
        ContainerImageAvailability => "container-image-availability",
        ResetInstallation => "reset-installation",
        LogsGather => "logs-gather",
        StopInstallation => "stop-installation",
        ApiVipConnectivityCheck => "api-vip-connectivity-check",
    }
}

string_enum! {
    /// What the agent does once the steps ran
    pub enum PostStepAction {
        Continue => "continue",
        Exit => "exit",
    }
}

/// One instruction for an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_type: StepType,
    /// `<step-type>-<8 hex chars>`, assigned by the manager when empty
    #[serde(default)]
    pub step_id: String,
    /// Request payloads, JSON encoded
    #[serde(default)]
    pub args: Vec<String>,
}

impl Step {
    /// Step without an ID yet
    #[must_use]
    pub fn new(step_type: StepType, args: Vec<String>) -> Self {
        Self {
            step_type,
            step_id: String::new(),
            args,
        }
    }
}

/// Answer to an agent's poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Steps {
    pub instructions: Vec<Step>,
    /// Seconds until the agent should poll again
    pub next_instruction_seconds: u64,
    pub post_step_action: PostStepAction,
}

/// Fresh step ID: the step type followed by 8 random hex characters
#[must_use]
pub fn new_step_id(step_type: StepType) -> String {
    let mut id = String::with_capacity(step_type.as_str().len() + 9);
    id.push_str(step_type.as_str());
    id.push('-');
    for byte in &Uuid::new_v4().as_bytes()[..4] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_id_format() {
        let id = new_step_id(StepType::DhcpLeaseAllocate);
        let suffix = id.strip_prefix("dhcp-lease-allocate-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_step_id(StepType::DhcpLeaseAllocate));
    }

    #[test]
    fn test_steps_wire_format() {
        let steps = Steps {
            instructions: vec![Step {
                step_type: StepType::Inventory,
                step_id: "inventory-0a1b2c3d".to_string(),
                args: vec![],
            }],
            next_instruction_seconds: 60,
            post_step_action: PostStepAction::Continue,
        };
        let json = serde_json::to_value(&steps).unwrap();
        assert_eq!(json["post_step_action"], "continue");
        assert_eq!(json["instructions"][0]["step_type"], "inventory");
        assert_eq!(json["next_instruction_seconds"], 60);
    }
}
