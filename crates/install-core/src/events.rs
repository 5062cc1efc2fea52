//! Event sink seam.
//!
//! Events are fire-and-forget: `add_event` cannot fail, so nothing a sink
//! does can abort a transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

string_enum! {
    /// Event severity
    pub enum Severity {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

/// One audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Host or cluster the event is about
    pub entity_id: Uuid,
    /// Cluster the entity belongs to
    pub cluster_id: Option<Uuid>,
    pub severity: Severity,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Receiver of audit events
pub trait EventSink: Send + Sync {
    /// Records an event
    fn add_event(&self, entity_id: Uuid, cluster_id: Option<Uuid>, severity: Severity, message: &str, time: DateTime<Utc>);
}

/// Writes events to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn add_event(&self, entity_id: Uuid, cluster_id: Option<Uuid>, severity: Severity, message: &str, time: DateTime<Utc>) {
        let cluster = cluster_id.map(|id| id.to_string()).unwrap_or_default();
        match severity {
            Severity::Info => info!(entity = %entity_id, cluster = %cluster, at = %time, "{}", message),
            Severity::Warning => warn!(entity = %entity_id, cluster = %cluster, at = %time, "{}", message),
            Severity::Error | Severity::Critical => {
                error!(entity = %entity_id, cluster = %cluster, at = %time, "{}", message);
            }
        }
    }
}
