//! Audit records for store- and registry-affecting events.
//!
//! Every commit or rejected commit of a reconciliation cycle, every
//! administrative sweep and every flow removal produces one [`AuditRecord`].
//! Records are emitted through [`audit_log!`](crate::audit_log) under the
//! `audit` tracing target as a single JSON document, so they can be split
//! from operational logs by target alone.
//!
//! | Outcome    | Level |
//! |------------|-------|
//! | Success    | Info  |
//! | Partial    | Info  |
//! | Failure    | Warn  |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of store-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// A reconciliation cycle committed its transaction
    CycleCommit,
    /// A reconciliation cycle failed at the transport or the commit
    CycleFailure,
    /// Administrative sweep without a paired write
    AdminClear,
    /// Device reported a flow as removed
    FlowRemoved,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::CycleCommit => write!(f, "CYCLE_COMMIT"),
            AuditCategory::CycleFailure => write!(f, "CYCLE_FAILURE"),
            AuditCategory::AdminClear => write!(f, "ADMIN_CLEAR"),
            AuditCategory::FlowRemoved => write!(f, "FLOW_REMOVED"),
        }
    }
}

/// Outcome of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Completed with no dropped replies or failed kinds
    Success,
    /// Committed, but some replies or kinds were dropped
    Partial,
    /// Nothing was applied
    Failure,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Partial => write!(f, "partial"),
            AuditOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// One structured audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC time the record was created
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Device the event applies to
    pub node_id: String,

    /// Short action name, e.g. `run_cycle`
    pub action: String,

    pub outcome: AuditOutcome,

    /// Statistics kind involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Failure reason when outcome is failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Request id of the cycle, for correlating with operational logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl AuditRecord {
    /// Creates a record timestamped now; the outcome starts as success.
    pub fn new(
        category: AuditCategory,
        node_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            node_id: node_id.into(),
            action: action.into(),
            outcome: AuditOutcome::Success,
            kind: None,
            details: None,
            error: None,
            request_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message and marks the outcome as failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Serializes the record to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] under the `audit` target, leveled by outcome.
///
/// # Usage
/// ```ignore
/// let record = AuditRecord::new(AuditCategory::CycleCommit, "openflow:1", "run_cycle")
///     .with_outcome(AuditOutcome::Success)
///     .with_kind("FLOW");
/// audit_log!(record);
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success | $crate::audit::AuditOutcome::Partial => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    node_id = %record.node_id,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {} - {}",
                    record.category,
                    record.node_id,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    node_id = %record.node_id,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {} - {}",
                    record.category,
                    record.node_id,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(AuditCategory::CycleCommit, "openflow:1", "run_cycle")
            .with_outcome(AuditOutcome::Success)
            .with_kind("FLOW")
            .with_request_id(7);

        assert_eq!(record.category, AuditCategory::CycleCommit);
        assert_eq!(record.node_id, "openflow:1");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.kind.as_deref(), Some("FLOW"));
        assert_eq!(record.request_id, Some(7));
    }

    #[test]
    fn test_new_record_defaults_to_success() {
        let record = AuditRecord::new(AuditCategory::FlowRemoved, "openflow:1", "on_flow_removed");

        assert_eq!(record.outcome, AuditOutcome::Success);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_with_error_sets_failure() {
        let record = AuditRecord::new(AuditCategory::CycleFailure, "openflow:1", "run_cycle")
            .with_error("store rejected transaction");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error.as_deref(), Some("store rejected transaction"));
    }

    #[test]
    fn test_json_omits_unset_fields() {
        let record = AuditRecord::new(AuditCategory::AdminClear, "openflow:2", "clear_statistics")
            .with_outcome(AuditOutcome::Partial)
            .with_details(serde_json::json!({"deleted": 3}));

        let json: serde_json::Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(json["category"], "ADMIN_CLEAR");
        assert_eq!(json["outcome"], "partial");
        assert_eq!(json["details"]["deleted"], 3);
        assert!(json.get("error").is_none());
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_audit_log_macro_compiles_for_every_outcome() {
        for outcome in [
            AuditOutcome::Success,
            AuditOutcome::Partial,
            AuditOutcome::Failure,
        ] {
            let record = AuditRecord::new(AuditCategory::FlowRemoved, "openflow:1", "on_flow_removed")
                .with_outcome(outcome);
            crate::audit_log!(record);
        }
    }
}
