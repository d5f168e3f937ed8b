//! Audit logging for multicast tree changes.
//!
//! Every change to the replication trees (object create/destroy, association
//! changes, membership replacement, table programming, GC mode switches) is
//! emitted as a structured [`AuditRecord`]. Records carry a UTC timestamp,
//! the component and action, the affected object and an outcome, and are
//! serialized to JSON so they can be shipped to a collector as-is.
//!
//! # Severity mapping
//!
//! | Outcome | Level |
//! |---------|-------|
//! | Success | info |
//! | InProgress | debug |
//! | Failure | warn |
//!
//! The plain `debug_log!` / `info_log!` / `warn_log!` / `error_log!` macros
//! attach the emitting component as a `source` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Configuration changes to the device
    ConfigurationChange,
    /// Group, node or ECMP group creation
    ResourceCreate,
    /// Membership, association or attribute changes
    ResourceModify,
    /// Object destruction
    ResourceDelete,
    /// Daemon and session lifecycle
    SystemLifecycle,
    /// LAG, prune, port and limit table programming
    HardwareTable,
    /// Garbage collection policy and sweeps
    MemoryReclaim,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
            AuditCategory::ResourceCreate => write!(f, "RESOURCE_CREATE"),
            AuditCategory::ResourceModify => write!(f, "RESOURCE_MODIFY"),
            AuditCategory::ResourceDelete => write!(f, "RESOURCE_DELETE"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::HardwareTable => write!(f, "HARDWARE_TABLE"),
            AuditCategory::MemoryReclaim => write!(f, "MEMORY_RECLAIM"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
        }
    }
}

/// Structured audit record.
///
/// Built with the `with_*` methods and handed to [`audit_log!`]; the outcome
/// defaults to `InProgress` until set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC timestamp
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Component generating the event (e.g. "McOrch", "SessionManager")
    pub source: String,

    pub action: String,

    pub outcome: AuditOutcome,

    /// Affected object, e.g. a handle in hex or "mgid100"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Object class, e.g. "mgrp", "node", "ecmp", "lag"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Error message when the outcome is a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Groups related records, e.g. all calls of one session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message and marks the outcome as `Failure`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Serializes the record, falling back to an error object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level event with the emitting component as `source`.
///
/// ```ignore
/// debug_log!("McOrch", mgid = 10, "group created");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! error_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::error!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emits an [`AuditRecord`] on the `audit` target at the level its
/// outcome maps to.
///
/// ```ignore
/// audit_log!(
///     AuditRecord::new(AuditCategory::ResourceCreate, "McOrch", "mgrp_create")
///         .with_outcome(AuditOutcome::Success)
///         .with_object_id("mgid100")
///         .with_object_type("mgrp")
/// );
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs the global subscriber with JSON output.
///
/// `RUST_LOG` overrides `log_level` when set.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Installs the global subscriber with human-readable output.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(AuditCategory::ResourceCreate, "McOrch", "mgrp_create")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("mgid100")
            .with_object_type("mgrp");

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.source, "McOrch");
        assert_eq!(record.action, "mgrp_create");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id, Some("mgid100".to_string()));
        assert_eq!(record.object_type, Some("mgrp".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(AuditCategory::ResourceDelete, "McOrch", "node_destroy")
            .with_error("node is still associated");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error, Some("node is still associated".to_string()));
    }

    #[test]
    fn test_audit_record_json_serialization() {
        let record = AuditRecord::new(AuditCategory::MemoryReclaim, "McOrch", "set_gc_mode")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "previous": "interrupt",
                "mode": "periodic",
            }));

        let json = record.to_json();
        assert!(json.contains("MEMORY_RECLAIM"));
        assert!(json.contains("set_gc_mode"));
        assert!(json.contains("\"mode\":\"periodic\""));
        assert!(!json.contains("object_id"));
    }

    #[test]
    fn test_audit_category_display() {
        assert_eq!(AuditCategory::ResourceCreate.to_string(), "RESOURCE_CREATE");
        assert_eq!(AuditCategory::HardwareTable.to_string(), "HARDWARE_TABLE");
    }

    #[test]
    fn test_audit_outcome_display() {
        assert_eq!(AuditOutcome::Success.to_string(), "success");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_audit_record_with_correlation_id() {
        let record = AuditRecord::new(AuditCategory::SystemLifecycle, "SessionManager", "end_batch")
            .with_correlation_id("sess4");
        assert_eq!(record.correlation_id, Some("sess4".to_string()));
        assert_eq!(record.outcome, AuditOutcome::InProgress);
    }
}
