//! Audit facts emitted by mask and unmask operations.
//!
//! The core only produces these records. Persisting them for compliance is
//! the job of whatever [`AuditRecorder`](crate::audit::AuditRecorder) is
//! plugged in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{context_str, ContextMap};

/// Audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    /// Text was masked and vault entries written.
    Mask,
    /// Masked text was (partially) revealed.
    Unmask,
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mask => write!(f, "MASK"),
            Self::Unmask => write!(f, "UNMASK"),
        }
    }
}

/// One audit fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Record id (`evt_` + 12 hex chars).
    pub event_id: String,
    /// When the operation completed.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub operation: AuditOperation,
    /// Session the operation ran in.
    pub session_id: String,
    /// Acting user, from context `user_id`.
    pub actor_id: Option<String>,
    /// Acting role, from context `user_role`.
    pub actor_role: Option<String>,
    /// Distinct entity types involved, sorted.
    pub entity_types: Vec<String>,
    /// Declared purpose, from context `purpose`.
    pub purpose: Option<String>,
    /// Declared reason, from context `reason`.
    pub reason: Option<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Operation-specific counters and detector metadata.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuditEvent {
    /// Start an event for `operation`, filling actor fields from `context`.
    pub fn new(operation: AuditOperation, session_id: impl Into<String>, context: &ContextMap) -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self {
            event_id: format!("evt_{}", &simple[..12]),
            timestamp: Utc::now(),
            operation,
            session_id: session_id.into(),
            actor_id: context_str(context, "user_id").map(str::to_string),
            actor_role: context_str(context, "user_role").map(str::to_string),
            entity_types: Vec::new(),
            purpose: context_str(context, "purpose").map(str::to_string),
            reason: context_str(context, "reason").map(str::to_string),
            success: true,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the entity types, deduplicated and sorted.
    pub fn with_entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut types: Vec<String> = types.into_iter().map(Into::into).collect();
        types.sort();
        types.dedup();
        self.entity_types = types;
        self
    }

    /// Mark success or failure.
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Attach an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_context() {
        let mut context = ContextMap::new();
        context.insert("user_id".into(), serde_json::json!("u-7"));
        context.insert("user_role".into(), serde_json::json!("customer_service"));
        context.insert("purpose".into(), serde_json::json!("support ticket"));

        let event = AuditEvent::new(AuditOperation::Unmask, "s1", &context)
            .with_entity_types(["PERSON", "EMAIL_ADDRESS", "PERSON"])
            .with_extra("entities_count", 3);

        assert!(event.event_id.starts_with("evt_"));
        assert_eq!(event.event_id.len(), 16);
        assert_eq!(event.actor_id.as_deref(), Some("u-7"));
        assert_eq!(event.actor_role.as_deref(), Some("customer_service"));
        assert_eq!(event.reason, None);
        assert_eq!(event.entity_types, vec!["EMAIL_ADDRESS", "PERSON"]);
        assert_eq!(event.extra["entities_count"], 3);
    }

    #[test]
    fn test_operation_serializes_uppercase() {
        assert_eq!(serde_json::to_value(AuditOperation::Mask).unwrap(), "MASK");
        assert_eq!(AuditOperation::Unmask.to_string(), "UNMASK");
    }
}
