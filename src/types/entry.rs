//! Vault entry payload.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::span::EntityType;
use super::token::TokenId;

/// Schema-free request context (`user_id`, `user_role`, `purpose`, ...).
///
/// Values are passed through untouched into vault entries and audit facts.
pub type ContextMap = BTreeMap<String, serde_json::Value>;

/// Read a string-valued key from a context map.
pub fn context_str<'a>(context: &'a ContextMap, key: &str) -> Option<&'a str> {
    context.get(key).and_then(|v| v.as_str())
}

/// Original value and metadata stored behind a token.
///
/// Serialized to JSON and encrypted as a whole before it reaches a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Owning session.
    pub session_id: String,
    /// Token id within the session.
    pub token_id: TokenId,
    /// The masked value.
    pub original_value: String,
    /// Entity type of the value.
    pub entity_type: EntityType,
    /// Detector kind that found the value (`rule`, `statistical`, `neural`).
    pub detection_source: String,
    /// Request context at mask time.
    #[serde(default)]
    pub context: ContextMap,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds from `created_at`.
    pub ttl_secs: u64,
}

impl VaultEntry {
    /// Time at which the entry stops being retrievable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_json_shape() {
        let mut context = ContextMap::new();
        context.insert("user_role".to_string(), serde_json::json!("admin"));
        context.insert("tags".to_string(), serde_json::json!(["a", {"b": 1}]));

        let entry = VaultEntry {
            session_id: "s1".to_string(),
            token_id: TokenId::mint("s1", &EntityType::new("PERSON"), "Ada"),
            original_value: "Ada".to_string(),
            entity_type: EntityType::new("PERSON"),
            detection_source: "statistical".to_string(),
            context,
            created_at: Utc::now(),
            ttl_secs: 60,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entity_type"], "PERSON");
        assert_eq!(json["context"]["tags"][1]["b"], 1);

        let back: VaultEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(context_str(&back.context, "user_role"), Some("admin"));
        assert_eq!(context_str(&back.context, "tags"), None);
        assert_eq!((back.expires_at() - back.created_at).num_seconds(), 60);
    }
}
