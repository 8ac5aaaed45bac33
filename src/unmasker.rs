//! Unmasking: scan placeholders, gate by role, reveal from the vault.
//!
//! Denied and missing tokens look the same to the caller: the placeholder
//! stays verbatim and nothing is added to the reveal list. The two are told
//! apart only in logs (`disposition`) and in the audit counters
//! `denied_count` / `missing_count`.
//!
//! A placeholder whose entity type differs from the stored entry's type
//! counts as missing, so renaming a placeholder cannot get around the role
//! gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::audit::{record_best_effort, AuditRecorder};
use crate::policy::{allow, Role};
use crate::store::VaultBackend;
use crate::types::{scan_placeholders, AuditEvent, AuditOperation, ContextMap, EntityType};
use crate::vault::{VaultError, VaultStore};

/// Error type for unmask operations.
#[derive(Debug, thiserror::Error)]
pub enum UnmaskError {
    /// A vault read failed; no text was produced.
    #[error("Vault unavailable: {0}")]
    VaultUnavailable(#[from] VaultError),
}

/// One revealed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedEntity {
    /// Entity type from the placeholder.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// The placeholder that was replaced.
    pub token: String,
    /// The restored value.
    #[serde(rename = "original_text")]
    pub original_value: String,
}

/// Result of [`Unmasker::unmask`].
#[derive(Debug, Clone, Serialize)]
pub struct UnmaskOutcome {
    /// Text with every authorized, present placeholder replaced.
    pub text: String,
    /// Revealed tokens, rightmost first.
    pub revealed: Vec<RevealedEntity>,
    /// Audit record id, or a sentinel when auditing degraded.
    pub audit_id: String,
}

/// Per-token outcome, logged but never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Revealed,
    Denied,
    Missing,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Revealed => "revealed",
            Self::Denied => "denied",
            Self::Missing => "missing",
        }
    }
}

/// Reverses masking for authorized roles.
pub struct Unmasker<B: VaultBackend> {
    vault: VaultStore<B>,
    audit: Arc<dyn AuditRecorder>,
    audit_timeout: Duration,
}

impl<B: VaultBackend> Unmasker<B> {
    /// Default audit timeout.
    pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Create an unmasker.
    pub fn new(vault: VaultStore<B>, audit: Arc<dyn AuditRecorder>) -> Self {
        Self {
            vault,
            audit,
            audit_timeout: Self::DEFAULT_AUDIT_TIMEOUT,
        }
    }

    /// Override the audit timeout.
    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    /// Reveal placeholders in `masked_text` that `role` may see.
    pub async fn unmask(
        &self,
        session_id: &str,
        masked_text: &str,
        role: Role,
        context: &ContextMap,
    ) -> Result<UnmaskOutcome, UnmaskError> {
        let started = Instant::now();
        let placeholders = scan_placeholders(masked_text);

        let mut text = masked_text.to_string();
        let mut revealed = Vec::new();
        let mut denied_count = 0usize;
        let mut missing_count = 0usize;

        for found in placeholders.iter().rev() {
            let token = &found.token;

            let disposition = if !allow(role, &token.entity_type) {
                Disposition::Denied
            } else {
                match self.vault.get(session_id, &token.token_id).await {
                    Ok(Some(entry)) if entry.entity_type != token.entity_type => {
                        warn!(
                            session_id = %session_id,
                            token_id = %token.token_id,
                            placeholder_type = %token.entity_type,
                            stored_type = %entry.entity_type,
                            "Placeholder type does not match vault entry, leaving it masked"
                        );
                        Disposition::Missing
                    }
                    Ok(Some(entry)) => {
                        text.replace_range(found.start..found.end, &entry.original_value);
                        revealed.push(RevealedEntity {
                            entity_type: token.entity_type.clone(),
                            token: found.text(masked_text).to_string(),
                            original_value: entry.original_value,
                        });
                        Disposition::Revealed
                    }
                    Ok(None) => Disposition::Missing,
                    Err(e) => {
                        error!(
                            session_id = %session_id,
                            token_id = %token.token_id,
                            error = %e,
                            "Vault read failed, aborting unmask"
                        );
                        let event = AuditEvent::new(AuditOperation::Unmask, session_id, context)
                            .with_success(false)
                            .with_extra("error", e.to_string());
                        record_best_effort(self.audit.as_ref(), &event, self.audit_timeout).await;
                        return Err(UnmaskError::VaultUnavailable(e));
                    }
                }
            };

            match disposition {
                Disposition::Denied => denied_count += 1,
                Disposition::Missing => missing_count += 1,
                Disposition::Revealed => {}
            }

            debug!(
                session_id = %session_id,
                entity_type = %token.entity_type,
                token_id = %token.token_id,
                role = %role,
                disposition = disposition.as_str(),
                "Placeholder processed"
            );
        }

        let event = AuditEvent::new(AuditOperation::Unmask, session_id, context)
            .with_entity_types(revealed.iter().map(|r| r.entity_type.as_str().to_string()))
            .with_extra("entities_count", revealed.len())
            .with_extra("placeholders_found", placeholders.len())
            .with_extra("denied_count", denied_count)
            .with_extra("missing_count", missing_count);
        let audit_id = record_best_effort(self.audit.as_ref(), &event, self.audit_timeout).await;

        info!(
            target: "pii_vault::metrics",
            metric_type = "unmask",
            session_id = %session_id,
            role = %role,
            placeholders = placeholders.len(),
            revealed = revealed.len(),
            denied = denied_count,
            missing = missing_count,
            latency_ms = started.elapsed().as_millis() as u64,
            "unmask_metric"
        );

        Ok(UnmaskOutcome {
            text,
            revealed,
            audit_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditRecorder;
    use crate::cipher::ChaChaCipher;
    use crate::store::InMemoryVaultBackend;
    use crate::types::{Token, VaultEntry};
    use chrono::Utc;

    async fn seeded(session_id: &str, values: &[(&str, &str)]) -> (Unmasker<InMemoryVaultBackend>, Arc<MemoryAuditRecorder>, Vec<String>) {
        let vault = VaultStore::new(
            Arc::new(InMemoryVaultBackend::new()),
            Arc::new(ChaChaCipher::new(&[5u8; 32])),
        );
        let mut placeholders = Vec::new();
        for (entity_type, value) in values {
            let entity_type = EntityType::new(entity_type);
            let token = Token::mint(session_id, &entity_type, value);
            let entry = VaultEntry {
                session_id: session_id.to_string(),
                token_id: token.token_id.clone(),
                original_value: value.to_string(),
                entity_type,
                detection_source: "rule".to_string(),
                context: ContextMap::new(),
                created_at: Utc::now(),
                ttl_secs: 60,
            };
            vault.put(session_id, &token.token_id, &entry, Duration::from_secs(60)).await.unwrap();
            placeholders.push(token.placeholder());
        }
        let audit = Arc::new(MemoryAuditRecorder::default());
        (Unmasker::new(vault, audit.clone()), audit, placeholders)
    }

    #[tokio::test]
    async fn test_admin_reveals_everything() {
        let (unmasker, _, ph) = seeded("s1", &[("PERSON", "Ada"), ("CREDIT_CARD", "4111111111111111")]).await;
        let masked = format!("{} paid with {}", ph[0], ph[1]);

        let outcome = unmasker.unmask("s1", &masked, Role::Admin, &ContextMap::new()).await.unwrap();
        assert_eq!(outcome.text, "Ada paid with 4111111111111111");
        assert_eq!(outcome.revealed.len(), 2);
        assert_eq!(outcome.revealed[0].entity_type.as_str(), "CREDIT_CARD");
    }

    #[tokio::test]
    async fn test_denied_and_missing_look_alike() {
        let (unmasker, audit, ph) = seeded("s1", &[("PERSON", "Ada"), ("CREDIT_CARD", "4111111111111111")]).await;
        let masked = format!("{} {} [PERSON_00000000]", ph[0], ph[1]);

        let outcome = unmasker
            .unmask("s1", &masked, Role::CustomerService, &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, format!("Ada {} [PERSON_00000000]", ph[1]));
        assert_eq!(outcome.revealed.len(), 1);

        let event = &audit.events()[0];
        assert!(event.success);
        assert_eq!(event.entity_types, vec!["PERSON"]);
        assert_eq!(event.extra["denied_count"], 1);
        assert_eq!(event.extra["missing_count"], 1);
    }

    #[tokio::test]
    async fn test_guest_reveals_nothing_but_is_audited() {
        let (unmasker, audit, ph) = seeded("s1", &[("PERSON", "Ada")]).await;
        let outcome = unmasker.unmask("s1", &ph[0], Role::Guest, &ContextMap::new()).await.unwrap();
        assert_eq!(outcome.text, ph[0]);
        assert!(outcome.revealed.is_empty());
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_renamed_placeholder_is_missing() {
        let (unmasker, audit, ph) = seeded("s1", &[("CREDIT_CARD", "4111111111111111")]).await;
        let renamed = ph[0].replacen("[CREDIT_CARD_", "[PERSON_", 1);

        let outcome = unmasker
            .unmask("s1", &renamed, Role::CustomerService, &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, renamed);
        assert!(outcome.revealed.is_empty());

        // Same rule for admins: the placeholder must match what was stored.
        let outcome = unmasker.unmask("s1", &renamed, Role::Admin, &ContextMap::new()).await.unwrap();
        assert_eq!(outcome.text, renamed);

        let events = audit.events();
        assert_eq!(events[0].extra["missing_count"], 1);
        assert!(events[0].entity_types.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_session_is_missing() {
        let (unmasker, _, ph) = seeded("s1", &[("PERSON", "Ada")]).await;
        let outcome = unmasker.unmask("s2", &ph[0], Role::Admin, &ContextMap::new()).await.unwrap();
        assert_eq!(outcome.text, ph[0]);
    }

    #[tokio::test]
    async fn test_malformed_placeholders_untouched() {
        let (unmasker, _, _) = seeded("s1", &[]).await;
        let text = "[FOO_zzzzzzzz] [person_0a1b2c3d] [PERSON_0A1B2C3D] [PERSON_0a1b2c3]";
        let outcome = unmasker.unmask("s1", text, Role::Admin, &ContextMap::new()).await.unwrap();
        assert_eq!(outcome.text, text);
        assert!(outcome.revealed.is_empty());
    }
}
