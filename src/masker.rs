//! Masking: detect, reconcile, tokenize, vault, rewrite.
//!
//! ## Write Ordering
//!
//! Reconciled spans are processed by `start` descending so that replacing one
//! span never shifts the offsets of the spans still to be processed. For each
//! span the vault write is confirmed *before* the placeholder enters the
//! output text. If any write fails the whole mask fails and no text is
//! returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::audit::{record_best_effort, AuditRecorder};
use crate::detect::{DetectionReport, DetectorSet};
use crate::reconcile::SpanReconciler;
use crate::store::VaultBackend;
use crate::types::{
    AuditEvent, AuditOperation, CharOffsets, ContextMap, DetectedSpan, DetectionSource, EntityType,
    ReconciledSpan, Token, VaultEntry,
};
use crate::vault::{VaultError, VaultStore};

/// Risk points contributed by each masked entity.
pub const RISK_PER_ENTITY: f64 = 1.5;
/// Risk score ceiling.
pub const MAX_RISK_SCORE: f64 = 10.0;

/// Risk score for `entity_count` masked entities: `min(1.5 * n, 10.0)`.
pub fn risk_score(entity_count: usize) -> f64 {
    (entity_count as f64 * RISK_PER_ENTITY).min(MAX_RISK_SCORE)
}

/// Error type for mask operations.
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    /// A vault write failed; no masked text was produced.
    #[error("Vault unavailable: {0}")]
    VaultUnavailable(#[from] VaultError),
    /// A span does not fit the input text.
    #[error("Span [{start}, {end}) does not fit text of {len} characters")]
    InvalidSpan {
        /// Span start (characters).
        start: usize,
        /// Span end (characters).
        end: usize,
        /// Text length (characters).
        len: usize,
    },
}

/// One entity in a mask or detect result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedEntity {
    /// Entity type.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Original text of the span.
    pub text: String,
    /// Start (characters, original text).
    pub start: usize,
    /// End (characters, original text).
    pub end: usize,
    /// Detector confidence.
    pub score: f32,
    /// Placeholder written into the masked text; absent for detect-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Detector kind.
    pub source: DetectionSource,
}

/// Result of [`Masker::mask`].
#[derive(Debug, Clone, Serialize)]
pub struct MaskOutcome {
    /// Text with every reconciled span replaced by its placeholder.
    pub masked_text: String,
    /// Masked entities in ascending `start` order.
    pub entities: Vec<MaskedEntity>,
    /// `min(1.5 * entities, 10.0)`.
    pub risk_score: f64,
    /// Detection diagnostics.
    pub report: DetectionReport,
    /// Audit record id, or a sentinel when auditing degraded.
    pub audit_id: String,
}

/// Result of [`Masker::detect`].
#[derive(Debug, Clone, Serialize)]
pub struct DetectOutcome {
    /// Reconciled entities in ascending `start` order.
    pub entities: Vec<MaskedEntity>,
    /// `min(1.5 * entities, 10.0)`.
    pub risk_score: f64,
    /// Detection diagnostics.
    pub report: DetectionReport,
}

/// Orchestrates detection, reconciliation, tokenization and vault writes.
pub struct Masker<B: VaultBackend> {
    detectors: DetectorSet,
    reconciler: SpanReconciler,
    vault: VaultStore<B>,
    audit: Arc<dyn AuditRecorder>,
    audit_timeout: Duration,
}

impl<B: VaultBackend> Masker<B> {
    /// Default audit timeout.
    pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Create a masker.
    pub fn new(
        detectors: DetectorSet,
        reconciler: SpanReconciler,
        vault: VaultStore<B>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            detectors,
            reconciler,
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

    /// Get the vault.
    pub fn vault(&self) -> &VaultStore<B> {
        &self.vault
    }

    /// Get the detectors.
    pub fn detectors(&self) -> &DetectorSet {
        &self.detectors
    }

    /// Detect, reconcile and score without touching the vault.
    pub async fn detect(&self, text: &str) -> DetectOutcome {
        let detection = self.detectors.detect(text).await;
        let mut report = detection.report;
        let reconciled = self.reconciler.reconcile(detection.spans);
        report.final_count = reconciled.len();

        let offsets = CharOffsets::new(text);
        let entities: Vec<MaskedEntity> = reconciled
            .iter()
            .filter_map(|span| {
                let range = offsets.byte_range(span.start, span.end)?;
                Some(entity_for(span, &text[range], None))
            })
            .collect();

        DetectOutcome {
            risk_score: risk_score(entities.len()),
            entities,
            report,
        }
    }

    /// Mask `text` in `session_id`.
    pub async fn mask(&self, session_id: &str, text: &str, context: &ContextMap) -> Result<MaskOutcome, MaskError> {
        let detection = self.detectors.detect(text).await;
        self.mask_detected(session_id, text, detection.spans, detection.report, context)
            .await
    }

    /// Mask `text` using spans detected elsewhere.
    pub async fn mask_spans(
        &self,
        session_id: &str,
        text: &str,
        spans: Vec<DetectedSpan>,
        context: &ContextMap,
    ) -> Result<MaskOutcome, MaskError> {
        let report = DetectionReport {
            total_before_reconcile: spans.len(),
            ..DetectionReport::default()
        };
        self.mask_detected(session_id, text, spans, report, context).await
    }

    async fn mask_detected(
        &self,
        session_id: &str,
        text: &str,
        spans: Vec<DetectedSpan>,
        mut report: DetectionReport,
        context: &ContextMap,
    ) -> Result<MaskOutcome, MaskError> {
        let started = Instant::now();
        let reconciled = self.reconciler.reconcile(spans);
        report.final_count = reconciled.len();

        let offsets = CharOffsets::new(text);
        let ranges = reconciled
            .iter()
            .map(|span| {
                offsets
                    .byte_range(span.start, span.end)
                    .filter(|r| !r.is_empty())
                    .ok_or(MaskError::InvalidSpan {
                        start: span.start,
                        end: span.end,
                        len: offsets.char_len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let entity_types: Vec<String> = reconciled
            .iter()
            .map(|s| s.entity_type.as_str().to_string())
            .collect();

        let ttl = self.vault.default_ttl();
        let created_at = Utc::now();
        let mut masked_text = text.to_string();
        let mut entities = Vec::with_capacity(reconciled.len());

        for (span, range) in reconciled.iter().zip(ranges).rev() {
            let original = &text[range.clone()];
            let token = Token::mint(session_id, &span.entity_type, original);

            let entry = VaultEntry {
                session_id: session_id.to_string(),
                token_id: token.token_id.clone(),
                original_value: original.to_string(),
                entity_type: span.entity_type.clone(),
                detection_source: span.source.as_str().to_string(),
                context: context.clone(),
                created_at,
                ttl_secs: ttl.as_secs(),
            };

            if let Err(e) = self.vault.put(session_id, &token.token_id, &entry, ttl).await {
                error!(
                    session_id = %session_id,
                    entity_type = %span.entity_type,
                    error = %e,
                    "Vault write failed, aborting mask"
                );
                let event = AuditEvent::new(AuditOperation::Mask, session_id, context)
                    .with_entity_types(entity_types.clone())
                    .with_success(false)
                    .with_extra("error", e.to_string());
                record_best_effort(self.audit.as_ref(), &event, self.audit_timeout).await;
                return Err(MaskError::VaultUnavailable(e));
            }

            let placeholder = token.placeholder();
            masked_text.replace_range(range, &placeholder);
            entities.push(entity_for(span, original, Some(placeholder)));
        }
        entities.reverse();

        let risk = risk_score(entities.len());

        let mut event = AuditEvent::new(AuditOperation::Mask, session_id, context)
            .with_entity_types(entity_types)
            .with_extra("risk_score", risk)
            .with_extra("entities_count", entities.len())
            .with_extra("total_before_reconcile", report.total_before_reconcile)
            .with_extra("detection_sources", report.source_counts());
        let degraded = report.degraded();
        if !degraded.is_empty() {
            event = event.with_extra("degraded_detectors", degraded);
        }
        let audit_id = record_best_effort(self.audit.as_ref(), &event, self.audit_timeout).await;

        info!(
            target: "pii_vault::metrics",
            metric_type = "mask",
            session_id = %session_id,
            entity_count = entities.len(),
            risk_score = risk,
            latency_ms = started.elapsed().as_millis() as u64,
            "mask_metric"
        );

        Ok(MaskOutcome {
            masked_text,
            entities,
            risk_score: risk,
            report,
            audit_id,
        })
    }
}

fn entity_for(span: &ReconciledSpan, original: &str, token: Option<String>) -> MaskedEntity {
    MaskedEntity {
        entity_type: span.entity_type.clone(),
        text: original.to_string(),
        start: span.start,
        end: span.end,
        score: span.score,
        token,
        source: span.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditRecorder;
    use crate::cipher::ChaChaCipher;
    use crate::store::InMemoryVaultBackend;
    use crate::types::TokenId;

    fn make_masker() -> (Masker<InMemoryVaultBackend>, Arc<MemoryAuditRecorder>) {
        let vault = VaultStore::new(
            Arc::new(InMemoryVaultBackend::new()),
            Arc::new(ChaChaCipher::new(&[1u8; 32])),
        );
        let audit = Arc::new(MemoryAuditRecorder::default());
        let masker = Masker::new(DetectorSet::new(), SpanReconciler::default(), vault, audit.clone());
        (masker, audit)
    }

    fn span(entity_type: &str, start: usize, end: usize, score: f32) -> DetectedSpan {
        DetectedSpan::new(entity_type, start, end, score, DetectionSource::Statistical)
    }

    #[test]
    fn test_risk_score() {
        assert_eq!(risk_score(0), 0.0);
        assert_eq!(risk_score(3), 4.5);
        assert_eq!(risk_score(6), 9.0);
        assert_eq!(risk_score(7), 10.0);
        assert_eq!(risk_score(100), 10.0);
    }

    #[tokio::test]
    async fn test_mask_rewrites_and_stores() {
        let (masker, audit) = make_masker();
        let text = "Ada lives in Paris";
        let spans = vec![span("PERSON", 0, 3, 0.9), span("LOCATION", 13, 18, 0.8)];

        let outcome = masker.mask_spans("s1", text, spans, &ContextMap::new()).await.unwrap();

        let person = TokenId::mint("s1", &EntityType::new("PERSON"), "Ada");
        let location = TokenId::mint("s1", &EntityType::new("LOCATION"), "Paris");
        assert_eq!(
            outcome.masked_text,
            format!("[PERSON_{}] lives in [LOCATION_{}]", person, location)
        );
        assert_eq!(outcome.entities.len(), 2);
        assert_eq!(outcome.entities[0].text, "Ada");
        assert_eq!(outcome.entities[1].start, 13);
        assert_eq!(outcome.risk_score, 3.0);

        let stored = masker.vault().get("s1", &location).await.unwrap().unwrap();
        assert_eq!(stored.original_value, "Paris");
        assert_eq!(stored.detection_source, "statistical");

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, AuditOperation::Mask);
        assert_eq!(events[0].entity_types, vec!["LOCATION", "PERSON"]);
        assert_eq!(outcome.audit_id, events[0].event_id);
    }

    #[tokio::test]
    async fn test_mask_multibyte_offsets() {
        let (masker, _) = make_masker();
        let text = "Zoë met José";
        let spans = vec![span("PERSON", 0, 3, 0.9), span("PERSON", 8, 12, 0.9)];

        let outcome = masker.mask_spans("s1", text, spans, &ContextMap::new()).await.unwrap();
        assert!(outcome.masked_text.contains(" met "));
        assert_eq!(outcome.entities[0].text, "Zoë");
        assert_eq!(outcome.entities[1].text, "José");
    }

    #[tokio::test]
    async fn test_mask_rejects_out_of_range_span() {
        let (masker, audit) = make_masker();
        let result = masker
            .mask_spans("s1", "short", vec![span("PERSON", 2, 40, 0.9)], &ContextMap::new())
            .await;
        assert!(matches!(result, Err(MaskError::InvalidSpan { len: 5, .. })));
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn test_detect_does_not_write() {
        let (masker, _) = make_masker();
        let outcome = masker.detect("no detectors configured").await;
        assert!(outcome.entities.is_empty());
        assert_eq!(outcome.risk_score, 0.0);
        assert!(masker.vault().backend().is_empty());
    }
}
