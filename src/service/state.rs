//! Service state management.
//!
//! Wires the masker, unmasker, vault and audit recorder over one backend.

use std::sync::Arc;

use crate::audit::{AuditRecorder, FanoutAuditRecorder, MemoryAuditRecorder, TracingAuditRecorder};
use crate::config::{ConfigError, ShieldConfig};
use crate::detect::{DetectorSet, PatternDetector};
use crate::masker::Masker;
use crate::reconcile::SpanReconciler;
use crate::store::VaultBackend;
use crate::unmasker::Unmasker;
use crate::vault::VaultStore;

/// Shared service state.
pub struct ServiceState<B: VaultBackend + 'static> {
    /// Masking pipeline.
    pub masker: Arc<Masker<B>>,
    /// Unmasking pipeline.
    pub unmasker: Arc<Unmasker<B>>,
    /// Vault, for administrative listing and health.
    pub vault: VaultStore<B>,
    /// Audit recorder, for the audit endpoint.
    pub audit: Arc<dyn AuditRecorder>,
    /// Backend label reported by health checks.
    pub backend_kind: &'static str,
}

impl<B: VaultBackend + 'static> ServiceState<B> {
    /// Assemble state from prebuilt parts.
    pub fn new(
        masker: Masker<B>,
        unmasker: Unmasker<B>,
        vault: VaultStore<B>,
        audit: Arc<dyn AuditRecorder>,
        backend_kind: &'static str,
    ) -> Self {
        Self {
            masker: Arc::new(masker),
            unmasker: Arc::new(unmasker),
            vault,
            audit,
            backend_kind,
        }
    }

    /// Build state from configuration with the built-in pattern detector.
    ///
    /// Audit events go to the tracing log and to an in-memory ring that
    /// backs the audit endpoint.
    pub fn from_config(
        backend: Arc<B>,
        config: &ShieldConfig,
        backend_kind: &'static str,
    ) -> Result<Self, ConfigError> {
        let vault = VaultStore::new(backend, config.cipher()?)
            .with_default_ttl(config.default_ttl)
            .with_op_timeout(config.vault_timeout);

        let audit: Arc<dyn AuditRecorder> = Arc::new(
            FanoutAuditRecorder::new()
                .with_recorder(Arc::new(MemoryAuditRecorder::new(config.audit_buffer_capacity)))
                .with_recorder(Arc::new(TracingAuditRecorder)),
        );

        let detectors = DetectorSet::new()
            .with_timeout(config.detector_timeout)
            .with_min_score(config.min_detection_score)
            .with_detector(Arc::new(PatternDetector::standard()?));

        let masker = Masker::new(detectors, SpanReconciler::default(), vault.clone(), Arc::clone(&audit))
            .with_audit_timeout(config.audit_timeout);
        let unmasker = Unmasker::new(vault.clone(), Arc::clone(&audit))
            .with_audit_timeout(config.audit_timeout);

        Ok(Self::new(masker, unmasker, vault, audit, backend_kind))
    }
}

impl<B: VaultBackend + 'static> Clone for ServiceState<B> {
    fn clone(&self) -> Self {
        Self {
            masker: Arc::clone(&self.masker),
            unmasker: Arc::clone(&self.unmasker),
            vault: self.vault.clone(),
            audit: Arc::clone(&self.audit),
            backend_kind: self.backend_kind,
        }
    }
}
