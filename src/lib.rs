//! # pii-vault
//!
//! Reversible PII masking with an encrypted, session-scoped vault.
//!
//! Detected personal-data spans are replaced with placeholders of the form
//! `[ENTITY_TYPE_xxxxxxxx]`. The original values are encrypted and stored
//! per session with a time-to-live, and can be revealed again only by roles
//! the access control gate permits.
//!
//! ## Architecture
//!
//! ```text
//! text → DetectorSet → SpanReconciler → Masker ──put──→ VaultStore → VaultBackend
//!                                          ↓                 ↑        (memory / Postgres)
//!                                     masked text            │
//!                                          ↓                get
//!                                 Unmasker (+ Role gate) ────┘
//! ```
//!
//! Every mask and unmask emits one [`AuditEvent`] to an [`AuditRecorder`].
//!
//! ## Guarantees
//!
//! - Same session + entity type + value → same placeholder
//! - Reconciled spans never overlap and are sorted by `start`
//! - A placeholder appears in output only after its vault write succeeded
//! - A denied token is never revealed; its placeholder is left verbatim

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod policy;
pub mod reconcile;
pub mod cipher;
pub mod store;
pub mod vault;
pub mod detect;
pub mod audit;
pub mod masker;
pub mod unmasker;
pub mod config;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    EntityType, DetectionSource, DetectedSpan, ReconciledSpan, CharOffsets,
    Token, TokenId, PlaceholderMatch, scan_placeholders,
    VaultEntry, ContextMap, AuditEvent, AuditOperation,
};
pub use policy::{allow, Role, ReconcilePolicy};
pub use reconcile::{reconcile, SpanReconciler};
pub use cipher::{ChaChaCipher, CipherError, VaultCipher};
pub use store::{VaultBackend, InMemoryVaultBackend};
#[cfg(feature = "postgres")]
pub use store::PostgresVaultBackend;
pub use vault::{VaultStore, VaultError, VaultListing};
pub use detect::{Detector, DetectorError, DetectorSet, DetectionReport, PatternDetector};
pub use audit::{
    AuditRecorder, AuditError, FanoutAuditRecorder, MemoryAuditRecorder, NoOpAuditRecorder, TracingAuditRecorder,
    record_best_effort,
};
pub use masker::{Masker, MaskError, MaskOutcome, MaskedEntity, DetectOutcome, risk_score};
pub use unmasker::{Unmasker, UnmaskError, UnmaskOutcome, RevealedEntity};
pub use config::{ShieldConfig, ConfigError};

#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};
