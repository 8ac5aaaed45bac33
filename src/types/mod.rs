//! Core types for the PII vault.

pub mod span;
pub mod token;
pub mod entry;
pub mod audit;

pub use span::{EntityType, DetectionSource, DetectedSpan, ReconciledSpan, CharOffsets};
pub use token::{Token, TokenId, PlaceholderMatch, scan_placeholders, TOKEN_ID_LEN};
pub use entry::{VaultEntry, ContextMap, context_str};
pub use audit::{AuditEvent, AuditOperation};
