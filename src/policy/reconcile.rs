//! Overlap resolution policy for the span reconciler.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::EntityType;

/// High-precision structured entity types.
///
/// Identity numbers, payment cards, emails, phone numbers and
/// jurisdiction-specific identity documents. These win any overlap against a
/// non-structured type regardless of score.
pub const DEFAULT_STRUCTURED_TYPES: &[&str] = &[
    "US_SSN",
    "SSN",
    "CREDIT_CARD",
    "EMAIL_ADDRESS",
    "PHONE_NUMBER",
    "IN_PAN",
    "IN_AADHAAR",
    "IN_PASSPORT",
    "IN_VOTER",
];

/// Reconciliation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    /// Entity types that take precedence in overlaps.
    pub structured_types: BTreeSet<EntityType>,
}

impl ReconcilePolicy {
    /// Create a policy with an explicit structured set.
    pub fn new<I, S>(structured_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            structured_types: structured_types.into_iter().map(EntityType::new).collect(),
        }
    }

    /// Whether `entity_type` is structured under this policy.
    pub fn is_structured(&self, entity_type: &EntityType) -> bool {
        self.structured_types.contains(entity_type)
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STRUCTURED_TYPES.iter().copied())
    }
}
