//! Span reconciliation.
//!
//! Merges the output of several independent detectors into one ordered,
//! non-overlapping span list.
//!
//! ## Algorithm
//!
//! 1. Sort spans by `start` (ties: longer first, then entity type, source,
//!    higher score; the sort is stable so fully identical spans keep input order)
//! 2. Sweep left to right with a single running candidate:
//!    - `next.start >= current.end`: commit `current`, `current = next`
//!    - otherwise resolve the overlap, first decisive rule wins:
//!      a. a structured type beats a non-structured type regardless of score
//!      b. higher score wins
//!      c. longer span wins on an exact score tie
//!    - the loser is discarded whole (never trimmed or split)
//! 3. Commit the final candidate
//!
//! ## Guarantees
//!
//! - Output spans are pairwise non-overlapping (`a.end <= b.start || b.end <= a.start`)
//! - Output is sorted by `start`
//! - Output does not depend on input order

use std::cmp::Ordering;

use crate::policy::ReconcilePolicy;
use crate::types::{DetectedSpan, ReconciledSpan};

/// Span reconciler bound to a precedence policy.
#[derive(Debug, Clone, Default)]
pub struct SpanReconciler {
    policy: ReconcilePolicy,
}

impl SpanReconciler {
    /// Create a reconciler with the given policy.
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    /// Get the policy.
    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Reconcile spans into a sorted, non-overlapping list.
    pub fn reconcile(&self, mut spans: Vec<DetectedSpan>) -> Vec<ReconciledSpan> {
        if spans.len() <= 1 {
            return spans;
        }

        spans.sort_by(sweep_order);

        let mut merged = Vec::with_capacity(spans.len());
        let mut iter = spans.into_iter();
        let Some(mut current) = iter.next() else {
            return merged;
        };

        for next in iter {
            if next.start >= current.end {
                merged.push(std::mem::replace(&mut current, next));
            } else if self.next_wins(&current, &next) {
                current = next;
            }
        }

        merged.push(current);
        merged
    }

    /// Overlap tie-break: does `next` replace `current`?
    fn next_wins(&self, current: &DetectedSpan, next: &DetectedSpan) -> bool {
        let current_structured = self.policy.is_structured(&current.entity_type);
        let next_structured = self.policy.is_structured(&next.entity_type);
        if current_structured != next_structured {
            return next_structured;
        }

        if next.score != current.score {
            return next.score > current.score;
        }

        next.len() > current.len()
    }
}

/// Reconcile with the default structured-type policy.
pub fn reconcile(spans: Vec<DetectedSpan>) -> Vec<ReconciledSpan> {
    SpanReconciler::default().reconcile(spans)
}

fn sweep_order(a: &DetectedSpan, b: &DetectedSpan) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.end.cmp(&a.end))
        .then_with(|| a.entity_type.cmp(&b.entity_type))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| b.score.total_cmp(&a.score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectionSource;

    fn span(t: &str, start: usize, end: usize, score: f32) -> DetectedSpan {
        DetectedSpan::new(t, start, end, score, DetectionSource::Statistical)
    }

    fn types(spans: &[ReconciledSpan]) -> Vec<&str> {
        spans.iter().map(|s| s.entity_type.as_str()).collect()
    }

    #[test]
    fn test_empty_and_single() {
        assert!(reconcile(vec![]).is_empty());
        let one = vec![span("PERSON", 3, 8, 0.7)];
        assert_eq!(reconcile(one.clone()), one);
    }

    #[test]
    fn test_disjoint_spans_sorted() {
        let out = reconcile(vec![
            span("LOCATION", 20, 26, 0.8),
            span("PERSON", 0, 5, 0.9),
        ]);
        assert_eq!(types(&out), vec!["PERSON", "LOCATION"]);
    }

    #[test]
    fn test_touching_spans_both_survive() {
        let out = reconcile(vec![span("PERSON", 0, 5, 0.9), span("LOCATION", 5, 9, 0.4)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_structured_beats_higher_score() {
        let out = reconcile(vec![
            span("ORGANIZATION", 0, 10, 0.95),
            span("IN_PAN", 0, 10, 0.5),
        ]);
        assert_eq!(types(&out), vec!["IN_PAN"]);

        // Regardless of which one comes first in the sweep
        let out = reconcile(vec![
            span("CREDIT_CARD", 4, 20, 0.5),
            span("NRP", 2, 22, 0.95),
        ]);
        assert_eq!(types(&out), vec!["CREDIT_CARD"]);
    }

    #[test]
    fn test_higher_score_wins_between_unstructured() {
        let out = reconcile(vec![span("PERSON", 0, 8, 0.6), span("LOCATION", 4, 12, 0.85)]);
        assert_eq!(types(&out), vec!["LOCATION"]);
    }

    #[test]
    fn test_higher_score_wins_between_structured() {
        let out = reconcile(vec![
            span("PHONE_NUMBER", 0, 12, 0.6),
            span("IN_AADHAAR", 0, 14, 0.9),
        ]);
        assert_eq!(types(&out), vec!["IN_AADHAAR"]);
    }

    #[test]
    fn test_longer_wins_on_score_tie() {
        let out = reconcile(vec![span("PERSON", 0, 4, 0.8), span("PERSON", 2, 12, 0.8)]);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (2, 12));
    }

    #[test]
    fn test_containment_loser_discarded_whole() {
        let out = reconcile(vec![span("LOCATION", 0, 20, 0.9), span("PERSON", 5, 9, 0.7)]);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (0, 20));
    }

    #[test]
    fn test_input_order_independent() {
        let spans = vec![
            span("PERSON", 0, 6, 0.8),
            span("ORGANIZATION", 3, 10, 0.8),
            span("EMAIL_ADDRESS", 9, 25, 0.5),
            span("URL", 14, 25, 0.99),
            span("LOCATION", 30, 35, 0.4),
        ];
        let forward = reconcile(spans.clone());
        let mut reversed = spans;
        reversed.reverse();
        assert_eq!(forward, reconcile(reversed));
        // PERSON loses to the longer ORGANIZATION, which then loses to the
        // structured EMAIL_ADDRESS; URL cannot displace it.
        assert_eq!(types(&forward), vec!["EMAIL_ADDRESS", "LOCATION"]);
    }

    #[test]
    fn test_custom_policy() {
        let reconciler = SpanReconciler::new(ReconcilePolicy::new(["PERSON"]));
        let out = reconciler.reconcile(vec![
            span("PERSON", 0, 5, 0.1),
            span("EMAIL_ADDRESS", 0, 5, 0.99),
        ]);
        assert_eq!(types(&out), vec!["PERSON"]);
    }
}
