//! Detector fan-out.
//!
//! Detectors decide what is PII; this module only runs them. Each detector is
//! bounded by a timeout and a failing detector never fails the whole
//! detection: its absence is recorded in the [`DetectionReport`] and the
//! remaining detectors still contribute.

pub mod pattern;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{CharOffsets, DetectedSpan, DetectionSource};

pub use pattern::PatternDetector;

/// Error type for detector calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DetectorError {
    /// Detector is not reachable or not loaded.
    #[error("Detector unavailable: {0}")]
    Unavailable(String),
    /// Detector failed while processing input.
    #[error("Detector failed: {0}")]
    Failed(String),
    /// Detector configuration is invalid.
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// A PII detector.
///
/// Offsets in returned spans are character offsets into `text`.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable detector name for reports and logs.
    fn name(&self) -> &str;

    /// Kind of detector.
    fn source(&self) -> DetectionSource;

    /// Detect spans in `text`.
    async fn detect(&self, text: &str) -> Result<Vec<DetectedSpan>, DetectorError>;
}

/// Outcome of one detector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    /// Detector returned spans (possibly none).
    Ok,
    /// Detector returned an error.
    Failed,
    /// Detector did not answer in time.
    TimedOut,
}

/// Per-detector diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReport {
    /// Detector name.
    pub name: String,
    /// Detector kind.
    pub source: DetectionSource,
    /// Run outcome.
    pub status: DetectorStatus,
    /// Spans kept from this detector after filtering.
    pub span_count: usize,
}

/// Diagnostics for one detection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// One entry per configured detector, in configuration order.
    pub detectors: Vec<DetectorReport>,
    /// Spans collected across detectors, before reconciliation.
    pub total_before_reconcile: usize,
    /// Spans left after reconciliation.
    pub final_count: usize,
}

impl DetectionReport {
    /// Names of detectors that did not contribute.
    pub fn degraded(&self) -> Vec<&str> {
        self.detectors
            .iter()
            .filter(|d| d.status != DetectorStatus::Ok)
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Span counts per detector source, for audit extras.
    pub fn source_counts(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut counts = serde_json::Map::new();
        for d in &self.detectors {
            let slot = counts
                .entry(d.source.as_str().to_string())
                .or_insert_with(|| serde_json::Value::from(0u64));
            let total = slot.as_u64().unwrap_or(0) + d.span_count as u64;
            *slot = serde_json::Value::from(total);
        }
        counts
    }
}

/// Raw detection output: unreconciled spans plus diagnostics.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Spans from every detector that answered, filtered.
    pub spans: Vec<DetectedSpan>,
    /// Diagnostics. `final_count` is filled in after reconciliation.
    pub report: DetectionReport,
}

/// Ordered set of detectors run over the same text.
#[derive(Clone)]
pub struct DetectorSet {
    detectors: Vec<Arc<dyn Detector>>,
    timeout: Duration,
    min_score: f32,
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSet")
            .field("detectors", &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .field("min_score", &self.min_score)
            .finish()
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorSet {
    /// Default per-detector timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
    /// Default minimum confidence for a span to be kept.
    pub const DEFAULT_MIN_SCORE: f32 = 0.4;

    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            min_score: Self::DEFAULT_MIN_SCORE,
        }
    }

    /// Add a detector.
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Override the per-detector timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the minimum confidence.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Number of configured detectors.
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Whether no detectors are configured.
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector over `text`.
    ///
    /// Detectors run concurrently. Spans below the minimum score or with a
    /// range that does not fit `text` are dropped.
    pub async fn detect(&self, text: &str) -> Detection {
        let started = Instant::now();
        let char_len = CharOffsets::new(text).char_len();

        let runs = self.detectors.iter().map(|detector| async move {
            let outcome = tokio::time::timeout(self.timeout, detector.detect(text)).await;
            (detector, outcome)
        });
        let outcomes = join_all(runs).await;

        let mut spans = Vec::new();
        let mut report = DetectionReport::default();

        for (detector, outcome) in outcomes {
            let (status, found) = match outcome {
                Ok(Ok(found)) => (DetectorStatus::Ok, found),
                Ok(Err(e)) => {
                    warn!(detector = detector.name(), error = %e, "Detector failed, continuing without it");
                    (DetectorStatus::Failed, Vec::new())
                }
                Err(_) => {
                    warn!(
                        detector = detector.name(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Detector timed out, continuing without it"
                    );
                    (DetectorStatus::TimedOut, Vec::new())
                }
            };

            let before = found.len();
            let kept: Vec<DetectedSpan> = found
                .into_iter()
                .filter(|s| s.score >= self.min_score)
                .filter(|s| s.start < s.end && s.end <= char_len)
                .collect();

            if kept.len() < before {
                debug!(
                    detector = detector.name(),
                    dropped = before - kept.len(),
                    "Dropped low-score or out-of-range spans"
                );
            }

            report.detectors.push(DetectorReport {
                name: detector.name().to_string(),
                source: detector.source(),
                status,
                span_count: kept.len(),
            });
            spans.extend(kept);
        }

        report.total_before_reconcile = spans.len();

        debug!(
            detectors = self.detectors.len(),
            spans = spans.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Detection pass complete"
        );

        Detection { spans, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        name: &'static str,
        spans: Vec<DetectedSpan>,
    }

    #[async_trait]
    impl Detector for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn source(&self) -> DetectionSource {
            DetectionSource::Statistical
        }
        async fn detect(&self, _text: &str) -> Result<Vec<DetectedSpan>, DetectorError> {
            Ok(self.spans.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl Detector for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn source(&self) -> DetectionSource {
            DetectionSource::Neural
        }
        async fn detect(&self, _text: &str) -> Result<Vec<DetectedSpan>, DetectorError> {
            Err(DetectorError::Unavailable("model not loaded".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl Detector for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn source(&self) -> DetectionSource {
            DetectionSource::Neural
        }
        async fn detect(&self, _text: &str) -> Result<Vec<DetectedSpan>, DetectorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![DetectedSpan::new("PERSON", 0, 3, 0.9, DetectionSource::Neural)])
        }
    }

    #[tokio::test]
    async fn test_failed_and_slow_detectors_degrade() {
        let set = DetectorSet::new()
            .with_timeout(Duration::from_millis(20))
            .with_detector(Arc::new(Scripted {
                name: "scripted",
                spans: vec![DetectedSpan::new("PERSON", 0, 3, 0.9, DetectionSource::Statistical)],
            }))
            .with_detector(Arc::new(Broken))
            .with_detector(Arc::new(Slow));

        let detection = set.detect("Ada wrote code").await;
        assert_eq!(detection.spans.len(), 1);

        let statuses: Vec<_> = detection.report.detectors.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![DetectorStatus::Ok, DetectorStatus::Failed, DetectorStatus::TimedOut]
        );
        assert_eq!(detection.report.degraded(), vec!["broken", "slow"]);
        assert_eq!(detection.report.total_before_reconcile, 1);
    }

    #[tokio::test]
    async fn test_filters_low_score_and_bad_ranges() {
        let set = DetectorSet::new().with_detector(Arc::new(Scripted {
            name: "scripted",
            spans: vec![
                DetectedSpan::new("PERSON", 0, 3, 0.3, DetectionSource::Statistical),
                DetectedSpan::new("PERSON", 4, 4, 0.9, DetectionSource::Statistical),
                DetectedSpan::new("PERSON", 4, 99, 0.9, DetectionSource::Statistical),
                DetectedSpan::new("LOCATION", 4, 9, 0.4, DetectionSource::Statistical),
            ],
        }));

        let detection = set.detect("Ada wrote").await;
        assert_eq!(detection.spans.len(), 1);
        assert_eq!(detection.spans[0].entity_type.as_str(), "LOCATION");
        assert_eq!(detection.report.detectors[0].span_count, 1);
    }

    #[tokio::test]
    async fn test_empty_set() {
        let detection = DetectorSet::new().detect("anything").await;
        assert!(detection.spans.is_empty());
        assert!(detection.report.detectors.is_empty());
    }

    #[test]
    fn test_source_counts() {
        let report = DetectionReport {
            detectors: vec![
                DetectorReport {
                    name: "a".into(),
                    source: DetectionSource::Rule,
                    status: DetectorStatus::Ok,
                    span_count: 2,
                },
                DetectorReport {
                    name: "b".into(),
                    source: DetectionSource::Rule,
                    status: DetectorStatus::Ok,
                    span_count: 1,
                },
            ],
            total_before_reconcile: 3,
            final_count: 2,
        };
        assert_eq!(report.source_counts()["rule"], 3);
    }
}
