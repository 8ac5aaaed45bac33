//! Detected and reconciled spans.
//!
//! Offsets are **character** offsets over the original text, half-open
//! (`[start, end)`). Use [`CharOffsets`] to map them onto byte offsets
//! before slicing a `str`.

use serde::{Deserialize, Serialize};

/// Canonical entity type label (upper snake case, `[A-Z0-9_]`).
///
/// Labels are normalized on construction so that every placeholder minted
/// from an `EntityType` re-parses through the placeholder scanner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Create an entity type, normalizing to upper snake case.
    ///
    /// Lowercase ASCII letters are upper-cased and every character outside
    /// `[A-Z0-9_]` becomes `_`. An empty label becomes `UNKNOWN`.
    pub fn new(label: impl AsRef<str>) -> Self {
        let normalized: String = label
            .as_ref()
            .trim()
            .chars()
            .map(|c| {
                let c = c.to_ascii_uppercase();
                if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if normalized.is_empty() {
            Self("UNKNOWN".to_string())
        } else {
            Self(normalized)
        }
    }

    /// Get the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityType {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Which kind of detector produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Rule/pattern based structured-entity recognizer.
    #[default]
    Rule,
    /// General statistical entity recognizer.
    Statistical,
    /// Remote neural NER fallback.
    Neural,
}

impl DetectionSource {
    /// Stable string form, stored in vault entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Statistical => "statistical",
            Self::Neural => "neural",
        }
    }
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed span produced by one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSpan {
    /// Entity type label.
    pub entity_type: EntityType,
    /// Inclusive start (character offset).
    pub start: usize,
    /// Exclusive end (character offset).
    pub end: usize,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    /// Detector kind that produced the span.
    pub source: DetectionSource,
}

/// Output of the reconciler: same shape, pairwise non-overlapping within a set.
pub type ReconciledSpan = DetectedSpan;

impl DetectedSpan {
    /// Create a span. The score is clamped into `[0, 1]`.
    pub fn new(
        entity_type: impl Into<EntityType>,
        start: usize,
        end: usize,
        score: f32,
        source: DetectionSource,
    ) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self {
            entity_type: entity_type.into(),
            start,
            end,
            score,
            source,
        }
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// True when the span covers no characters.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Half-open overlap test. Touching spans do not overlap.
    pub fn overlaps(&self, other: &DetectedSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Character → byte offset table for one text.
#[derive(Debug, Clone)]
pub struct CharOffsets {
    /// Byte offset of every char boundary, including the final `text.len()`.
    boundaries: Vec<usize>,
}

impl CharOffsets {
    /// Build the table for `text`.
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Number of characters in the text.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Byte offset of character index `char_idx`, if in range.
    pub fn byte_offset(&self, char_idx: usize) -> Option<usize> {
        self.boundaries.get(char_idx).copied()
    }

    /// Character index for a byte offset that lies on a char boundary.
    pub fn char_index(&self, byte_offset: usize) -> Option<usize> {
        self.boundaries.binary_search(&byte_offset).ok()
    }

    /// Byte range for a character span, if the span fits the text.
    pub fn byte_range(&self, start: usize, end: usize) -> Option<std::ops::Range<usize>> {
        if start > end {
            return None;
        }
        Some(self.byte_offset(start)?..self.byte_offset(end)?)
    }
}
