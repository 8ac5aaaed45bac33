//! Rule-based structured-entity detector.
//!
//! Each pattern is a `regex-lite` expression with a fixed confidence and an
//! optional checksum validator. Matches are reported in character offsets.

use async_trait::async_trait;
use regex_lite::Regex;

use super::{Detector, DetectorError};
use crate::types::{CharOffsets, DetectedSpan, DetectionSource, EntityType};

/// Post-match validator (checksums, reserved ranges).
pub type Validator = fn(&str) -> bool;

#[derive(Debug, Clone)]
struct Pattern {
    entity_type: EntityType,
    regex: Regex,
    score: f32,
    validate: Option<Validator>,
}

/// Regex pattern detector.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    name: String,
    patterns: Vec<Pattern>,
}

impl PatternDetector {
    /// Create an empty detector.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
        }
    }

    /// Built-in patterns for common structured identifiers.
    pub fn standard() -> Result<Self, DetectorError> {
        Self::new("patterns")
            .with_pattern("EMAIL_ADDRESS", r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}", 1.0, None)?
            .with_pattern(
                "PHONE_NUMBER",
                r"\+\d{1,4}[\s\-]?\(?\d{1,4}\)?[\s\-]?\d{3,4}[\s\-]?\d{3,4}",
                0.6,
                None,
            )?
            .with_pattern("US_SSN", r"\b\d{3}-\d{2}-\d{4}\b", 0.85, Some(valid_ssn))?
            .with_pattern("CREDIT_CARD", r"\b(?:\d[ \-]?){12,18}\d\b", 1.0, Some(luhn_valid))?
            .with_pattern(
                "IP_ADDRESS",
                r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b",
                0.6,
                None,
            )?
            .with_pattern("IN_PAN", r"\b[A-Z]{5}\d{4}[A-Z]\b", 0.85, None)?
            .with_pattern("IN_AADHAAR", r"\b[2-9]\d{3}[ \-]?\d{4}[ \-]?\d{4}\b", 0.75, None)?
            .with_pattern("IN_PASSPORT", r"\b[A-PR-WY][1-9]\d\s?\d{4}[1-9]\b", 0.5, None)?
            .with_pattern("IN_VOTER", r"\b[A-Z]{3}\d{7}\b", 0.5, None)
    }

    /// Add a pattern.
    pub fn with_pattern(
        mut self,
        entity_type: impl Into<EntityType>,
        pattern: &str,
        score: f32,
        validate: Option<Validator>,
    ) -> Result<Self, DetectorError> {
        let regex = Regex::new(pattern)
            .map_err(|e| DetectorError::InvalidConfig(format!("{}: {}", pattern, e)))?;
        self.patterns.push(Pattern {
            entity_type: entity_type.into(),
            regex,
            score,
            validate,
        });
        Ok(self)
    }

    /// Number of configured patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Run every pattern synchronously.
    pub fn find(&self, text: &str) -> Vec<DetectedSpan> {
        let offsets = CharOffsets::new(text);
        let mut spans = Vec::new();

        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                if let Some(validate) = pattern.validate {
                    if !validate(m.as_str()) {
                        continue;
                    }
                }
                let (Some(start), Some(end)) = (offsets.char_index(m.start()), offsets.char_index(m.end())) else {
                    continue;
                };
                spans.push(DetectedSpan::new(
                    pattern.entity_type.clone(),
                    start,
                    end,
                    pattern.score,
                    DetectionSource::Rule,
                ));
            }
        }

        spans
    }
}

#[async_trait]
impl Detector for PatternDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> DetectionSource {
        DetectionSource::Rule
    }

    async fn detect(&self, text: &str) -> Result<Vec<DetectedSpan>, DetectorError> {
        Ok(self.find(text))
    }
}

/// Luhn checksum over the digits of `candidate`.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Reject SSNs in never-issued ranges.
fn valid_ssn(candidate: &str) -> bool {
    let mut parts = candidate.split('-');
    let (Some(area), Some(group), Some(serial)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}
