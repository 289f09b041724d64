//! Coverage analysis: decides whether the probabilistic stage is worth its
//! cost for a given query. Purely a cost gate; it never changes what the
//! deterministic stage already found.

use std::fmt;
use tracing::debug;

use super::proper_noun::is_stopword;
use super::types::Entity;
use super::TARGET_ENTITY;
use crate::normalize::word_tokens;

/// Uncovered gaps with at most this many non-stopword tokens are considered
/// low-value when a structured entity already anchors the query.
const LOW_VALUE_GAP_TOKENS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AboveThreshold,
    StructuredAnchor,
    GapOnlyStopwords,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AboveThreshold => write!(f, "coverage_above_threshold"),
            SkipReason::StructuredAnchor => write!(f, "structured_entity_anchored"),
            SkipReason::GapOnlyStopwords => write!(f, "gap_only_stopwords"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageDecision {
    Skip(SkipReason),
    Delegate { gap_text: String },
}

#[derive(Debug, Clone)]
pub struct CoverageReport {
    // Fraction of non-whitespace characters covered by entities, 0.0 to 1.0
    pub coverage: f32,
    pub decision: CoverageDecision,
}

/// Measure how much of the normalized text the deterministic entities
/// explain, and decide whether to delegate the remainder.
pub fn analyze(normalized_text: &str, entities: &[Entity], threshold: f32) -> CoverageReport {
    let mut covered_chars = 0usize;
    let mut total_chars = 0usize;

    for (offset, c) in normalized_text.char_indices() {
        if c.is_whitespace() {
            continue;
        }
        total_chars += 1;
        if entities.iter().any(|e| e.span.contains(offset)) {
            covered_chars += 1;
        }
    }

    let coverage = if total_chars == 0 {
        1.0
    } else {
        covered_chars as f32 / total_chars as f32
    };

    if coverage >= threshold {
        debug!(
            target: TARGET_ENTITY,
            "Coverage {:.2} at or above threshold {:.2}, skipping probabilistic stage",
            coverage, threshold
        );
        return CoverageReport {
            coverage,
            decision: CoverageDecision::Skip(SkipReason::AboveThreshold),
        };
    }

    let gap_text = uncovered_text(normalized_text, entities);
    let gap_tokens = word_tokens(&gap_text);
    let content_tokens = gap_tokens
        .iter()
        .filter(|t| !is_stopword(t.text))
        .count();

    if content_tokens == 0 {
        return CoverageReport {
            coverage,
            decision: CoverageDecision::Skip(SkipReason::GapOnlyStopwords),
        };
    }

    let has_structured_anchor = entities.iter().any(|e| e.entity_type.is_structured());
    if has_structured_anchor && content_tokens <= LOW_VALUE_GAP_TOKENS {
        debug!(
            target: TARGET_ENTITY,
            "Structured entity anchors the query and the gap is low-value ({} tokens)",
            content_tokens
        );
        return CoverageReport {
            coverage,
            decision: CoverageDecision::Skip(SkipReason::StructuredAnchor),
        };
    }

    CoverageReport {
        coverage,
        decision: CoverageDecision::Delegate { gap_text },
    }
}

/// Join the maximal uncovered regions of the text, single-space separated.
fn uncovered_text(normalized_text: &str, entities: &[Entity]) -> String {
    let mut regions: Vec<&str> = Vec::new();
    let mut cursor = 0usize;

    let mut spans: Vec<_> = entities.iter().map(|e| e.span).collect();
    spans.sort_by_key(|s| (s.start, s.end));

    for span in spans {
        if span.start > cursor {
            regions.push(&normalized_text[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < normalized_text.len() {
        regions.push(&normalized_text[cursor..]);
    }

    regions
        .into_iter()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::types::{EntitySource, EntityType, Span};

    fn entity(text: &str, entity_type: EntityType, start: usize, end: usize) -> Entity {
        Entity::new(text, entity_type, Span::new(start, end), 0.9, EntitySource::Gazetteer)
    }

    #[test]
    fn test_full_coverage_skips() {
        let text = "fuel filter";
        let entities = vec![entity("fuel filter", EntityType::Equipment, 0, 11)];
        let report = analyze(text, &entities, 0.9);
        assert!((report.coverage - 1.0).abs() < 1e-6);
        assert_eq!(
            report.decision,
            CoverageDecision::Skip(SkipReason::AboveThreshold)
        );
    }

    #[test]
    fn test_stopword_gap_skips() {
        let text = "fuel filter for the engine";
        // "engine" is covered, "for the" is not
        let entities = vec![
            entity("fuel filter", EntityType::Equipment, 0, 11),
            entity("engine", EntityType::Equipment, 20, 26),
        ];
        let report = analyze(text, &entities, 0.95);
        assert_eq!(
            report.decision,
            CoverageDecision::Skip(SkipReason::GapOnlyStopwords)
        );
    }

    #[test]
    fn test_structured_anchor_skips_small_gap() {
        let text = "MTU-4000-1234 spare housing";
        let entities = vec![entity("MTU-4000-1234", EntityType::PartNumber, 0, 13)];
        let report = analyze(text, &entities, 0.9);
        assert_eq!(
            report.decision,
            CoverageDecision::Skip(SkipReason::StructuredAnchor)
        );
    }

    #[test]
    fn test_delegates_uncovered_gap() {
        let text = "fuel filter compatible with the old housing variant";
        let entities = vec![entity("fuel filter", EntityType::Equipment, 0, 11)];
        let report = analyze(text, &entities, 0.9);
        match report.decision {
            CoverageDecision::Delegate { ref gap_text } => {
                assert_eq!(gap_text, "compatible with the old housing variant");
            }
            ref other => panic!("expected delegation, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_text_counts_as_covered() {
        let report = analyze("", &[], 0.9);
        assert!((report.coverage - 1.0).abs() < 1e-6);
        assert_eq!(
            report.decision,
            CoverageDecision::Skip(SkipReason::AboveThreshold)
        );
    }

    #[test]
    fn test_multiple_gaps_joined() {
        let text = "does fuel filter fit MTU engines";
        let entities = vec![
            entity("fuel filter", EntityType::Equipment, 5, 16),
            entity("MTU", EntityType::Manufacturer, 21, 24),
        ];
        let report = analyze(text, &entities, 0.9);
        match report.decision {
            CoverageDecision::Delegate { ref gap_text } => {
                assert_eq!(gap_text, "does fit engines");
            }
            ref other => panic!("expected delegation, got {:?}", other),
        }
    }
}
