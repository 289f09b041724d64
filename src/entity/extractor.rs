//! Deterministic extraction stage: gazetteer, pattern rules, proper-noun
//! fallback, in that order. No I/O; any well-formed text yields a (possibly
//! empty) entity list, never an error.

use std::sync::Arc;
use tracing::debug;

use super::gazetteer::GazetteerMatcher;
use super::types::{Entity, Span};
use super::{patterns, proper_noun, TARGET_ENTITY};
use crate::config::ConfigSnapshot;

pub struct DeterministicExtractor {
    gazetteer: GazetteerMatcher,
    config: Arc<ConfigSnapshot>,
}

impl DeterministicExtractor {
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        let gazetteer = GazetteerMatcher::new(&config.gazetteer, &config.type_precedence);
        DeterministicExtractor { gazetteer, config }
    }

    /// Run the three matcher families against the normalized text.
    ///
    /// Gazetteer and pattern rules each protect their own spans; the
    /// proper-noun fallback skips everything either family claimed. Source
    /// multipliers are applied here so downstream stages see final
    /// confidences.
    pub fn extract(&self, normalized_text: &str) -> Vec<Entity> {
        if normalized_text.trim().is_empty() {
            return Vec::new();
        }

        let mut claimed: Vec<Span> = Vec::new();

        let mut entities = self.gazetteer.find_matches(normalized_text, &mut claimed);
        entities.extend(patterns::find_matches(normalized_text, &mut claimed));
        entities.extend(proper_noun::find_matches(normalized_text, &claimed));

        for entity in &mut entities {
            let multiplier = self.config.multiplier_for(entity.source);
            entity.confidence = (entity.confidence * multiplier).clamp(0.0, 1.0);
        }

        entities.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(b.source.priority().cmp(&a.source.priority()))
                .then(a.span.end.cmp(&b.span.end))
        });

        debug!(
            target: TARGET_ENTITY,
            "Deterministic extraction found {} entities in '{}'",
            entities.len(),
            normalized_text
        );

        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::types::{EntitySource, EntityType};

    fn extractor() -> DeterministicExtractor {
        DeterministicExtractor::new(Arc::new(ConfigSnapshot::default()))
    }

    #[test]
    fn test_mixed_families() {
        let found = extractor().extract("fuel filter MTU-4000-1234 at 3.5 bar");
        let types: Vec<EntityType> = found.iter().map(|e| e.entity_type).collect();
        assert!(types.contains(&EntityType::Equipment));
        assert!(types.contains(&EntityType::PartNumber));
        assert!(types.contains(&EntityType::Measurement));
    }

    #[test]
    fn test_source_multipliers_applied() {
        let found = extractor().extract("fuel filter");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, EntitySource::Gazetteer);
        assert!((found[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_proper_noun_fallback_only_on_unclaimed() {
        let found = extractor().extract("Cummins filter for Nordhavn");
        let cummins = found.iter().find(|e| e.text == "Cummins").unwrap();
        assert_eq!(cummins.source, EntitySource::Gazetteer);
        let nordhavn = found.iter().find(|e| e.text == "Nordhavn").unwrap();
        assert_eq!(nordhavn.source, EntitySource::ProperNoun);
    }

    #[test]
    fn test_sorted_by_span_start() {
        let found = extractor().extract("urgent fuel filter MTU");
        let starts: Vec<usize> = found.iter().map(|e| e.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_never_fails_on_garbage() {
        assert!(extractor().extract("").is_empty());
        assert!(extractor().extract("    ").is_empty());
        let _ = extractor().extract("!@#$%^&*()");
    }
}
