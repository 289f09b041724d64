//! Entity merging: near-duplicate collapse, overlap resolution, and
//! confidence filtering over the union of deterministic and probabilistic
//! entities.

use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::debug;

use super::types::Entity;
use super::TARGET_ENTITY;
use crate::config::ConfigSnapshot;

/// Textual similarity at or above which two same-typed entities are treated
/// as near-duplicates.
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.95;

pub struct EntityMerger {
    config: Arc<ConfigSnapshot>,
}

impl EntityMerger {
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        EntityMerger { config }
    }

    /// Resolve the raw entity union down to the final list.
    ///
    /// Processing order is deterministic (span start, then source priority),
    /// so identical input always produces identical output. The returned
    /// entities are non-overlapping unless overlaps are explicitly permitted
    /// by configuration, and every survivor meets its type's threshold for
    /// its source.
    pub fn merge(&self, mut entities: Vec<Entity>) -> Vec<Entity> {
        entities.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(b.source.priority().cmp(&a.source.priority()))
                .then(a.span.end.cmp(&b.span.end))
                .then(a.text.cmp(&b.text))
        });

        let collapsed = self.collapse_near_duplicates(entities);
        let resolved = if self.config.permit_overlaps {
            collapsed
        } else {
            self.resolve_overlaps(collapsed)
        };

        let mut filtered: Vec<Entity> = resolved
            .into_iter()
            .filter(|e| {
                let threshold = self.config.threshold_for(e.entity_type, e.source);
                if e.confidence < threshold {
                    debug!(
                        target: TARGET_ENTITY,
                        "Dropping {} entity '{}' below threshold ({:.2} < {:.2})",
                        e.entity_type, e.text, e.confidence, threshold
                    );
                    false
                } else {
                    true
                }
            })
            .collect();

        filtered.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(b.source.priority().cmp(&a.source.priority()))
        });

        filtered
    }

    /// Collapse case/whitespace variants of the same text and type down to
    /// the higher-confidence entity, ties broken by longer span.
    fn collapse_near_duplicates(&self, entities: Vec<Entity>) -> Vec<Entity> {
        let mut kept: Vec<Entity> = Vec::new();

        for entity in entities {
            let folded = fold_text(&entity.text);

            let duplicate_of = kept.iter().position(|k| {
                k.entity_type == entity.entity_type
                    && (fold_text(&k.text) == folded
                        || jaro_winkler(&fold_text(&k.text), &folded) >= NEAR_DUPLICATE_SIMILARITY)
            });

            match duplicate_of {
                Some(idx) => {
                    let existing = &kept[idx];
                    let replace = entity.confidence > existing.confidence
                        || (entity.confidence == existing.confidence
                            && entity.span.len() > existing.span.len());
                    if replace {
                        debug!(
                            target: TARGET_ENTITY,
                            "Near-duplicate collapse: '{}' replaces '{}'",
                            entity.text, existing.text
                        );
                        kept[idx] = entity;
                    }
                }
                None => kept.push(entity),
            }
        }

        kept
    }

    /// For each cluster of mutually overlapping spans, keep only the top
    /// scorer by the configured weighted score.
    fn resolve_overlaps(&self, entities: Vec<Entity>) -> Vec<Entity> {
        let mut ordered = entities;
        ordered.sort_by_key(|e| (e.span.start, e.span.end));

        let mut result: Vec<Entity> = Vec::new();
        let mut cluster: Vec<Entity> = Vec::new();
        let mut cluster_end = 0usize;

        for entity in ordered {
            if cluster.is_empty() || entity.span.start < cluster_end {
                cluster_end = cluster_end.max(entity.span.end);
                cluster.push(entity);
            } else {
                result.push(self.pick_cluster_winner(std::mem::take(&mut cluster)));
                cluster_end = entity.span.end;
                cluster.push(entity);
            }
        }
        if !cluster.is_empty() {
            result.push(self.pick_cluster_winner(cluster));
        }

        result
    }

    fn pick_cluster_winner(&self, cluster: Vec<Entity>) -> Entity {
        if cluster.len() == 1 {
            return cluster.into_iter().next().unwrap();
        }

        let weights = self.config.overlap_weights;
        let max_len = cluster.iter().map(|e| e.span.len()).max().unwrap_or(1) as f32;
        let max_precedence = self.config.max_precedence() as f32;

        let score = |e: &Entity| -> f32 {
            weights.confidence * e.confidence
                + weights.span_length * (e.span.len() as f32 / max_len)
                + weights.type_priority
                    * (self.config.precedence_for(e.entity_type) as f32 / max_precedence)
        };

        let mut best: Option<(&Entity, f32)> = None;
        for entity in &cluster {
            let s = score(entity);
            let better = match best {
                None => true,
                Some((current, current_score)) => {
                    if (s - current_score).abs() < 1e-6 {
                        // Tie: type precedence decides, then source priority.
                        let precedence = self.config.precedence_for(entity.entity_type);
                        let current_precedence =
                            self.config.precedence_for(current.entity_type);
                        precedence > current_precedence
                            || (precedence == current_precedence
                                && entity.source.priority() > current.source.priority())
                    } else {
                        s > current_score
                    }
                }
            };
            if better {
                best = Some((entity, s));
            }
        }

        let winner = best.map(|(e, _)| e.clone()).unwrap_or_else(|| cluster[0].clone());
        debug!(
            target: TARGET_ENTITY,
            "Overlap cluster of {} resolved to {} '{}'",
            cluster.len(),
            winner.entity_type,
            winner.text
        );
        winner
    }
}

fn fold_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::types::{EntitySource, EntityType, Span};

    fn entity(
        text: &str,
        entity_type: EntityType,
        span: (usize, usize),
        confidence: f32,
        source: EntitySource,
    ) -> Entity {
        Entity::new(text, entity_type, Span::new(span.0, span.1), confidence, source)
    }

    fn merger() -> EntityMerger {
        EntityMerger::new(Arc::new(ConfigSnapshot::default()))
    }

    #[test]
    fn test_near_duplicate_collapse_keeps_higher_confidence() {
        let merged = merger().merge(vec![
            entity("fuel filter", EntityType::Equipment, (0, 11), 0.95, EntitySource::Gazetteer),
            entity("Fuel  Filter", EntityType::Equipment, (0, 11), 0.60, EntitySource::Probabilistic),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "fuel filter");
        assert_eq!(merged[0].source, EntitySource::Gazetteer);
    }

    #[test]
    fn test_overlap_resolution_prefers_structured_type() {
        // "MTU" inside "MTU-4000-1234": the part number wins the cluster
        let merged = merger().merge(vec![
            entity("MTU", EntityType::Manufacturer, (0, 3), 0.95, EntitySource::Gazetteer),
            entity("MTU-4000-1234", EntityType::PartNumber, (0, 13), 0.98, EntitySource::Pattern),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].entity_type, EntityType::PartNumber);
    }

    #[test]
    fn test_non_overlapping_entities_all_survive() {
        let merged = merger().merge(vec![
            entity("fuel filter", EntityType::Equipment, (0, 11), 0.95, EntitySource::Gazetteer),
            entity("MTU", EntityType::Manufacturer, (12, 15), 0.95, EntitySource::Gazetteer),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_output_has_no_overlaps() {
        let merged = merger().merge(vec![
            entity("critically low inventory", EntityType::StockStatus, (0, 24), 0.95, EntitySource::Gazetteer),
            entity("critical", EntityType::Urgency, (0, 8), 0.95, EntitySource::Gazetteer),
            entity("low", EntityType::Other, (11, 14), 0.60, EntitySource::ProperNoun),
        ]);
        for (i, a) in merged.iter().enumerate() {
            for b in merged.iter().skip(i + 1) {
                assert!(!a.span.overlaps(&b.span));
            }
        }
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].entity_type, EntityType::StockStatus);
    }

    #[test]
    fn test_confidence_filter_is_per_source() {
        // 0.52 passes the 0.5 equipment threshold for deterministic sources
        // but not the 0.55 effective probabilistic threshold
        let merged = merger().merge(vec![
            entity("impeller", EntityType::Equipment, (0, 8), 0.52, EntitySource::Probabilistic),
            entity("gasket", EntityType::Equipment, (10, 16), 0.52, EntitySource::Gazetteer),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "gasket");
    }

    #[test]
    fn test_confidence_monotonicity() {
        let raw = vec![
            entity("impeller", EntityType::Equipment, (0, 8), 0.52, EntitySource::Gazetteer),
            entity("gasket", EntityType::Equipment, (10, 16), 0.72, EntitySource::Gazetteer),
        ];

        let strict = merger().merge(raw.clone());

        let mut relaxed_config = ConfigSnapshot::default();
        relaxed_config.thresholds.insert(EntityType::Equipment, 0.3);
        let relaxed = EntityMerger::new(Arc::new(relaxed_config)).merge(raw);

        // Lowering a threshold only adds entities, never removes any
        for kept in &strict {
            assert!(relaxed.iter().any(|e| e.text == kept.text));
        }
        assert!(relaxed.len() >= strict.len());
    }

    #[test]
    fn test_deterministic_output_order() {
        let input = vec![
            entity("MTU", EntityType::Manufacturer, (12, 15), 0.95, EntitySource::Gazetteer),
            entity("fuel filter", EntityType::Equipment, (0, 11), 0.95, EntitySource::Gazetteer),
        ];
        let a = merger().merge(input.clone());
        let b = merger().merge(input);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.span, y.span);
        }
        assert_eq!(a[0].text, "fuel filter");
    }
}
