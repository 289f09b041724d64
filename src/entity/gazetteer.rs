//! Curated term lists and the gazetteer matcher.
//!
//! Built-in terms cover the equipment-maintenance domain; deployments extend
//! them with a JSON overlay file (`SIBYL_GAZETTEER_PATH`). Matching is
//! case-insensitive on word tokens, with stemmed-token equality so singular,
//! plural, and adverbial variants resolve to the same phrase.

use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use tracing::debug;

use super::types::{Entity, EntitySource, EntityType, Span};
use super::TARGET_ENTITY;
use crate::normalize::word_tokens;

/// Base confidence for a gazetteer hit, before the source multiplier.
pub const GAZETTEER_BASE_CONFIDENCE: f32 = 1.0;

lazy_static! {
    static ref EQUIPMENT_TERMS: Vec<&'static str> = vec![
        "fuel filter",
        "oil filter",
        "air filter",
        "fuel pump",
        "fuel injection pump",
        "water pump",
        "sea water pump",
        "coolant pump",
        "injector",
        "turbocharger",
        "heat exchanger",
        "cylinder head",
        "crankshaft",
        "camshaft",
        "alternator",
        "starter motor",
        "exhaust manifold",
        "oil cooler",
        "gasket",
        "impeller",
        "thermostat",
        "glow plug",
        "v-belt",
        "fuel line",
    ];

    static ref MANUFACTURER_TERMS: Vec<&'static str> = vec![
        "mtu",
        "caterpillar",
        "cummins",
        "volvo penta",
        "detroit diesel",
        "john deere",
        "general electric",
        "wartsila",
        "man",
        "yanmar",
        "deutz",
        "perkins",
        "scania",
        "bosch",
        "mahle",
        "mann filter",
        "donaldson",
        "fleetguard",
    ];

    static ref STOCK_STATUS_TERMS: Vec<&'static str> = vec![
        "critically low inventory",
        "critically low",
        "out of stock",
        "in stock",
        "low stock",
        "on backorder",
        "backordered",
        "on order",
        "reserved",
    ];

    static ref URGENCY_TERMS: Vec<&'static str> = vec![
        "critical",
        "urgent",
        "asap",
        "immediately",
        "emergency",
        "high priority",
    ];

    static ref DOC_TYPE_TERMS: Vec<&'static str> = vec![
        "manual",
        "service manual",
        "operation manual",
        "datasheet",
        "service bulletin",
        "parts catalog",
        "wiring diagram",
        "maintenance schedule",
        "installation guide",
        "spec sheet",
    ];
}

/// Built-in gazetteer, keyed by entity type.
pub fn default_gazetteer() -> HashMap<EntityType, Vec<String>> {
    let mut map = HashMap::new();
    map.insert(
        EntityType::Equipment,
        EQUIPMENT_TERMS.iter().map(|s| s.to_string()).collect(),
    );
    map.insert(
        EntityType::Manufacturer,
        MANUFACTURER_TERMS.iter().map(|s| s.to_string()).collect(),
    );
    map.insert(
        EntityType::StockStatus,
        STOCK_STATUS_TERMS.iter().map(|s| s.to_string()).collect(),
    );
    map.insert(
        EntityType::Urgency,
        URGENCY_TERMS.iter().map(|s| s.to_string()).collect(),
    );
    map.insert(
        EntityType::DocType,
        DOC_TYPE_TERMS.iter().map(|s| s.to_string()).collect(),
    );
    map
}

struct GazetteerEntry {
    phrase: String,
    stemmed_tokens: Vec<String>,
    entity_type: EntityType,
    precedence: u8,
}

/// Matches curated phrases against word tokens of the normalized query.
///
/// Phrases are attempted longest first; a span claimed by an earlier match
/// protects it from shorter overlapping matches.
pub struct GazetteerMatcher {
    entries: Vec<GazetteerEntry>,
}

impl GazetteerMatcher {
    pub fn new(
        gazetteer: &HashMap<EntityType, Vec<String>>,
        type_precedence: &HashMap<EntityType, u8>,
    ) -> Self {
        let stemmer = Stemmer::create(Algorithm::English);

        let mut entries: Vec<GazetteerEntry> = gazetteer
            .iter()
            .flat_map(|(&entity_type, terms)| {
                let precedence = *type_precedence.get(&entity_type).unwrap_or(&0);
                terms.iter().map(move |term| (entity_type, precedence, term))
            })
            .map(|(entity_type, precedence, term)| GazetteerEntry {
                phrase: term.to_lowercase(),
                stemmed_tokens: term
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                    .map(|t| stemmer.stem(t).to_string())
                    .collect(),
                entity_type,
                precedence,
            })
            .filter(|entry| !entry.stemmed_tokens.is_empty())
            .collect();

        // Longest phrases first; precedence and phrase text keep the order
        // fully deterministic.
        entries.sort_by(|a, b| {
            b.stemmed_tokens
                .len()
                .cmp(&a.stemmed_tokens.len())
                .then(b.phrase.len().cmp(&a.phrase.len()))
                .then(b.precedence.cmp(&a.precedence))
                .then(a.phrase.cmp(&b.phrase))
        });

        GazetteerMatcher { entries }
    }

    /// Find gazetteer entities in the normalized text. Claimed spans are
    /// appended to `claimed` so later matcher families can treat them as
    /// taken.
    pub fn find_matches(&self, text: &str, claimed: &mut Vec<Span>) -> Vec<Entity> {
        let tokens = word_tokens(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let stemmer = Stemmer::create(Algorithm::English);
        let stemmed: Vec<String> = tokens
            .iter()
            .map(|t| stemmer.stem(&t.text.to_lowercase()).to_string())
            .collect();

        let mut found = Vec::new();

        for entry in &self.entries {
            let width = entry.stemmed_tokens.len();
            if width > tokens.len() {
                continue;
            }

            for window_start in 0..=(tokens.len() - width) {
                let matches = (0..width)
                    .all(|k| stemmed[window_start + k] == entry.stemmed_tokens[k]);
                if !matches {
                    continue;
                }

                let span = Span::new(
                    tokens[window_start].start,
                    tokens[window_start + width - 1].end,
                );
                if claimed.iter().any(|c| c.overlaps(&span)) {
                    debug!(
                        target: TARGET_ENTITY,
                        "Gazetteer match '{}' at {}..{} skipped, span already claimed",
                        entry.phrase, span.start, span.end
                    );
                    continue;
                }

                claimed.push(span);
                found.push(Entity::new(
                    &text[span.start..span.end],
                    entry.entity_type,
                    span,
                    GAZETTEER_BASE_CONFIDENCE,
                    EntitySource::Gazetteer,
                ));
            }
        }

        found
    }
}
