//! Intent keyword detection and the keyword-to-domain prior table. A
//! lightweight deterministic routing heuristic, not a learned model.

use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use tracing::debug;

use super::TARGET_RANK;
use crate::normalize::word_tokens;

lazy_static! {
    static ref DEFAULT_PRIORS: HashMap<String, HashMap<String, f32>> = {
        let mut map: HashMap<String, HashMap<String, f32>> = HashMap::new();

        let mut add = |keyword: &str, deltas: &[(&str, f32)]| {
            map.insert(
                keyword.to_string(),
                deltas
                    .iter()
                    .map(|(table, delta)| (table.to_string(), *delta))
                    .collect(),
            );
        };

        add("manual", &[("manuals", 8.0), ("inventory", -2.0)]);
        add("install", &[("manuals", 6.0)]);
        add("installation", &[("manuals", 6.0)]);
        add("procedure", &[("manuals", 5.0)]);
        add("torque", &[("manuals", 4.0)]);
        add("diagram", &[("manuals", 5.0)]);
        add("troubleshoot", &[("faults", 6.0), ("manuals", 3.0)]);

        add("stock", &[("inventory", 8.0), ("manuals", -2.0)]);
        add("inventory", &[("inventory", 8.0)]);
        add("quantity", &[("inventory", 5.0)]);
        add("available", &[("inventory", 5.0)]);
        add("order", &[("inventory", 4.0), ("suppliers", 4.0)]);
        add("price", &[("suppliers", 6.0)]);
        add("supplier", &[("suppliers", 8.0)]);
        add("vendor", &[("suppliers", 8.0)]);

        add("fault", &[("faults", 8.0)]);
        add("error", &[("faults", 6.0)]);
        add("alarm", &[("faults", 6.0)]);
        add("failure", &[("faults", 5.0)]);

        map
    };
}

/// Built-in intent prior table, overridable via `SIBYL_INTENT_PATH`.
pub fn default_intent_priors() -> HashMap<String, HashMap<String, f32>> {
    DEFAULT_PRIORS.clone()
}

/// Detect intent keywords in the normalized query. Tokens are compared by
/// stemmed form so "manuals" hits the "manual" keyword.
pub fn detect_intents(
    normalized_text: &str,
    priors: &HashMap<String, HashMap<String, f32>>,
) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);

    let mut keywords: Vec<&String> = priors.keys().collect();
    keywords.sort();

    let mut stemmed_keywords: HashMap<String, &String> = HashMap::new();
    for keyword in keywords {
        stemmed_keywords
            .entry(stemmer.stem(&keyword.to_lowercase()).to_string())
            .or_insert(keyword);
    }

    let mut detected: Vec<String> = word_tokens(normalized_text)
        .iter()
        .filter_map(|token| {
            let stem = stemmer.stem(&token.text.to_lowercase()).to_string();
            stemmed_keywords.get(&stem).map(|k| (*k).clone())
        })
        .collect();

    detected.sort();
    detected.dedup();

    if !detected.is_empty() {
        debug!(target: TARGET_RANK, "Detected intent keywords: {:?}", detected);
    }

    detected
}

/// Sum of prior deltas for a candidate's source table given the detected
/// intent keywords, clamped to a bounded contribution.
pub fn table_prior(
    intents: &[String],
    table: &str,
    priors: &HashMap<String, HashMap<String, f32>>,
) -> f32 {
    let sum: f32 = intents
        .iter()
        .filter_map(|keyword| priors.get(keyword))
        .filter_map(|deltas| deltas.get(table))
        .sum();

    sum.clamp(-10.0, 10.0)
}
