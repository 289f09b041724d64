use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;
use tracing::{debug, info};

use crate::entity::gazetteer::default_gazetteer;
use crate::entity::types::{EntitySource, EntityType};
use crate::environment::get_env_parsed;
use crate::rank::intent::default_intent_priors;
use crate::TARGET_PIPELINE;

// Environment variables pointing at optional JSON overlay files
pub const GAZETTEER_PATH_ENV: &str = "SIBYL_GAZETTEER_PATH";
pub const EXPANSIONS_PATH_ENV: &str = "SIBYL_EXPANSIONS_PATH";
pub const INTENT_PATH_ENV: &str = "SIBYL_INTENT_PATH";

/// Weights for the overlap-resolution score in the entity merger.
#[derive(Debug, Clone, Copy)]
pub struct OverlapWeights {
    pub confidence: f32,
    pub span_length: f32,
    pub type_priority: f32,
}

impl Default for OverlapWeights {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            span_length: 0.3,
            type_priority: 0.2,
        }
    }
}

/// Weights and caps for the ranking score components.
#[derive(Debug, Clone, Copy)]
pub struct RankingWeights {
    pub tier_identifier: f32,
    pub tier_exact: f32,
    pub tier_fuzzy: f32,
    pub conjunction_step: f32,
    pub conjunction_cap: f32,
    pub proximity_cap: f32,
    pub proximity_scale: f32,
    pub confidence_weight: f32,
    pub recency_cap: f32,
    pub noise_penalty: f32,
    pub fuzzy_floor: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            tier_identifier: 40.0,
            tier_exact: 25.0,
            tier_fuzzy: 10.0,
            conjunction_step: 6.0,
            conjunction_cap: 18.0,
            proximity_cap: 10.0,
            proximity_scale: 5.0,
            confidence_weight: 5.0,
            recency_cap: 5.0,
            noise_penalty: 12.0,
            fuzzy_floor: 0.88,
        }
    }
}

/// Hard limits applied during result diversification.
#[derive(Debug, Clone, Copy)]
pub struct DiversityCaps {
    pub per_table: usize,
    pub per_parent_doc: usize,
}

impl Default for DiversityCaps {
    fn default() -> Self {
        Self {
            per_table: 5,
            per_parent_doc: 2,
        }
    }
}

/// Settings for the optional probabilistic extraction call.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(8),
        }
    }
}

/// Immutable, process-lifetime configuration snapshot.
///
/// Constructed once at startup and shared across concurrent pipeline
/// executions behind an `Arc`. Nothing here is mutated during request
/// handling.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    // Per-type minimum confidence to retain an entity after merge
    pub thresholds: HashMap<EntityType, f32>,

    // Added on top of the type threshold for probabilistic-sourced entities
    pub probabilistic_threshold_penalty: f32,

    // Per-source confidence multipliers applied to base match confidence
    pub source_multipliers: HashMap<EntitySource, f32>,

    // Type precedence for overlap tie-breaks, higher outranks
    pub type_precedence: HashMap<EntityType, u8>,

    pub overlap_weights: OverlapWeights,

    // When set, the merger keeps mutually overlapping spans instead of
    // resolving each cluster down to one winner
    pub permit_overlaps: bool,

    // Abbreviation / brand short-form expansion map
    pub expansions: HashMap<String, String>,

    // Curated terms per entity type
    pub gazetteer: HashMap<EntityType, Vec<String>>,

    // Intent keyword -> source table -> score delta
    pub intent_priors: HashMap<String, HashMap<String, f32>>,

    pub ranking: RankingWeights,
    pub caps: DiversityCaps,

    // Deterministic coverage above which the probabilistic stage is skipped
    pub coverage_threshold: f32,

    pub llm: LlmSettings,

    // Version tag, part of the extraction cache key contract
    pub version: String,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert(EntityType::Equipment, 0.5);
        thresholds.insert(EntityType::Manufacturer, 0.5);
        thresholds.insert(EntityType::PartNumber, 0.6);
        thresholds.insert(EntityType::FaultCode, 0.6);
        thresholds.insert(EntityType::Measurement, 0.6);
        thresholds.insert(EntityType::StockStatus, 0.5);
        thresholds.insert(EntityType::Urgency, 0.5);
        thresholds.insert(EntityType::DocType, 0.5);
        thresholds.insert(EntityType::Other, 0.4);

        let mut source_multipliers = HashMap::new();
        source_multipliers.insert(EntitySource::Pattern, 1.0);
        source_multipliers.insert(EntitySource::Gazetteer, 0.95);
        source_multipliers.insert(EntitySource::ProperNoun, 0.85);
        source_multipliers.insert(EntitySource::Probabilistic, 0.70);

        let mut type_precedence = HashMap::new();
        type_precedence.insert(EntityType::PartNumber, 9);
        type_precedence.insert(EntityType::FaultCode, 8);
        type_precedence.insert(EntityType::Measurement, 7);
        type_precedence.insert(EntityType::StockStatus, 6);
        type_precedence.insert(EntityType::Manufacturer, 5);
        type_precedence.insert(EntityType::Equipment, 4);
        type_precedence.insert(EntityType::DocType, 3);
        type_precedence.insert(EntityType::Urgency, 2);
        type_precedence.insert(EntityType::Other, 1);

        Self {
            thresholds,
            probabilistic_threshold_penalty: 0.05,
            source_multipliers,
            type_precedence,
            overlap_weights: OverlapWeights::default(),
            permit_overlaps: false,
            expansions: default_expansions(),
            gazetteer: default_gazetteer(),
            intent_priors: default_intent_priors(),
            ranking: RankingWeights::default(),
            caps: DiversityCaps::default(),
            coverage_threshold: 0.9,
            llm: LlmSettings::default(),
            version: "default".to_string(),
        }
    }
}

impl ConfigSnapshot {
    /// Build the snapshot from defaults, environment overrides, and optional
    /// JSON overlay files.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.coverage_threshold = get_env_parsed("SIBYL_COVERAGE_THRESHOLD", 0.9f32);
        config.probabilistic_threshold_penalty =
            get_env_parsed("SIBYL_PROBABILISTIC_THRESHOLD_PENALTY", 0.05f32);
        config.permit_overlaps = get_env_parsed("SIBYL_PERMIT_OVERLAPS", false);
        config.caps.per_table = get_env_parsed("SIBYL_TABLE_CAP", config.caps.per_table);
        config.caps.per_parent_doc =
            get_env_parsed("SIBYL_PARENT_DOC_CAP", config.caps.per_parent_doc);
        config.llm.model =
            env::var("SIBYL_LLM_MODEL").unwrap_or_else(|_| config.llm.model.clone());
        config.llm.temperature = get_env_parsed("SIBYL_LLM_TEMPERATURE", 0.0f32);
        config.llm.timeout =
            Duration::from_secs(get_env_parsed("SIBYL_LLM_TIMEOUT_SECONDS", 8u64));
        config.version =
            env::var("SIBYL_CONFIG_VERSION").unwrap_or_else(|_| config.version.clone());

        if let Ok(path) = env::var(GAZETTEER_PATH_ENV) {
            let overlay = load_gazetteer_file(&path)
                .with_context(|| format!("failed to load gazetteer overlay from {}", path))?;
            for (entity_type, terms) in overlay {
                config
                    .gazetteer
                    .entry(entity_type)
                    .or_default()
                    .extend(terms);
            }
            info!(target: TARGET_PIPELINE, "Loaded gazetteer overlay from {}", path);
        }

        if let Ok(path) = env::var(EXPANSIONS_PATH_ENV) {
            let overlay: HashMap<String, String> = load_json_file(&path)
                .with_context(|| format!("failed to load expansion overlay from {}", path))?;
            config.expansions.extend(overlay);
            info!(target: TARGET_PIPELINE, "Loaded expansion overlay from {}", path);
        }

        if let Ok(path) = env::var(INTENT_PATH_ENV) {
            let overlay: HashMap<String, HashMap<String, f32>> = load_json_file(&path)
                .with_context(|| format!("failed to load intent overlay from {}", path))?;
            config.intent_priors.extend(overlay);
            info!(target: TARGET_PIPELINE, "Loaded intent overlay from {}", path);
        }

        debug!(
            target: TARGET_PIPELINE,
            "Configuration snapshot ready: version={}, coverage_threshold={:.2}, table_cap={}",
            config.version, config.coverage_threshold, config.caps.per_table
        );

        Ok(config)
    }

    /// Minimum confidence required to retain an entity of this type from
    /// this source.
    pub fn threshold_for(&self, entity_type: EntityType, source: EntitySource) -> f32 {
        let base = *self.thresholds.get(&entity_type).unwrap_or(&0.5);
        if source == EntitySource::Probabilistic {
            base + self.probabilistic_threshold_penalty
        } else {
            base
        }
    }

    pub fn multiplier_for(&self, source: EntitySource) -> f32 {
        *self.source_multipliers.get(&source).unwrap_or(&1.0)
    }

    pub fn precedence_for(&self, entity_type: EntityType) -> u8 {
        *self.type_precedence.get(&entity_type).unwrap_or(&0)
    }

    pub fn max_precedence(&self) -> u8 {
        self.type_precedence.values().copied().max().unwrap_or(1)
    }
}

/// Default abbreviation and brand short-form expansions.
fn default_expansions() -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("GE".to_string(), "General Electric".to_string());
    map.insert("DD".to_string(), "Detroit Diesel".to_string());
    map.insert("CAT".to_string(), "Caterpillar".to_string());
    map.insert("JD".to_string(), "John Deere".to_string());
    map.insert("p/n".to_string(), "part number".to_string());
    map.insert("s/n".to_string(), "serial number".to_string());
    map.insert("w/o".to_string(), "work order".to_string());
    map.insert("qty".to_string(), "quantity".to_string());
    map.insert("mfr".to_string(), "manufacturer".to_string());
    map.insert("maint".to_string(), "maintenance".to_string());
    map
}

#[derive(Deserialize)]
struct GazetteerFile(HashMap<String, Vec<String>>);

fn load_gazetteer_file(path: &str) -> Result<HashMap<EntityType, Vec<String>>> {
    let GazetteerFile(raw) = load_json_file(path)?;
    Ok(raw
        .into_iter()
        .map(|(type_name, terms)| (EntityType::from(type_name.as_str()), terms))
        .collect())
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let config = ConfigSnapshot::default();
        assert!(config.gazetteer.contains_key(&EntityType::Equipment));
        assert_eq!(config.multiplier_for(EntitySource::Pattern), 1.0);
        assert!(config.multiplier_for(EntitySource::Probabilistic) < 0.8);
        assert_eq!(config.max_precedence(), 9);
    }

    #[test]
    fn test_probabilistic_threshold_penalty() {
        let config = ConfigSnapshot::default();
        let deterministic = config.threshold_for(EntityType::Equipment, EntitySource::Gazetteer);
        let probabilistic =
            config.threshold_for(EntityType::Equipment, EntitySource::Probabilistic);
        assert!(probabilistic > deterministic);
    }

    #[test]
    fn test_expansions_include_brand_codes() {
        let expansions = default_expansions();
        assert_eq!(expansions.get("GE").unwrap(), "General Electric");
        assert_eq!(expansions.get("p/n").unwrap(), "part number");
    }
}
