//! Adapter boundary for the external language-understanding service.
//!
//! Every failure mode — timeout, transport error, malformed response — is
//! downgraded to an explicit outcome with a reason code. Nothing here can
//! fail the pipeline.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};

use super::types::{Entity, EntitySource, EntityType, Span};
use super::TARGET_ENTITY;
use crate::config::ConfigSnapshot;
use crate::llm::generate_llm_response;
use crate::normalize::find_case_insensitive;
use crate::prompt::gap_extraction_prompt;
use crate::LLMParams;

/// Entity-type description handed to the language-understanding service.
#[derive(Debug, Clone)]
pub struct TypeDescription {
    pub name: String,
    pub description: String,
}

/// Descriptions for every supported entity type.
pub fn supported_types() -> Vec<TypeDescription> {
    EntityType::ALL
        .iter()
        .map(|t| TypeDescription {
            name: t.to_string(),
            description: t.description().to_string(),
        })
        .collect()
}

/// An entity as returned by the service, before span anchoring and
/// confidence discounting.
#[derive(Debug, Clone, Deserialize)]
pub struct GapEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Transport,
    MalformedResponse,
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Transport => write!(f, "transport"),
            FailureReason::MalformedResponse => write!(f, "malformed_response"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a gap extraction call. Callers branch explicitly; there is no
/// error to propagate.
#[derive(Debug, Clone)]
pub enum GapOutcome {
    Found(Vec<GapEntity>),
    Empty,
    Failed(FailureReason),
}

/// The external collaborator boundary for probabilistic extraction.
#[async_trait]
pub trait GapExtractor: Send + Sync {
    async fn extract(&self, gap_text: &str, supported_types: &[TypeDescription]) -> GapOutcome;
}

/// Production extractor backed by an LLM.
pub struct LlmGapExtractor {
    params: LLMParams,
}

impl LlmGapExtractor {
    pub fn new(params: LLMParams) -> Self {
        LlmGapExtractor { params }
    }
}

#[async_trait]
impl GapExtractor for LlmGapExtractor {
    async fn extract(&self, gap_text: &str, supported_types: &[TypeDescription]) -> GapOutcome {
        if gap_text.trim().is_empty() {
            return GapOutcome::Empty;
        }

        let prompt = gap_extraction_prompt(gap_text, supported_types);
        match generate_llm_response(&prompt, &self.params).await {
            Some(response) => parse_gap_response(&response),
            None => GapOutcome::Failed(FailureReason::Transport),
        }
    }
}

#[derive(Deserialize)]
struct GapResponse {
    entities: Vec<GapEntity>,
}

// Show up to 200 chars to avoid giant logs
fn truncate_for_log(raw: &str) -> String {
    raw.chars().take(200).collect()
}

/// Parse the service response, tolerating markdown fences and surrounding
/// prose around the JSON object.
pub fn parse_gap_response(raw: &str) -> GapOutcome {
    let body = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            warn!(
                target: TARGET_ENTITY,
                "Gap extraction response contains no JSON object: {}",
                truncate_for_log(raw)
            );
            return GapOutcome::Failed(FailureReason::MalformedResponse);
        }
    };

    let parsed: GapResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                target: TARGET_ENTITY,
                "Failed to parse gap extraction response: {}. Raw: {}",
                e,
                truncate_for_log(body)
            );
            return GapOutcome::Failed(FailureReason::MalformedResponse);
        }
    };

    let entities: Vec<GapEntity> = parsed
        .entities
        .into_iter()
        .filter(|e| !e.text.trim().is_empty())
        .map(|mut e| {
            e.confidence = e.confidence.clamp(0.0, 1.0);
            e
        })
        .collect();

    if entities.is_empty() {
        GapOutcome::Empty
    } else {
        GapOutcome::Found(entities)
    }
}

/// Anchor raw gap entities to spans in the normalized query text and apply
/// the probabilistic source multiplier. Entities whose text cannot be found
/// in the normalized text are dropped — every retained entity must carry a
/// valid span.
pub fn anchor_gap_entities(
    normalized_text: &str,
    raw: Vec<GapEntity>,
    config: &ConfigSnapshot,
) -> Vec<Entity> {
    let multiplier = config.multiplier_for(EntitySource::Probabilistic);

    raw.into_iter()
        .filter_map(|gap_entity| {
            match find_case_insensitive(normalized_text, gap_entity.text.trim()) {
                Some((start, end)) => Some(Entity::new(
                    &normalized_text[start..end],
                    EntityType::from(gap_entity.entity_type.as_str()),
                    Span::new(start, end),
                    (gap_entity.confidence * multiplier).clamp(0.0, 1.0),
                    EntitySource::Probabilistic,
                )),
                None => {
                    debug!(
                        target: TARGET_ENTITY,
                        "Dropping unanchorable gap entity '{}'", gap_entity.text
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_response() {
        let raw = r#"{"entities": [{"text": "housing", "type": "EQUIPMENT", "confidence": 0.8}]}"#;
        match parse_gap_response(raw) {
            GapOutcome::Found(entities) => {
                assert_eq!(entities.len(), 1);
                assert_eq!(entities[0].text, "housing");
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_fenced_response() {
        let raw = "```json\n{\"entities\": [{\"text\": \"housing\", \"type\": \"EQUIPMENT\", \"confidence\": 0.8}]}\n```";
        assert!(matches!(parse_gap_response(raw), GapOutcome::Found(_)));
    }

    #[test]
    fn test_parse_empty_entities() {
        assert!(matches!(
            parse_gap_response(r#"{"entities": []}"#),
            GapOutcome::Empty
        ));
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        assert!(matches!(
            parse_gap_response("I could not find any entities, sorry!"),
            GapOutcome::Failed(FailureReason::MalformedResponse)
        ));
        assert!(matches!(
            parse_gap_response("{not json}"),
            GapOutcome::Failed(FailureReason::MalformedResponse)
        ));
    }

    #[test]
    fn test_confidence_clamped() {
        let raw = r#"{"entities": [{"text": "housing", "type": "EQUIPMENT", "confidence": 3.0}]}"#;
        match parse_gap_response(raw) {
            GapOutcome::Found(entities) => assert_eq!(entities[0].confidence, 1.0),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_anchoring_discounts_confidence() {
        let config = ConfigSnapshot::default();
        let anchored = anchor_gap_entities(
            "spare housing for pump",
            vec![GapEntity {
                text: "housing".to_string(),
                entity_type: "EQUIPMENT".to_string(),
                confidence: 1.0,
            }],
            &config,
        );
        assert_eq!(anchored.len(), 1);
        assert_eq!(anchored[0].span, Span::new(6, 13));
        assert_eq!(anchored[0].source, EntitySource::Probabilistic);
        assert!((anchored[0].confidence - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_unanchorable_entity_dropped() {
        let config = ConfigSnapshot::default();
        let anchored = anchor_gap_entities(
            "spare housing",
            vec![GapEntity {
                text: "impeller".to_string(),
                entity_type: "EQUIPMENT".to_string(),
                confidence: 0.9,
            }],
            &config,
        );
        assert!(anchored.is_empty());
    }

    #[test]
    fn test_unknown_type_maps_to_other() {
        let config = ConfigSnapshot::default();
        let anchored = anchor_gap_entities(
            "the flux capacitor",
            vec![GapEntity {
                text: "flux capacitor".to_string(),
                entity_type: "GADGET".to_string(),
                confidence: 0.9,
            }],
            &config,
        );
        assert_eq!(anchored[0].entity_type, EntityType::Other);
    }
}
