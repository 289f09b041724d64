use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An externally supplied, not-yet-ranked result item.
///
/// Created by the retrieval layer per request, annotated by the ranker,
/// discarded after the response. Never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,

    // Source table this candidate came from (e.g. "manuals", "inventory")
    pub table: String,

    pub title: String,

    // Searchable body text, used for proximity and noise heuristics
    #[serde(default)]
    pub search_text: String,

    // Exact identifiers this record answers to (part numbers, fault codes)
    #[serde(default)]
    pub identifiers: Vec<String>,

    // Parent document, when the candidate is a section of a larger document
    #[serde(default)]
    pub parent_doc: Option<String>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Discrete strength of the best match between a candidate and the entity
/// set. Ordering matters: later variants outrank earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchTier {
    None,
    Fuzzy,
    TextExact,
    IdentifierExact,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTier::None => write!(f, "none"),
            MatchTier::Fuzzy => write!(f, "fuzzy"),
            MatchTier::TextExact => write!(f, "text_exact"),
            MatchTier::IdentifierExact => write!(f, "identifier_exact"),
        }
    }
}

/// Named score components. The candidate's total score is exactly the sum of
/// these fields — nothing else contributes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub match_tier: f32,
    pub conjunction_bonus: f32,
    pub proximity_bonus: f32,
    pub entity_confidence: f32,
    pub intent_prior: f32,
    pub recency_bonus: f32,
    // Stored as a negative contribution
    pub noise_penalty: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.match_tier
            + self.conjunction_bonus
            + self.proximity_bonus
            + self.entity_confidence
            + self.intent_prior
            + self.recency_bonus
            + self.noise_penalty
    }
}

/// A candidate annotated with its score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub candidate: CandidateRecord,
    pub tier: MatchTier,
    pub breakdown: ScoreBreakdown,

    // Texts of the extracted entities this candidate matched
    pub matched_entities: Vec<String>,
}

impl RankedCandidate {
    pub fn score(&self) -> f32 {
        self.breakdown.total()
    }
}
