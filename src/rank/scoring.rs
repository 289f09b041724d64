//! Multi-factor candidate scoring. Every component is deterministic and the
//! total is exactly the sum of the breakdown fields; a candidate missing
//! optional metadata scores zero on the affected components and is never
//! dropped.

use chrono::Utc;
use rust_stemmers::{Algorithm, Stemmer};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::debug;

use super::diversify::diversify;
use super::intent::{detect_intents, table_prior};
use super::noise::is_noisy;
use super::types::{CandidateRecord, MatchTier, RankedCandidate, ScoreBreakdown};
use super::TARGET_RANK;
use crate::config::ConfigSnapshot;
use crate::entity::types::Entity;
use crate::normalize::word_tokens;

pub struct Ranker {
    config: Arc<ConfigSnapshot>,
}

struct CandidateIndex {
    title_lower: String,
    title_tokens: Vec<String>,
    body_tokens: Vec<String>,
    stems: HashSet<String>,
}

impl CandidateIndex {
    fn build(candidate: &CandidateRecord, stemmer: &Stemmer) -> Self {
        let title_tokens = lower_tokens(&candidate.title);
        let body_tokens = lower_tokens(&candidate.search_text);

        let stems = title_tokens
            .iter()
            .chain(body_tokens.iter())
            .map(|t| stemmer.stem(t).to_string())
            .collect();

        CandidateIndex {
            title_lower: candidate.title.to_lowercase(),
            title_tokens,
            body_tokens,
            stems,
        }
    }
}

impl Ranker {
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        Ranker { config }
    }

    /// Score, sort, diversify, and truncate the candidate pool.
    ///
    /// Pure function of (entities, query, pool, configuration): no side
    /// effects, safe to run concurrently and to cache by normalized query
    /// text and configuration version.
    pub fn rank(
        &self,
        entities: &[Entity],
        normalized_query: &str,
        pool: Vec<CandidateRecord>,
        limit: usize,
    ) -> Vec<RankedCandidate> {
        let intents = detect_intents(normalized_query, &self.config.intent_priors);
        let stemmer = Stemmer::create(Algorithm::English);

        let mut ranked: Vec<RankedCandidate> = pool
            .into_iter()
            .map(|candidate| self.score_candidate(entities, &intents, candidate, &stemmer))
            .collect();

        ranked.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });

        debug!(
            target: TARGET_RANK,
            "Ranked {} candidates against {} entities",
            ranked.len(),
            entities.len()
        );

        diversify(ranked, &self.config.caps, limit)
    }

    fn score_candidate(
        &self,
        entities: &[Entity],
        intents: &[String],
        candidate: CandidateRecord,
        stemmer: &Stemmer,
    ) -> RankedCandidate {
        let weights = self.config.ranking;
        let index = CandidateIndex::build(&candidate, stemmer);

        let mut tier = MatchTier::None;
        let mut matched: Vec<&Entity> = Vec::new();

        for entity in entities {
            let strength = self.match_entity(entity, &candidate, &index, stemmer);
            if strength != MatchTier::None {
                tier = tier.max(strength);
                matched.push(entity);
            }
        }

        let mut breakdown = ScoreBreakdown::default();

        breakdown.match_tier = match tier {
            MatchTier::IdentifierExact => weights.tier_identifier,
            MatchTier::TextExact => weights.tier_exact,
            MatchTier::Fuzzy => weights.tier_fuzzy,
            MatchTier::None => 0.0,
        };

        if matched.len() > 1 {
            breakdown.conjunction_bonus = (weights.conjunction_step
                * (matched.len() as f32 - 1.0))
                .min(weights.conjunction_cap);
            breakdown.proximity_bonus = self.proximity_bonus(&matched, &index, stemmer);
        }

        if !matched.is_empty() {
            let mean_confidence: f32 =
                matched.iter().map(|e| e.confidence).sum::<f32>() / matched.len() as f32;
            breakdown.entity_confidence = weights.confidence_weight * mean_confidence;
        }

        breakdown.intent_prior = table_prior(intents, &candidate.table, &self.config.intent_priors);
        breakdown.recency_bonus = self.recency_bonus(&candidate);

        if is_noisy(&candidate.search_text) {
            breakdown.noise_penalty = -weights.noise_penalty;
        }

        RankedCandidate {
            tier,
            breakdown,
            matched_entities: matched.iter().map(|e| e.text.clone()).collect(),
            candidate,
        }
    }

    /// Best match strength between one entity and one candidate.
    fn match_entity(
        &self,
        entity: &Entity,
        candidate: &CandidateRecord,
        index: &CandidateIndex,
        stemmer: &Stemmer,
    ) -> MatchTier {
        let text = entity.text.trim();
        if text.is_empty() {
            return MatchTier::None;
        }

        if candidate.id.eq_ignore_ascii_case(text)
            || candidate
                .identifiers
                .iter()
                .any(|identifier| identifier.trim().eq_ignore_ascii_case(text))
        {
            return MatchTier::IdentifierExact;
        }

        let entity_tokens = lower_tokens(text);
        if contains_phrase(&index.title_tokens, &entity_tokens).is_some()
            || contains_phrase(&index.body_tokens, &entity_tokens).is_some()
        {
            return MatchTier::TextExact;
        }

        let entity_stems: Vec<String> = entity_tokens
            .iter()
            .map(|t| stemmer.stem(t).to_string())
            .collect();
        let stems_contained =
            !entity_stems.is_empty() && entity_stems.iter().all(|s| index.stems.contains(s));

        if stems_contained
            || jaro_winkler(&text.to_lowercase(), &index.title_lower) >= self.config.ranking.fuzzy_floor
        {
            return MatchTier::Fuzzy;
        }

        MatchTier::None
    }

    /// Bonus inversely proportional to the mean token gap between matched
    /// entity occurrences in the candidate's source text.
    fn proximity_bonus(
        &self,
        matched: &[&Entity],
        index: &CandidateIndex,
        stemmer: &Stemmer,
    ) -> f32 {
        let weights = self.config.ranking;

        let mut positions: Vec<usize> = matched
            .iter()
            .filter_map(|entity| {
                let entity_tokens = lower_tokens(&entity.text);
                contains_phrase(&index.body_tokens, &entity_tokens).or_else(|| {
                    // Fall back to the stemmed first token when the exact
                    // phrase does not occur in the body.
                    let first_stem = stemmer.stem(entity_tokens.first()?).to_string();
                    index
                        .body_tokens
                        .iter()
                        .position(|t| stemmer.stem(t) == first_stem)
                })
            })
            .collect();

        if positions.len() < 2 {
            return 0.0;
        }

        positions.sort_unstable();
        let gaps: Vec<f32> = positions
            .windows(2)
            .map(|w| (w[1] - w[0]) as f32)
            .collect();
        let mean_gap = gaps.iter().sum::<f32>() / gaps.len() as f32;

        weights.proximity_cap / (1.0 + mean_gap / weights.proximity_scale)
    }

    /// Small, bounded bonus for recently updated candidates.
    fn recency_bonus(&self, candidate: &CandidateRecord) -> f32 {
        let cap = self.config.ranking.recency_cap;

        let Some(updated_at) = candidate.updated_at else {
            return 0.0;
        };

        let days = (Utc::now() - updated_at).num_days();
        match days {
            d if d < 0 => 0.0,
            0..=7 => cap,
            8..=30 => cap * 0.8,
            31..=90 => cap * 0.6,
            91..=365 => cap * 0.4,
            366..=730 => cap * 0.2,
            _ => 0.0,
        }
    }
}

fn lower_tokens(text: &str) -> Vec<String> {
    word_tokens(text)
        .iter()
        .map(|t| t.text.to_lowercase())
        .collect()
}

/// First index at which `needle` occurs as a contiguous token subsequence of
/// `haystack`.
fn contains_phrase(haystack: &[String], needle: &[String]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=(haystack.len() - needle.len()))
        .find(|&start| (0..needle.len()).all(|k| haystack[start + k] == needle[k]))
}
