//! Capitalized-token run detection, the low-confidence fallback for names
//! the gazetteer and pattern rules do not recognize.

use lazy_static::lazy_static;
use std::collections::HashSet;
use tracing::debug;

use super::types::{Entity, EntitySource, EntityType, Span};
use super::TARGET_ENTITY;
use crate::normalize::word_tokens;

/// Base confidence for a proper-noun run, before the source multiplier.
pub const PROPER_NOUN_BASE_CONFIDENCE: f32 = 0.7;

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = [
        "the", "a", "an", "of", "for", "and", "or", "to", "in", "on", "at", "is", "are", "was",
        "were", "be", "been", "with", "by", "from", "as", "that", "this", "these", "those", "it",
        "its", "my", "our", "your", "we", "i", "you", "he", "she", "they", "them", "his", "her",
        "their", "what", "which", "who", "where", "when", "how", "why", "do", "does", "did",
        "have", "has", "had", "can", "could", "should", "would", "will", "shall", "may", "might",
        "must", "me", "us", "need", "show", "find", "get", "give", "list", "all", "any", "some",
        "no", "not", "about", "please",
    ]
    .into_iter()
    .collect();
}

pub(crate) fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token.to_lowercase().as_str())
}

/// Detect runs of capitalized tokens not already claimed by the gazetteer or
/// pattern rules. Runs become low-confidence `Other` entities; the merger and
/// the probabilistic stage refine them later.
pub fn find_matches(text: &str, claimed: &[Span]) -> Vec<Entity> {
    let tokens = word_tokens(text);
    let mut found = Vec::new();

    let mut run: Vec<usize> = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        let span = Span::new(token.start, token.end);
        let qualifies = token.text.chars().next().is_some_and(|c| c.is_uppercase())
            && token.text.len() >= 2
            && !token.text.chars().all(char::is_numeric)
            && !is_stopword(token.text)
            && !claimed.iter().any(|c| c.overlaps(&span));

        // A sentence separator between tokens ends the current run.
        let continues_run = match run.last() {
            Some(&prev_idx) => {
                let gap = &text[tokens[prev_idx].end..token.start];
                !gap.contains(['.', ',', ';', ':', '!', '?'])
            }
            None => true,
        };

        if qualifies && continues_run {
            run.push(idx);
        } else {
            flush_run(text, &tokens, &run, &mut found);
            run.clear();
            if qualifies {
                run.push(idx);
            }
        }
    }
    flush_run(text, &tokens, &run, &mut found);

    found
}

fn flush_run(
    text: &str,
    tokens: &[crate::normalize::Token<'_>],
    run: &[usize],
    found: &mut Vec<Entity>,
) {
    if run.is_empty() {
        return;
    }

    let first = &tokens[run[0]];
    let last = &tokens[run[run.len() - 1]];

    // A lone capitalized token at the start of the query is treated as
    // sentence capitalization unless it is an all-caps acronym.
    if run.len() == 1 {
        let is_acronym = first.text.chars().all(|c| c.is_uppercase() || c.is_numeric());
        if run[0] == 0 && !is_acronym {
            debug!(
                target: TARGET_ENTITY,
                "Skipping query-initial capitalized token '{}'", first.text
            );
            return;
        }
    }

    let span = Span::new(first.start, last.end);
    found.push(Entity::new(
        &text[span.start..span.end],
        EntityType::Other,
        span,
        PROPER_NOUN_BASE_CONFIDENCE,
        EntitySource::ProperNoun,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_unknown_name_run() {
        let found = find_matches("replace the Nordhavn Explorer pump", &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "Nordhavn Explorer");
        assert_eq!(found[0].entity_type, EntityType::Other);
        assert_eq!(found[0].source, EntitySource::ProperNoun);
    }

    #[test]
    fn test_stopwords_break_runs() {
        let found = find_matches("is The Bosch unit available", &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "Bosch");
    }

    #[test]
    fn test_claimed_spans_are_skipped() {
        let claimed = vec![Span::new(0, 11)];
        let found = find_matches("Fuel Filter Deutz", &claimed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "Deutz");
    }

    #[test]
    fn test_query_initial_capital_ignored() {
        assert!(find_matches("Replace the pump", &[]).is_empty());
    }

    #[test]
    fn test_query_initial_acronym_kept() {
        let found = find_matches("MTU parts list", &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "MTU");
    }

    #[test]
    fn test_sentence_boundary_ends_run() {
        let found = find_matches("ask Deutz. Perkins too", &[]);
        let texts: Vec<&str> = found.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Deutz", "Perkins"]);
    }
}
