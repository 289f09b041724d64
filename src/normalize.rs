use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// A word token with its byte offsets into the text it was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Normalize a raw query string.
///
/// Applies, in order: NFKC unicode normalization, quote/apostrophe
/// normalization, whitespace collapsing, and abbreviation expansion from the
/// configuration's expansion map. Case is preserved so the proper-noun
/// detector can still see capitalization.
///
/// Every span produced downstream indexes into the string returned here, not
/// into the raw input. Callers displaying spans must display them against
/// this normalized text.
pub fn normalize_query(raw: &str, expansions: &HashMap<String, String>) -> String {
    let composed: String = raw
        .nfkc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' => '"',
            _ => c,
        })
        .collect();

    composed
        .split_whitespace()
        .map(|token| expand_token(token, expansions))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand a single whitespace-delimited token against the expansion map.
///
/// The token's surrounding punctuation is kept in place; only the core is
/// replaced. Lookup is exact first, then lowercase, so all-caps brand codes
/// ("GE") and lowercase shorthand ("p/n") both resolve.
fn expand_token(token: &str, expansions: &HashMap<String, String>) -> String {
    let core = token.trim_matches(|c: char| ",.;:!?()[]\"'".contains(c));
    if core.is_empty() {
        return token.to_string();
    }

    let replacement = expansions
        .get(core)
        .or_else(|| expansions.get(&core.to_lowercase()));

    match replacement {
        Some(expanded) => token.replacen(core, expanded, 1),
        None => token.to_string(),
    }
}

/// Split text into word tokens (pieces containing at least one alphanumeric
/// character), each carrying its byte offsets.
pub fn word_tokens(text: &str) -> Vec<Token<'_>> {
    text.split_word_bound_indices()
        .filter(|(_, piece)| piece.chars().any(char::is_alphanumeric))
        .map(|(start, piece)| Token {
            text: piece,
            start,
            end: start + piece.len(),
        })
        .collect()
}

/// Locate the first case-insensitive occurrence of `needle` in `haystack`,
/// returning byte offsets into `haystack`.
pub fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let needle_chars: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();

    for (start, _) in haystack.char_indices() {
        let mut matched = 0;
        for (offset, c) in haystack[start..].char_indices() {
            let mut aligned = true;
            for lc in c.to_lowercase() {
                if matched < needle_chars.len() && needle_chars[matched] == lc {
                    matched += 1;
                } else {
                    aligned = false;
                    break;
                }
            }
            if !aligned {
                break;
            }
            if matched == needle_chars.len() {
                return Some((start, start + offset + c.len_utf8()));
            }
        }
    }
    None
}
