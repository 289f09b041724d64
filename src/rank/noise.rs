//! Heuristic markers for low-value boilerplate candidates: tables of
//! contents, index pages, generic procedural filler.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static NUMBERED_STUB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+(?:\.\d+)*[\s.)]").unwrap());

/// Names of the noise markers that fire on the given text.
pub fn noise_markers(text: &str) -> Vec<&'static str> {
    let mut markers = Vec::new();

    if text.to_lowercase().contains("table of contents") {
        markers.push("toc_heading");
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() >= 5 {
        let dotted = lines.iter().filter(|l| l.contains("....")).count();
        if dotted as f32 / lines.len() as f32 >= 0.3 {
            markers.push("dotted_leaders");
        }

        let stubs = lines
            .iter()
            .filter(|l| NUMBERED_STUB.is_match(l) && l.split_whitespace().count() <= 6)
            .count();
        if stubs as f32 / lines.len() as f32 >= 0.5 {
            markers.push("numbered_stub_lines");
        }
    }

    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.len() >= 40 {
        let unique: HashSet<&String> = tokens.iter().collect();
        if unique.len() as f32 / (tokens.len() as f32) < 0.3 {
            markers.push("low_token_diversity");
        }
    }

    markers
}

pub fn is_noisy(text: &str) -> bool {
    !noise_markers(text).is_empty()
}
