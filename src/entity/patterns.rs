//! Pattern rules for structured entity formats.
//!
//! Each rule carries its own base confidence; the extractor applies the
//! per-source multiplier afterwards. Rules are applied in declaration order
//! and claim their spans so later rules and the proper-noun fallback skip
//! them.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::types::{Entity, EntitySource, EntityType, Span};
use super::TARGET_ENTITY;

pub struct PatternRule {
    pub name: &'static str,
    pub entity_type: EntityType,
    pub base_confidence: f32,
    regex: Regex,
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        PatternRule {
            name: "fault_spn",
            entity_type: EntityType::FaultCode,
            base_confidence: 0.95,
            regex: Regex::new(r"(?i)\bSPN\s?\d{3,5}(?:\s?FMI\s?\d{1,2})?\b").unwrap(),
        },
        PatternRule {
            name: "fault_obd",
            entity_type: EntityType::FaultCode,
            base_confidence: 0.92,
            regex: Regex::new(r"\b[PBCU]\d{4}\b").unwrap(),
        },
        PatternRule {
            name: "fault_alarm",
            entity_type: EntityType::FaultCode,
            base_confidence: 0.90,
            regex: Regex::new(r"\bE-\d{2,4}\b").unwrap(),
        },
        PatternRule {
            name: "part_number_dashed",
            entity_type: EntityType::PartNumber,
            base_confidence: 0.98,
            regex: Regex::new(r"\b[A-Z]{2,4}-\d{3,6}(?:-\d{1,6})?\b").unwrap(),
        },
        PatternRule {
            name: "part_number_numeric",
            entity_type: EntityType::PartNumber,
            base_confidence: 0.85,
            regex: Regex::new(r"\b\d{9,12}\b").unwrap(),
        },
        PatternRule {
            name: "measurement_unit",
            entity_type: EntityType::Measurement,
            base_confidence: 0.90,
            regex: Regex::new(
                r"(?i)\b\d+(?:[.,]\d+)?\s?(?:kpa|mpa|mbar|bar|psi|rpm|nm|kw|kv|mv|ma|hp|mm|cm|ml|l/h|v|a|l|kg|g|h)\b",
            )
            .unwrap(),
        },
        PatternRule {
            name: "measurement_symbol",
            entity_type: EntityType::Measurement,
            base_confidence: 0.90,
            regex: Regex::new(r"(?i)\b\d+(?:[.,]\d+)?\s?(?:°c|°f|%)").unwrap(),
        },
    ]
});

/// Run every pattern rule against the normalized text. Claimed spans are
/// appended to `claimed`; matches overlapping an already pattern-claimed
/// span are dropped.
pub fn find_matches(text: &str, claimed: &mut Vec<Span>) -> Vec<Entity> {
    let mut found = Vec::new();

    for rule in RULES.iter() {
        for m in rule.regex.find_iter(text) {
            let span = Span::new(m.start(), m.end());
            if found
                .iter()
                .any(|e: &Entity| e.span.overlaps(&span))
            {
                debug!(
                    target: TARGET_ENTITY,
                    "Pattern rule {} match at {}..{} skipped, overlaps earlier rule",
                    rule.name, span.start, span.end
                );
                continue;
            }

            claimed.push(span);
            found.push(Entity::new(
                m.as_str(),
                rule.entity_type,
                span,
                rule.base_confidence,
                EntitySource::Pattern,
            ));
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_number_dashed() {
        let mut claimed = Vec::new();
        let found = find_matches("need MTU-4000-1234 asap", &mut claimed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "MTU-4000-1234");
        assert_eq!(found[0].entity_type, EntityType::PartNumber);
        assert_eq!(found[0].span, Span::new(5, 18));
    }

    #[test]
    fn test_part_number_numeric() {
        let mut claimed = Vec::new();
        let found = find_matches("filter 0081837301 in stock?", &mut claimed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "0081837301");
        assert_eq!(found[0].entity_type, EntityType::PartNumber);
    }

    #[test]
    fn test_fault_codes() {
        let mut claimed = Vec::new();
        let found = find_matches("alarm SPN 3216 FMI 4 and code E-047", &mut claimed);
        let texts: Vec<&str> = found.iter().map(|e| e.text.as_str()).collect();
        assert!(texts.contains(&"SPN 3216 FMI 4"));
        assert!(texts.contains(&"E-047"));
        assert!(found.iter().all(|e| e.entity_type == EntityType::FaultCode));
    }

    #[test]
    fn test_obd_code() {
        let mut claimed = Vec::new();
        let found = find_matches("reads P0304 on the scanner", &mut claimed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "P0304");
    }

    #[test]
    fn test_measurements() {
        let mut claimed = Vec::new();
        let found = find_matches("pressure 3.5 bar at 24 V and 90 °C", &mut claimed);
        let texts: Vec<&str> = found.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["3.5 bar", "24 V", "90 °C"]);
        assert!(found.iter().all(|e| e.entity_type == EntityType::Measurement));
    }

    #[test]
    fn test_unit_not_matched_inside_word() {
        let mut claimed = Vec::new();
        // "24 Volts" must not yield a "24 V" measurement
        let found = find_matches("running at 24 Volts", &mut claimed);
        assert!(found.is_empty());
    }

    #[test]
    fn test_no_matches_on_plain_text() {
        let mut claimed = Vec::new();
        assert!(find_matches("fuel filter for the engine", &mut claimed).is_empty());
        assert!(find_matches("", &mut claimed).is_empty());
    }
}
