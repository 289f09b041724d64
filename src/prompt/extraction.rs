use crate::entity::probabilistic::TypeDescription;
use crate::prompt::JSON_ONLY_RULES;

/// Generate a prompt asking the language-understanding service to extract
/// typed entities from the uncovered part of a query.
pub fn gap_extraction_prompt(gap_text: &str, supported_types: &[TypeDescription]) -> String {
    let type_lines = supported_types
        .iter()
        .map(|t| format!("   - {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let type_names = supported_types
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join("|");

    format!(
        r#"QUERY FRAGMENT (FOR ENTITY EXTRACTION):
----------
{gap}
----------

TASK: Extract typed entities from this fragment of a user's search query
about industrial equipment, spare parts, and maintenance documents.

ENTITY TYPES:
{types}

GUIDELINES:
1. Only extract text that actually appears in the fragment, verbatim.
2. Assign exactly one type per entity.
3. Assign a confidence between 0.0 and 1.0 reflecting how certain you are
   of both the span and the type.
4. Prefer fewer, precise entities over many speculative ones.
5. Skip filler words, verbs, and anything that does not help identify what
   the user is looking for.

RETURN FORMAT (JSON):
{{
  "entities": [
    {{
      "text": "exact text from the fragment",
      "type": "{names}",
      "confidence": 0.0
    }}
  ]
}}
{rules}"#,
        gap = gap_text,
        types = type_lines,
        names = type_names,
        rules = JSON_ONLY_RULES,
    )
}
