// Shared response rules appended to every extraction prompt.
pub const JSON_ONLY_RULES: &str = r#"
RULES:
- Return ONLY a properly formatted JSON object, nothing else.
- Do not wrap the JSON in markdown code fences.
- Do not narrate, explain, or add commentary before or after the JSON.
- If nothing qualifies, return {"entities": []}.
"#;
