//! Prompt building utilities for LLM providers.
//!
//! Shared utilities for constructing prompts with JSON schema instructions.

use serde_json::Value;

/// System instruction shared by all providers.
pub const SYSTEM_INSTRUCTION: &str =
    "You are a careful SQL analyst working against a relational database. Always respond with valid JSON.";

/// Render the schema as pretty JSON, falling back to compact form.
pub fn render_schema(schema: &Value) -> String {
    serde_json::to_string_pretty(schema)
        .or_else(|_| serde_json::to_string(schema))
        .unwrap_or_else(|_| "{}".to_string())
}

/// Schema instructions appended after the task text.
///
/// Returns `None` for a null schema.
pub fn schema_instructions(schema: &Value) -> Option<String> {
    if schema.is_null() {
        return None;
    }
    Some(format!(
        "Respond with valid JSON matching this schema:\n```json\n{}\n```\n\nRespond ONLY with valid JSON, no explanation.",
        render_schema(schema)
    ))
}

/// Build a single prompt with JSON schema instructions.
///
/// Used by providers without a separate system channel (Ollama).
/// Returns the original prompt if schema is null.
pub fn build_schema_prompt(user_prompt: &str, schema: &Value) -> String {
    match schema_instructions(schema) {
        Some(instructions) => format!("{}\n\n---\n\n{}", user_prompt, instructions),
        None => user_prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_schema_prompt_null_schema() {
        let prompt = "Write a query";
        let result = build_schema_prompt(prompt, &Value::Null);
        assert_eq!(result, prompt);
    }

    #[test]
    fn test_build_schema_prompt_with_schema() {
        let prompt = "Write a query";
        let schema = json!({"type": "object", "properties": {"sql": {"type": "string"}}});
        let result = build_schema_prompt(prompt, &schema);

        assert!(result.starts_with(prompt));
        assert!(result.contains("\"sql\""));
        assert!(result.contains("Respond ONLY with valid JSON"));
    }
}
