//! JSON Repair
//!
//! Extraction and repair of JSON from raw model output.
//!
//! Handles the usual ways a model breaks JSON mode:
//! - Markdown code fence wrapping (```json ... ```)
//! - JSON embedded in explanatory text
//! - Trailing commas
//! - Output truncated mid-string or mid-object

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{QuorumError, Result};

/// Extract and parse JSON from a model response
///
/// This is the primary entry point for parsing model JSON output.
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    JsonRepairer::new()
        .parse_or_repair(content)
        .map(|(value, _)| value)
}

/// Repair strategies applied in order until one parses
pub struct JsonRepairer {
    preview_chars: usize,
}

impl Default for JsonRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRepairer {
    pub fn new() -> Self {
        Self { preview_chars: 200 }
    }

    /// Parse JSON, attempting repair if the direct parse fails
    ///
    /// Returns (Value, was_repaired)
    pub fn parse_or_repair(&self, raw: &str) -> Result<(Value, bool)> {
        let cleaned = preprocess(raw);

        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            return Ok((value, false));
        }
        debug!("Direct JSON parse failed, attempting repair");

        let embedded = extract_embedded(&cleaned);
        let base = embedded.as_deref().unwrap_or(&cleaned);

        let candidates = [
            base.to_string(),
            strip_trailing_commas(base),
            close_open_structures(&strip_trailing_commas(base)),
        ];

        for (level, candidate) in candidates.iter().enumerate() {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                warn!(level, "JSON repaired");
                return Ok((value, true));
            }
        }

        Err(QuorumError::LlmApi(format!(
            "Failed to parse or repair JSON. Content preview: {}...",
            cleaned.chars().take(self.preview_chars).collect::<String>()
        )))
    }
}

fn preprocess(raw: &str) -> String {
    let s = raw.trim().trim_start_matches('\u{feff}');
    let s = match s.strip_prefix("```") {
        Some(rest) => rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest),
        None => s,
    };
    let s = s.trim_end();
    s.strip_suffix("```").unwrap_or(s).trim().to_string()
}

/// Walks JSON text tracking string state; calls `on_char` for each char
/// outside strings (and each opening quote) with its byte offset.
/// Returns whether the text ends inside a string.
fn scan_structural(s: &str, mut on_char: impl FnMut(usize, char) -> bool) -> bool {
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' if in_string => in_string = false,
            '"' => {
                in_string = true;
                if !on_char(i, ch) {
                    break;
                }
            }
            _ if !in_string => {
                if !on_char(i, ch) {
                    break;
                }
            }
            _ => {}
        }
    }
    in_string
}

/// First balanced object or array in mixed content
fn extract_embedded(s: &str) -> Option<String> {
    let start = s.find(['{', '['])?;
    let body = &s[start..];
    let mut depth = 0i32;
    let mut end = None;

    scan_structural(body, |i, ch| {
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i + 1);
                    return false;
                }
            }
            _ => {}
        }
        true
    });

    match end {
        Some(end) => Some(body[..end].to_string()),
        // Unbalanced: hand the tail to the closing pass
        None => (start > 0).then(|| body.to_string()),
    }
}

/// Remove commas directly followed (modulo whitespace) by a closer
fn strip_trailing_commas(s: &str) -> String {
    let mut drop = Vec::new();
    let mut pending_comma: Option<usize> = None;

    scan_structural(s, |i, ch| {
        match ch {
            ',' => pending_comma = Some(i),
            '}' | ']' => {
                if let Some(pos) = pending_comma.take() {
                    drop.push(pos);
                }
            }
            c if c.is_whitespace() => {}
            _ => pending_comma = None,
        }
        true
    });

    s.char_indices()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, c)| c)
        .collect()
}

/// Close an unterminated string and any open objects/arrays in nesting order
fn close_open_structures(s: &str) -> String {
    let mut stack = Vec::new();
    let in_string = scan_structural(s, |_, ch| {
        match ch {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
        true
    });

    let mut result = s.trim_end().to_string();
    if in_string {
        result.push('"');
    }
    if result.ends_with(',') {
        result.pop();
    }
    while let Some(closer) = stack.pop() {
        result.push(closer);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_json() {
        let (value, repaired) = JsonRepairer::new()
            .parse_or_repair(r#"{"sql": "SELECT 1"}"#)
            .unwrap();
        assert!(!repaired);
        assert_eq!(value["sql"], "SELECT 1");
    }

    #[test]
    fn test_strip_code_fences() {
        let input = "```json\n{\"sql\": \"SELECT 1\"}\n```";
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value["sql"], "SELECT 1");
    }

    #[test]
    fn test_trailing_comma() {
        let (value, repaired) = JsonRepairer::new()
            .parse_or_repair(r#"{"choice": 2, "reason": "fewer joins",}"#)
            .unwrap();
        assert!(repaired);
        assert_eq!(value["choice"], 2);
    }

    #[test]
    fn test_comma_inside_string_is_kept() {
        let input = r#"{"sql": "SELECT a, b FROM t",}"#;
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value["sql"], "SELECT a, b FROM t");
    }

    #[test]
    fn test_embedded_in_prose() {
        let input = r#"Here is the query: {"sql": "SELECT name FROM users"} hope it helps"#;
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value["sql"], "SELECT name FROM users");
    }

    #[test]
    fn test_truncated_output_closed_in_order() {
        let input = r#"{"ir_ast": {"select": [{"name": "id"}, {"name": "tot"#;
        let value = extract_json_from_response(input).unwrap();
        assert_eq!(value["ir_ast"]["select"][1]["name"], "tot");
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(extract_json_from_response("no json here").is_err());
    }
}
