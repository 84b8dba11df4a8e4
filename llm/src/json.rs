//! Defensive extraction of JSON from model completions.
//!
//! Models wrap JSON in Markdown fences, prepend chatter, or trail off with
//! explanations. These helpers find the first balanced array or object and
//! ignore everything around it.

use serde::de::DeserializeOwned;

use crate::error::{LlmError, Result};

/// Remove Markdown code fences (```` ```json ```` and bare ```` ``` ````).
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// First balanced `[...]` in `text`, honoring string literals.
pub fn extract_first_json_array(text: &str) -> Option<&str> {
    extract_balanced(text, '[', ']')
}

/// First balanced `{...}` in `text`, honoring string literals.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    extract_balanced(text, '{', '}')
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let mut search_from = 0;

    // An unclosed candidate must not hide a later complete one.
    while let Some(rel) = text[search_from..].find(open) {
        let start = search_from + rel;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, c) in text[start..].char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }

            if c == '"' {
                in_string = true;
            } else if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
        }

        search_from = start + open.len_utf8();
    }

    None
}

/// Parse the first JSON array in a completion.
pub fn parse_first_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let cleaned = strip_code_fences(text);
    let slice = extract_first_json_array(&cleaned)
        .ok_or_else(|| LlmError::MalformedOutput("no JSON array found".to_string()))?;
    Ok(serde_json::from_str(slice)?)
}

/// Parse the first JSON object in a completion.
pub fn parse_first_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let cleaned = strip_code_fences(text);
    let slice = extract_first_json_object(&cleaned)
        .ok_or_else(|| LlmError::MalformedOutput("no JSON object found".to_string()))?;
    Ok(serde_json::from_str(slice)?)
}
