use rb_core::{Error, Result};
use serde::de::DeserializeOwned;

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (`json`, `JSON`, ...) up to the first newline
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Decode a model reply into `T`, tolerating code fences around the JSON.
pub fn parse_reply<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(Error::InvalidResponse(format!("empty {} reply", what)));
    }
    serde_json::from_str(body)
        .map_err(|e| Error::InvalidResponse(format!("{} is not valid JSON: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  ```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"plain\": true}"), "{\"plain\": true}");
    }

    #[test]
    fn test_parse_reply_errors() {
        assert!(matches!(
            parse_reply::<serde_json::Value>("I cannot help with that.", "analysis"),
            Err(Error::InvalidResponse(_))
        ));
        assert!(parse_reply::<serde_json::Value>("```json\n```", "analysis").is_err());
        let value: serde_json::Value = parse_reply("```json\n{\"ok\": 1}\n```", "analysis").unwrap();
        assert_eq!(value["ok"], 1);
    }
}
