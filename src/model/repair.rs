use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid fence regex")
    })
}

/// Strips one surrounding markdown code fence, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    match fence_re().captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw,
    }
}

/// Extracts the first top-level JSON object substring from a string.
/// Braces inside JSON strings are ignored; returns None if not found.
pub fn extract_first_json_object(s: &str) -> Option<&str> {
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in s.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|st| &s[st..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse model text as JSON, tolerating a code fence or surrounding prose.
pub fn parse_json(raw: &str) -> Result<Value, String> {
    if let Ok(v) = serde_json::from_str(raw.trim()) {
        return Ok(v);
    }
    let unfenced = strip_code_fence(raw).trim();
    let err = match serde_json::from_str(unfenced) {
        Ok(v) => return Ok(v),
        Err(e) => e.to_string(),
    };
    extract_first_json_object(unfenced)
        .and_then(|obj| serde_json::from_str(obj).ok())
        .ok_or(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  ```\r\n{}\r\n```  \n"), "{}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn fenced_and_plain_parse_identically() {
        let inner = r#"{"html":"<p>hi</p>","files":[{"name":"a"}]}"#;
        let fenced = format!("```json\n{inner}\n```");
        assert_eq!(parse_json(&fenced).unwrap(), parse_json(inner).unwrap());
    }

    #[test]
    fn finds_object_behind_prose_with_braces_in_strings() {
        let raw = r#"Sure! Here it is: {"html":"<style>p{color:red}</style>"} hope that helps"#;
        assert_eq!(parse_json(raw).unwrap(), json!({ "html": "<style>p{color:red}</style>" }));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let raw = r#"x {"a":"say \"}\" please"} y"#;
        assert_eq!(extract_first_json_object(raw), Some(r#"{"a":"say \"}\" please"}"#));
    }

    #[test]
    fn plain_text_is_an_error() {
        assert!(parse_json("oops").is_err());
        assert!(parse_json("```json\n{\"html\": \n```").is_err());
    }
}
