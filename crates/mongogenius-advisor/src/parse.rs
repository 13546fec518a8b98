use serde_json::{Map, Value};

use mongogenius_core::{InvocationError, OutputShape};

/// Check raw model output against `shape` and return the JSON object.
///
/// Every shape field must be a non-blank string. Extra keys are kept, values
/// are not trimmed.
pub fn conform(raw: &str, shape: &OutputShape) -> Result<Map<String, Value>, InvocationError> {
    let map = parse_object(raw)?;

    for field in shape.fields {
        match map.get(field.name) {
            None | Some(Value::Null) => {
                return Err(InvocationError::MissingField(field.name.to_string()))
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(InvocationError::EmptyField(field.name.to_string()))
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(InvocationError::Malformed(format!(
                    "field `{}` must be a string, got {}",
                    field.name,
                    kind(other)
                )))
            }
        }
    }

    Ok(map)
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, InvocationError> {
    let json_str = extract_json_object(raw)
        .ok_or_else(|| InvocationError::Malformed("no JSON object in model output".into()))?;

    // Try the widest span first, then every balanced object from left to right
    let value = match serde_json::from_str::<Value>(json_str) {
        Ok(v) => v,
        Err(e) => {
            return raw
                .match_indices('{')
                .filter_map(|(start, _)| balanced_object_at(raw, start))
                .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
                    Ok(Value::Object(map)) => Some(map),
                    _ => None,
                })
                .ok_or_else(|| InvocationError::Malformed(format!("invalid JSON: {e}")))
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(InvocationError::Malformed(format!(
            "expected a JSON object, got {}",
            kind(&other)
        ))),
    }
}

/// Span from the first `{` to the last `}`. Drops code fences and any prose
/// around the object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// The `{ ... }` opening at byte `start` whose braces balance, ignoring
/// braces inside JSON strings.
fn balanced_object_at(raw: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongogenius_core::{QueryOptimizationResult, SchemaGenerationResult};

    const SHAPE: OutputShape = QueryOptimizationResult::SHAPE;

    #[test]
    fn accepts_plain_object() {
        let map = conform(r#"{"optimizedQuery":"q","explanation":"e"}"#, &SHAPE).unwrap();
        assert_eq!(map["optimizedQuery"], "q");
        assert_eq!(map["explanation"], "e");
    }

    #[test]
    fn strips_code_fence_and_prose() {
        let raw = "Here you go:\n```json\n{\"optimizedQuery\": \"db.users.find({status: 'active'})\", \
                   \"explanation\": \"Uses the status index.\"}\n```\n";
        let map = conform(raw, &SHAPE).unwrap();
        assert_eq!(map["optimizedQuery"], "db.users.find({status: 'active'})");
    }

    #[test]
    fn falls_back_to_first_object_when_trailing_text_has_braces() {
        let raw = r#"{"optimizedQuery":"q","explanation":"e"} (see {docs})"#;
        let map = conform(raw, &SHAPE).unwrap();
        assert_eq!(map["explanation"], "e");
    }

    #[test]
    fn skips_brace_snippets_in_leading_prose() {
        let raw = "Use an index like {status: 1}. Result:\n\
                   {\"optimizedQuery\":\"db.users.find(...)\",\"explanation\":\"index\"}";
        let map = conform(raw, &SHAPE).unwrap();
        assert_eq!(map["optimizedQuery"], "db.users.find(...)");
        assert_eq!(map["explanation"], "index");
    }

    #[test]
    fn skips_broken_and_unbalanced_braces_in_prose() {
        let raw = "Try {\"a\": [1} or { first.\n{\"optimizedQuery\":\"q\",\"explanation\":\"e\"}\nDone {x}";
        let map = conform(raw, &SHAPE).unwrap();
        assert_eq!(map["optimizedQuery"], "q");
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let raw = r#"{"optimizedQuery":"db.c.find({a: {$gt: 1}})","explanation":"\"}\" ok"} trailing }"#;
        let map = conform(raw, &SHAPE).unwrap();
        assert_eq!(map["optimizedQuery"], "db.c.find({a: {$gt: 1}})");
    }

    #[test]
    fn values_are_returned_untrimmed_and_extra_keys_kept() {
        let raw = r#"{"mongoDBSchema":"  db.posts\n","progress":"ok","confidence":0.9}"#;
        let map = conform(raw, &SchemaGenerationResult::SHAPE).unwrap();
        assert_eq!(map["mongoDBSchema"], "  db.posts\n");
        assert!(map.contains_key("confidence"));
    }

    #[test]
    fn missing_or_null_field_fails() {
        let err = conform(r#"{"optimizedQuery":"q"}"#, &SHAPE).unwrap_err();
        assert!(matches!(err, InvocationError::MissingField(f) if f == "explanation"));

        let err = conform(r#"{"optimizedQuery":null,"explanation":"e"}"#, &SHAPE).unwrap_err();
        assert!(matches!(err, InvocationError::MissingField(f) if f == "optimizedQuery"));
    }

    #[test]
    fn blank_field_fails() {
        let err = conform(r#"{"optimizedQuery":"q","explanation":"  "}"#, &SHAPE).unwrap_err();
        assert!(matches!(err, InvocationError::EmptyField(f) if f == "explanation"));
    }

    #[test]
    fn non_string_field_fails() {
        let err = conform(r#"{"optimizedQuery":{"find":"users"},"explanation":"e"}"#, &SHAPE)
            .unwrap_err();
        match err {
            InvocationError::Malformed(msg) => assert!(msg.contains("an object")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_object_fails() {
        for raw in ["", "I cannot help with that.", "} backwards {", "[1, 2]"] {
            assert!(
                matches!(conform(raw, &SHAPE), Err(InvocationError::Malformed(_))),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn broken_json_fails() {
        let err = conform(r#"{"optimizedQuery": "q", "explanation": }"#, &SHAPE).unwrap_err();
        assert!(matches!(err, InvocationError::Malformed(m) if m.starts_with("invalid JSON")));
    }
}
