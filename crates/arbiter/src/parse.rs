// Reply parsing
//
// Models are asked for `{"official_id": ...}` but do not always comply.
// Accepted, in order:
// 1. The JSON object itself (id as string, number or null)
// 2. A JSON object wrapped in prose or a markdown fence
// 3. A bare id or "none" on its own

use serde_json::Value;
use streetlink_linker::ArbitrationDecision;

use crate::error::ArbiterError;

const NONE_WORDS: &[&str] = &["none", "null", "no match", "n/a"];

/// Turn model output into a decision. Membership of the returned id in the
/// offered candidate list is checked by the caller.
pub fn parse_reply(content: &str) -> Result<ArbitrationDecision, ArbiterError> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return decision_from_object(&value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                log::debug!("arbiter reply contained extra text around JSON");
                return decision_from_object(&value);
            }
        }
    }

    bare_reply(trimmed)
}

fn decision_from_object(value: &Value) -> Result<ArbitrationDecision, ArbiterError> {
    let id = value
        .get("official_id")
        .ok_or_else(|| ArbiterError::InvalidResponse(format!("missing \"official_id\": {value}")))?;

    match id {
        Value::Null => Ok(ArbitrationDecision::NoneAcceptable),
        Value::String(s) => bare_reply(s.trim()),
        Value::Number(n) => Ok(ArbitrationDecision::Chosen(n.to_string())),
        other => Err(ArbiterError::InvalidResponse(format!(
            "\"official_id\" must be a string, number or null, got {other}"
        ))),
    }
}

fn bare_reply(text: &str) -> Result<ArbitrationDecision, ArbiterError> {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '`' || c == '"' || c == '\'' || c == '.');
    if text.is_empty() || NONE_WORDS.iter().any(|w| text.eq_ignore_ascii_case(w)) {
        return Ok(ArbitrationDecision::NoneAcceptable);
    }
    if text.split_whitespace().count() == 1 {
        return Ok(ArbitrationDecision::Chosen(text.to_string()));
    }
    Err(ArbiterError::Parse(format!("not an id or JSON: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chosen(id: &str) -> ArbitrationDecision {
        ArbitrationDecision::Chosen(id.to_string())
    }

    #[test]
    fn test_parse_valid_json() {
        assert_eq!(parse_reply(r#"{"official_id": "104"}"#).unwrap(), chosen("104"));
        assert_eq!(parse_reply(r#"{"official_id": 104}"#).unwrap(), chosen("104"));
    }

    #[test]
    fn test_parse_null_id() {
        assert_eq!(
            parse_reply(r#"{"official_id": null}"#).unwrap(),
            ArbitrationDecision::NoneAcceptable
        );
        assert_eq!(
            parse_reply(r#"{"official_id": "None"}"#).unwrap(),
            ArbitrationDecision::NoneAcceptable
        );
    }

    #[test]
    fn test_parse_json_with_markdown() {
        let reply = "Here's the answer:\n```json\n{\"official_id\": \"2031\"}\n```";
        assert_eq!(parse_reply(reply).unwrap(), chosen("2031"));
    }

    #[test]
    fn bare_answers() {
        assert_eq!(parse_reply(" 2031\n").unwrap(), chosen("2031"));
        assert_eq!(parse_reply("None").unwrap(), ArbitrationDecision::NoneAcceptable);
        assert_eq!(parse_reply("`none`.").unwrap(), ArbitrationDecision::NoneAcceptable);
    }

    #[test]
    fn rejects_prose_and_wrong_shapes() {
        assert!(matches!(
            parse_reply("I think it is probably 104 but not sure"),
            Err(ArbiterError::Parse(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"id": "104"}"#),
            Err(ArbiterError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"official_id": ["104"]}"#),
            Err(ArbiterError::InvalidResponse(_))
        ));
    }
}
