//! Routing-key extraction from buffered request bodies.
//!
//! The classifier reads the `model` field out of the body snapshot so that
//! the original bytes stay intact for forwarding. Absence of the field is a
//! routing signal (use the default backend), not a parse failure.

use serde_json::{Map, Value};

/// Extract the top-level `model` field from a JSON object body.
///
/// Returns `Err` when the body is not a JSON object at all, and `Ok(None)`
/// when the object has no `model` key or its value is not a string.
pub fn extract_routing_key(body: &[u8]) -> Result<Option<String>, serde_json::Error> {
    let object: Map<String, Value> = serde_json::from_slice(body)?;
    Ok(object
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_string_model() {
        let key = extract_routing_key(br#"{"model": "gpt-4", "messages": []}"#).unwrap();
        assert_eq!(key.as_deref(), Some("gpt-4"));
    }

    #[test]
    fn missing_model_is_default_routing() {
        let key = extract_routing_key(br#"{"messages": []}"#).unwrap();
        assert_eq!(key, None);
    }

    #[test]
    fn non_string_model_is_default_routing() {
        assert_eq!(extract_routing_key(br#"{"model": 42}"#).unwrap(), None);
        assert_eq!(extract_routing_key(br#"{"model": null}"#).unwrap(), None);
        assert_eq!(
            extract_routing_key(br#"{"model": ["gpt-4"]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn nested_model_is_not_a_routing_key() {
        let key = extract_routing_key(br#"{"request": {"model": "gpt-4"}}"#).unwrap();
        assert_eq!(key, None);
    }

    #[test]
    fn truncated_json_is_malformed() {
        assert!(extract_routing_key(br#"{"model":"#).is_err());
    }

    #[test]
    fn non_object_json_is_malformed() {
        assert!(extract_routing_key(b"[1, 2, 3]").is_err());
        assert!(extract_routing_key(b"\"gpt-4\"").is_err());
        assert!(extract_routing_key(b"null").is_err());
        assert!(extract_routing_key(b"").is_err());
    }
}
