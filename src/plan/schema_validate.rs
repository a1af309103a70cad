//! JSON-schema validation of raw oracle output before it is trusted as a
//! [`super::QueryPlan`] (spec §4.3: "validated against a schema before
//! use; invalid output is retried once, then treated as a compilation
//! failure").

use once_cell::sync::Lazy;
use serde_json::{json, Value};

static FILTER_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["field", "op", "value"],
        "additionalProperties": false,
        "properties": {
            "field": {
                "type": "string",
                "enum": [
                    "title", "subject", "place", "publisher", "language", "date",
                    "agent_name", "agent_role", "agent_type", "country"
                ]
            },
            "op": {
                "type": "string",
                "enum": ["equals", "contains", "in", "range", "overlaps", "gte", "lte"]
            },
            "value": {},
            "notes": { "type": ["string", "null"] }
        }
    })
});

static PLAN_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["filters"],
        "additionalProperties": false,
        "properties": {
            "version": { "type": "integer" },
            "query_text": { "type": "string" },
            "filters": { "type": "array", "items": FILTER_SCHEMA.clone() },
            "soft_filters": { "type": "array", "items": FILTER_SCHEMA.clone() },
            "limit": { "type": ["integer", "null"] },
            "debug": { "type": "object" },
            "clarification": { "type": ["string", "null"] }
        }
    })
});

/// Validate `raw` (the oracle's JSON text) against the plan schema.
/// Returns the parsed value on success so the caller can deserialize it
/// into a [`super::QueryPlan`] without re-parsing.
pub fn validate(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;

    let compiled = jsonschema::validator_for(&PLAN_SCHEMA)
        .map_err(|e| format!("internal schema error: {e}"))?;

    let errors: Vec<String> = compiled
        .iter_errors(&value)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_plan_passes() {
        let raw = r#"{"filters":[{"field":"title","op":"contains","value":"aldine"}]}"#;
        assert!(validate(raw).is_ok());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let raw = r#"{"filters":[{"field":"isbn","op":"equals","value":"x"}]}"#;
        assert!(validate(raw).is_err());
    }

    #[test]
    fn missing_filters_key_is_rejected() {
        let raw = r#"{"clarification":"which decade?"}"#;
        assert!(validate(raw).is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(validate("not json").is_err());
    }

    #[test]
    fn agent_role_and_agent_type_are_accepted_fields() {
        let raw = r#"{"filters":[
            {"field":"agent_role","op":"equals","value":"printer"},
            {"field":"agent_type","op":"equals","value":"personal"},
            {"field":"country","op":"equals","value":"Italy"}
        ]}"#;
        assert!(validate(raw).is_ok());
    }

    #[test]
    fn new_ops_are_accepted() {
        let raw = r#"{"filters":[
            {"field":"date","op":"gte","value":1500},
            {"field":"date","op":"lte","value":1520},
            {"field":"language","op":"in","value":["heb","ita"]}
        ]}"#;
        assert!(validate(raw).is_ok());
    }

    #[test]
    fn soft_filters_limit_and_debug_round_trip() {
        let raw = r#"{"filters":[],"soft_filters":[{"field":"title","op":"contains","value":"astronomy"}],"limit":20,"debug":{"note":"x"},"clarification":"which decade?"}"#;
        assert!(validate(raw).is_ok());
    }

    #[test]
    fn stale_role_property_on_a_filter_is_rejected() {
        let raw = r#"{"filters":[{"field":"agent_name","op":"equals","value":"aldus","role":"printer"}]}"#;
        assert!(validate(raw).is_err());
    }
}
