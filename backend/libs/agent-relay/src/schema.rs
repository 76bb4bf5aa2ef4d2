//! Per-type payload schemas checked at the client boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Payload;

/// JSON kind a payload field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// Declared payload shape for one message type.
///
/// ```toml
/// [message_types.payload]
/// required = { task = "string", priority = "integer" }
/// optional = { deadline = "string" }
/// allow_unknown = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadSchema {
    #[serde(default)]
    pub required: BTreeMap<String, FieldKind>,

    #[serde(default)]
    pub optional: BTreeMap<String, FieldKind>,

    /// Accept fields not listed in `required` or `optional`
    #[serde(default = "default_allow_unknown")]
    pub allow_unknown: bool,
}

fn default_allow_unknown() -> bool {
    true
}

impl PayloadSchema {
    /// Check a payload, returning a human-readable reason on failure.
    pub fn check(&self, payload: &Payload) -> Result<(), String> {
        for (name, kind) in &self.required {
            match payload.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required field '{}'", name));
                }
                Some(value) if !kind.matches(value) => {
                    return Err(format!("field '{}' must be {}", name, kind));
                }
                Some(_) => {}
            }
        }

        for (name, value) in payload {
            if self.required.contains_key(name) {
                continue;
            }
            match self.optional.get(name) {
                Some(kind) => {
                    if !value.is_null() && !kind.matches(value) {
                        return Err(format!("field '{}' must be {}", name, kind));
                    }
                }
                None if !self.allow_unknown => {
                    return Err(format!("unexpected field '{}'", name));
                }
                None => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn delegation_schema() -> PayloadSchema {
        PayloadSchema {
            required: BTreeMap::from([
                ("task".to_string(), FieldKind::String),
                ("priority".to_string(), FieldKind::Integer),
            ]),
            optional: BTreeMap::from([("notes".to_string(), FieldKind::String)]),
            allow_unknown: false,
        }
    }

    #[test]
    fn test_required_fields() {
        let schema = delegation_schema();
        assert!(schema
            .check(&payload(json!({ "task": "x", "priority": 1 })))
            .is_ok());

        let err = schema.check(&payload(json!({ "task": "x" }))).unwrap_err();
        assert_eq!(err, "missing required field 'priority'");

        let err = schema
            .check(&payload(json!({ "task": "x", "priority": null })))
            .unwrap_err();
        assert_eq!(err, "missing required field 'priority'");

        let err = schema
            .check(&payload(json!({ "task": 7, "priority": 1 })))
            .unwrap_err();
        assert_eq!(err, "field 'task' must be string");
    }

    #[test]
    fn test_optional_and_unknown_fields() {
        let schema = delegation_schema();
        assert!(schema
            .check(&payload(json!({ "task": "x", "priority": 1, "notes": null })))
            .is_ok());

        let err = schema
            .check(&payload(json!({ "task": "x", "priority": 1, "notes": 3 })))
            .unwrap_err();
        assert_eq!(err, "field 'notes' must be string");

        let err = schema
            .check(&payload(json!({ "task": "x", "priority": 1, "extra": true })))
            .unwrap_err();
        assert_eq!(err, "unexpected field 'extra'");

        let open = PayloadSchema {
            allow_unknown: true,
            ..delegation_schema()
        };
        assert!(open
            .check(&payload(json!({ "task": "x", "priority": 1, "extra": true })))
            .is_ok());
    }

    #[test]
    fn test_integer_kind_rejects_floats() {
        assert!(FieldKind::Integer.matches(&json!(3)));
        assert!(!FieldKind::Integer.matches(&json!(3.5)));
        assert!(FieldKind::Number.matches(&json!(3.5)));
        assert!(FieldKind::Any.matches(&Value::Null));
    }

    #[test]
    fn test_schema_defaults_when_fields_omitted() {
        let schema: PayloadSchema = serde_json::from_value(json!({
            "required": { "task": "string" }
        }))
        .unwrap();
        assert!(schema.allow_unknown);
        assert!(schema.optional.is_empty());
        assert_eq!(schema.required.get("task"), Some(&FieldKind::String));
    }
}
