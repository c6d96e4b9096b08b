//! Declared tool parameters and argument validation.

use serde_json::{Map, Value, json};

use crate::error::ToolError;

/// Type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    StringArray,
}

impl ParamKind {
    fn json_type(self) -> Value {
        match self {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer => json!({ "type": "integer", "minimum": 0 }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn label(self) -> &'static str {
        match self {
            ParamKind::String => "a string",
            ParamKind::Integer => "a non-negative integer",
            ParamKind::Boolean => "a boolean",
            ParamKind::StringArray => "an array of strings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// The named parameters a tool accepts.
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            kind,
            required: true,
            description,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            kind,
            required: false,
            description,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// JSON Schema object surfaced to the model.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = p.kind.json_type();
            prop["description"] = Value::String(p.description.to_string());
            properties.insert(p.name.to_string(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Check `args` against the declared parameters.
    ///
    /// `null` is treated as an empty object. Unknown keys are rejected.
    pub fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let empty = Map::new();
        let obj = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(ToolError::InvalidArgs(format!(
                    "expected an object, got {}",
                    type_name(other)
                )));
            }
        };

        let mut problems = Vec::new();
        for p in &self.params {
            match obj.get(p.name) {
                None | Some(Value::Null) if p.required => {
                    problems.push(format!("missing required parameter '{}'", p.name));
                }
                None | Some(Value::Null) => {}
                Some(v) if !p.kind.accepts(v) => problems.push(format!(
                    "parameter '{}' must be {}, got {}",
                    p.name,
                    p.kind.label(),
                    type_name(v)
                )),
                Some(_) => {}
            }
        }
        for key in obj.keys() {
            if !self.params.iter().any(|p| p.name == key) {
                problems.push(format!("unexpected parameter '{key}'"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArgs(problems.join("; ")))
        }
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> InputSchema {
        InputSchema::new()
            .required("path", ParamKind::String, "File path")
            .optional("args", ParamKind::StringArray, "Arguments")
            .optional("timeout_secs", ParamKind::Integer, "Timeout")
    }

    #[test]
    fn test_valid_args() {
        schema()
            .validate(&json!({"path": "a.txt", "args": ["-l"], "timeout_secs": 3}))
            .unwrap();
    }

    #[test]
    fn test_missing_required() {
        let err = schema().validate(&json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(ref m) if m.contains("'path'")));
    }

    #[test]
    fn test_wrong_types_are_all_reported() {
        let err = schema()
            .validate(&json!({"path": 1, "args": [1, 2], "timeout_secs": -1}))
            .unwrap_err();
        let ToolError::InvalidArgs(msg) = err else {
            panic!("expected InvalidArgs");
        };
        assert!(msg.contains("'path' must be a string"));
        assert!(msg.contains("'args' must be an array of strings"));
        assert!(msg.contains("'timeout_secs'"));
    }

    #[test]
    fn test_unexpected_key_and_non_object() {
        assert!(schema().validate(&json!({"path": "x", "extra": 1})).is_err());
        assert!(schema().validate(&json!("x")).is_err());
        assert!(InputSchema::new().validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_json_schema_shape() {
        let s = schema().to_json_schema();
        assert_eq!(s["type"], "object");
        assert_eq!(s["required"], json!(["path"]));
        assert_eq!(s["properties"]["args"]["type"], "array");
        assert_eq!(s["properties"]["path"]["description"], "File path");
    }
}
