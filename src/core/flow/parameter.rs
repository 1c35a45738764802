use crate::core::error::ParameterError;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Caller-supplied parameter values keyed by name.
pub type ParameterValues = IndexMap<String, Value>;

/// Value type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Any,
    String,
    Number,
    Bool,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Any => "any",
            ParameterKind::String => "string",
            ParameterKind::Number => "number",
            ParameterKind::Bool => "bool",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParameterKind::Any => true,
            ParameterKind::String => value.is_string(),
            ParameterKind::Number => value.is_number(),
            ParameterKind::Bool => value.is_boolean(),
        }
    }

    /// Read command-line text. String parameters keep the text as typed;
    /// the others take it as JSON when it parses, else as a string.
    pub fn parse_raw(&self, raw: &str) -> Value {
        match self {
            ParameterKind::String => Value::String(raw.to_string()),
            _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared flow input, resolved once at run start.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub kind: ParameterKind,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
            kind: ParameterKind::Any,
        }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: Some(default.into()),
            kind: ParameterKind::Any,
        }
    }

    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Resolve supplied values against the declarations.
///
/// Unknown names are rejected before missing ones; both report every offending name.
/// A supplied value of the wrong kind is rejected after that.
/// Optional parameters without a supplied value fall back to their default, or `null`.
pub fn resolve_parameters(
    specs: &[ParameterSpec],
    mut supplied: ParameterValues,
) -> Result<ParameterValues, ParameterError> {
    let unknown: Vec<String> = supplied
        .keys()
        .filter(|name| !specs.iter().any(|spec| &spec.name == *name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ParameterError::Unknown(unknown));
    }

    let mut resolved = ParameterValues::new();
    let mut missing = Vec::new();
    let mut mistyped = None;
    for spec in specs {
        match supplied.shift_remove(&spec.name) {
            Some(value) => {
                if mistyped.is_none() && !spec.kind.accepts(&value) {
                    mistyped = Some(ParameterError::Invalid {
                        name: spec.name.clone(),
                        reason: format!("expected {}, got {}", spec.kind, json_type(&value)),
                    });
                }
                resolved.insert(spec.name.clone(), value);
            }
            None if spec.required => missing.push(spec.name.clone()),
            None => {
                resolved.insert(
                    spec.name.clone(),
                    spec.default.clone().unwrap_or(Value::Null),
                );
            }
        }
    }
    if !missing.is_empty() {
        return Err(ParameterError::Missing(missing));
    }
    match mistyped {
        Some(err) => Err(err),
        None => Ok(resolved),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a `name=value` assignment. The value is read as JSON when it parses, else as a string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), ParameterError> {
    let (name, value) = split_assignment(raw)?;
    Ok((name.to_string(), ParameterKind::Any.parse_raw(value)))
}

/// Parse a `name=value` assignment using the declared kind of `name`.
/// Undeclared names are read like [`parse_assignment`] and rejected at resolution.
pub fn parse_assignment_for(
    specs: &[ParameterSpec],
    raw: &str,
) -> Result<(String, Value), ParameterError> {
    let (name, value) = split_assignment(raw)?;
    let kind = specs
        .iter()
        .find(|spec| spec.name == name)
        .map_or(ParameterKind::Any, |spec| spec.kind);
    Ok((name.to_string(), kind.parse_raw(value)))
}

fn split_assignment(raw: &str) -> Result<(&str, &str), ParameterError> {
    let (name, value) = raw.split_once('=').ok_or_else(|| ParameterError::Invalid {
        name: raw.to_string(),
        reason: "expected NAME=VALUE".to_string(),
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParameterError::Invalid {
            name: raw.to_string(),
            reason: "parameter name is empty".to_string(),
        });
    }
    Ok((name, value))
}
