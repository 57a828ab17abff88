//! Parameter schemas declared alongside each tool.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value types a tool parameter may accept.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Whole number (no fractional component).
    Integer,
    /// Any JSON number, integer or floating point.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Ordered list of values.
    Array,
    /// Key/value mapping.
    Object,
    /// Accepts every value.
    #[default]
    Any,
}

impl ParamType {
    /// Returns whether `value` is acceptable for this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    /// Name of the type as advertised in tool signatures.
    #[must_use]
    pub const fn signature_name(self) -> &'static str {
        match self {
            Self::String => "str",
            Self::Integer => "int",
            Self::Number => "float",
            Self::Boolean => "bool",
            Self::Array => "list",
            Self::Object => "dict",
            Self::Any => "Any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signature_name())
    }
}

/// Describes one parameter of a tool, in declaration order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ToolParameter {
    name: String,
    #[serde(rename = "type")]
    ty: ParamType,
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ToolParameter {
    /// Declares a parameter the caller must always supply.
    #[must_use]
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            description: None,
        }
    }

    /// Declares a parameter that falls back to `default` when omitted.
    #[must_use]
    pub fn optional(name: impl Into<String>, ty: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: Some(default.into()),
            description: None,
        }
    }

    /// Attaches a short description rendered in the tool docstring.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared value type.
    #[must_use]
    pub const fn ty(&self) -> ParamType {
        self.ty
    }

    /// Returns whether the parameter must be supplied.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the default used when the argument is omitted.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether `value` satisfies this parameter. Optional parameters
    /// also accept `null`.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        (value.is_null() && !self.required) || self.ty.accepts(value)
    }

    pub(crate) fn signature(&self) -> String {
        match &self.default {
            Some(default) if !self.required => {
                format!("{}: {} = {}", self.name, self.ty, literal(default))
            }
            _ => format!("{}: {}", self.name, self.ty),
        }
    }
}

/// Renders a value the way it would be written in a call expression.
pub(crate) fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_owned(),
        Value::Bool(true) => "True".to_owned(),
        Value::Bool(false) => "False".to_owned(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}: {}", Value::from(key.as_str()), literal(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_rejects_floats() {
        assert!(ParamType::Integer.accepts(&json!(3)));
        assert!(!ParamType::Integer.accepts(&json!(3.5)));
        assert!(ParamType::Number.accepts(&json!(3)));
        assert!(ParamType::Number.accepts(&json!(3.5)));
    }

    #[test]
    fn optional_parameters_accept_null() {
        let celsius = ToolParameter::optional("celsius", ParamType::Boolean, false);
        assert!(celsius.accepts(&Value::Null));

        let location = ToolParameter::required("location", ParamType::String);
        assert!(!location.accepts(&Value::Null));
    }

    #[test]
    fn signature_renders_defaults() {
        let param = ToolParameter::optional("celsius", ParamType::Boolean, false);
        assert_eq!(param.signature(), "celsius: bool = False");

        let param = ToolParameter::optional("unit", ParamType::String, "metric");
        assert_eq!(param.signature(), "unit: str = \"metric\"");
    }

    #[test]
    fn literal_renders_nested_values() {
        let value = json!({"tags": [true, null], "n": 1});
        assert_eq!(literal(&value), "{\"tags\": [True, None], \"n\": 1}");
    }
}
