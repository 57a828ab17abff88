//! Runtime registry for tool metadata and execution.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::schema::{ParamType, ToolParameter};

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Validated, named arguments handed to a tool implementation.
pub type ToolArguments = Map<String, Value>;

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<ToolParameter>,
    #[serde(default)]
    returns: ParamType,
}

impl ToolMetadata {
    /// Creates metadata for the supplied tool name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if the name is empty or is not a
    /// valid identifier (models address tools by writing the name as a call).
    pub fn new(name: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool name cannot be empty".into(),
            });
        }
        if !is_identifier(&name) {
            return Err(ToolError::InvalidMetadata {
                reason: format!("tool name `{name}` is not a valid identifier"),
            });
        }

        Ok(Self {
            name,
            description: None,
            parameters: Vec::new(),
            returns: ParamType::Any,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a parameter. Parameters keep their declaration order, which is
    /// also the order positional arguments bind to.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] when the parameter name is not
    /// an identifier or is already declared.
    pub fn with_parameter(mut self, parameter: ToolParameter) -> ToolResult<Self> {
        if !is_identifier(parameter.name()) {
            return Err(ToolError::InvalidMetadata {
                reason: format!("parameter `{}` is not a valid identifier", parameter.name()),
            });
        }
        if self.parameter(parameter.name()).is_some() {
            return Err(ToolError::InvalidMetadata {
                reason: format!(
                    "parameter `{}` declared twice on `{}`",
                    parameter.name(),
                    self.name
                ),
            });
        }
        self.parameters.push(parameter);
        Ok(self)
    }

    /// Sets the advertised return type.
    #[must_use]
    pub fn with_returns(mut self, returns: ParamType) -> Self {
        self.returns = returns;
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the declared parameters in order.
    #[must_use]
    pub fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|param| param.name() == name)
    }

    /// Returns the advertised return type.
    #[must_use]
    pub const fn returns(&self) -> ParamType {
        self.returns
    }

    /// Binds positional and keyword arguments onto the declared parameters.
    ///
    /// Positional values bind in declaration order; keywords bind by name.
    /// Omitted optional parameters take their declared default.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] for surplus positional values,
    /// an argument supplied twice, unknown keywords, missing required
    /// parameters, or values of the wrong type.
    pub fn validate(
        &self,
        positional: Vec<Value>,
        keyword: Vec<(String, Value)>,
    ) -> ToolResult<ToolArguments> {
        if positional.len() > self.parameters.len() {
            return Err(self.invalid(format!(
                "takes {} argument(s) but {} positional were given",
                self.parameters.len(),
                positional.len()
            )));
        }

        let mut supplied: HashMap<String, Value> = HashMap::new();
        for (param, value) in self.parameters.iter().zip(positional) {
            supplied.insert(param.name().to_owned(), value);
        }

        for (name, value) in keyword {
            if self.parameter(&name).is_none() {
                return Err(self.invalid(format!("unexpected argument `{name}`")));
            }
            if supplied.contains_key(&name) {
                return Err(self.invalid(format!("multiple values for argument `{name}`")));
            }
            supplied.insert(name, value);
        }

        let mut arguments = ToolArguments::new();
        for param in &self.parameters {
            let value = match supplied.remove(param.name()) {
                Some(value) => value,
                None if param.is_required() => {
                    return Err(
                        self.invalid(format!("missing required argument `{}`", param.name()))
                    );
                }
                None => param.default_value().cloned().unwrap_or(Value::Null),
            };

            if !param.accepts(&value) {
                return Err(self.invalid(format!(
                    "argument `{}` expects {} but got {}",
                    param.name(),
                    param.ty(),
                    json_type_name(&value)
                )));
            }
            arguments.insert(param.name().to_owned(), value);
        }

        Ok(arguments)
    }

    /// Renders the signature and docstring advertised to the model.
    #[must_use]
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(ToolParameter::signature).collect();
        let mut out = format!(
            "def {}({}) -> {}:",
            self.name,
            params.join(", "),
            self.returns
        );

        let documented: Vec<&ToolParameter> = self
            .parameters
            .iter()
            .filter(|param| param.description().is_some())
            .collect();

        if self.description.is_none() && documented.is_empty() {
            out.push_str("\n    ...");
            return out;
        }

        out.push_str("\n    \"\"\"");
        if let Some(description) = &self.description {
            out.push_str(description.trim());
        }
        if !documented.is_empty() {
            out.push_str("\n\n    Args:");
            for param in documented {
                out.push_str(&format!(
                    "\n        {}: {}",
                    param.name(),
                    param.description().unwrap_or_default()
                ));
            }
        }
        out.push_str("\n    \"\"\"");
        out
    }

    fn invalid(&self, reason: String) -> ToolError {
        ToolError::InvalidArguments {
            name: self.name.clone(),
            reason,
        }
    }
}

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with validated arguments, returning JSON output.
    async fn invoke(&self, arguments: ToolArguments) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(ToolArguments) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, arguments: ToolArguments) -> ToolResult<Value> {
        (self)(arguments).await
    }
}

/// A registered tool: immutable metadata plus its implementation.
#[derive(Clone)]
pub struct ToolHandle {
    metadata: ToolMetadata,
    executor: Arc<dyn Tool>,
}

impl fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandle")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl ToolHandle {
    /// Pairs metadata with an implementation.
    #[must_use]
    pub fn new<T>(metadata: ToolMetadata, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        Self {
            metadata,
            executor: Arc::new(tool),
        }
    }

    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Executes the underlying tool implementation.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the implementation.
    pub async fn invoke(&self, arguments: ToolArguments) -> ToolResult<Value> {
        self.executor.invoke(arguments).await
    }
}

/// Closed, read-only set of tools keyed by name.
///
/// Registration order is preserved so that prompts built from
/// [`ToolRegistry::describe`] are identical across runs.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolHandle>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Builds a registry from the supplied tools.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if two tools share a name.
    pub fn register<I>(tools: I) -> ToolResult<Self>
    where
        I: IntoIterator<Item = ToolHandle>,
    {
        let mut registry = Self::default();
        for tool in tools {
            let name = tool.name().to_owned();
            if registry.index.contains_key(&name) {
                return Err(ToolError::DuplicateTool { name });
            }
            debug!(tool = %name, "registering tool");
            registry.index.insert(name, registry.tools.len());
            registry.tools.push(tool);
        }
        Ok(registry)
    }

    /// Returns the tool matching the supplied name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the name is not registered.
    pub fn resolve(&self, name: &str) -> ToolResult<&ToolHandle> {
        self.index
            .get(name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_owned(),
            })
    }

    /// Returns whether a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Renders every tool signature in registration order.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| tool.metadata().signature())
            .collect()
    }

    /// Renders the signatures of the named tools, still in registration order.
    /// Names that are not registered are skipped.
    #[must_use]
    pub fn describe_subset(&self, names: &[String]) -> Vec<String> {
        self.tools
            .iter()
            .filter(|tool| names.iter().any(|name| name == tool.name()))
            .map(|tool| tool.metadata().signature())
            .collect()
    }

    /// Returns `(name, description)` pairs for relevance ranking.
    #[must_use]
    pub fn descriptors(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|tool| {
                let metadata = tool.metadata();
                (
                    metadata.name().to_owned(),
                    metadata.description().unwrap_or_default().to_owned(),
                )
            })
            .collect()
    }

    /// Returns the registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(ToolHandle::name).collect()
    }

    /// Iterates over the registered tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolHandle> {
        self.tools.iter()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Supplied arguments do not match the tool's parameter schema.
    #[error("invalid arguments for `{name}`: {reason}")]
    InvalidArguments {
        /// Name of the tool being called.
        name: String,
        /// What was wrong with the arguments.
        reason: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn currency() -> ToolHandle {
        let metadata = ToolMetadata::new("convert_currency")
            .unwrap()
            .with_description("Converts an amount between currencies.")
            .with_parameter(
                ToolParameter::required("amount", ParamType::Number)
                    .with_description("The amount of money to convert."),
            )
            .unwrap()
            .with_parameter(ToolParameter::required("from_currency", ParamType::String))
            .unwrap()
            .with_parameter(ToolParameter::required("to_currency", ParamType::String))
            .unwrap()
            .with_returns(ParamType::String);

        ToolHandle::new(metadata, |args: ToolArguments| async move {
            Ok(json!(format!(
                "{} {} -> {}",
                args["amount"], args["from_currency"], args["to_currency"]
            )))
        })
    }

    fn weather() -> ToolHandle {
        let metadata = ToolMetadata::new("get_weather")
            .unwrap()
            .with_parameter(ToolParameter::required("location", ParamType::String))
            .unwrap()
            .with_parameter(ToolParameter::optional("celsius", ParamType::Boolean, false))
            .unwrap();
        ToolHandle::new(metadata, |args: ToolArguments| async move {
            Ok(Value::Object(args))
        })
    }

    #[tokio::test]
    async fn resolve_returns_registered_tool() {
        let registry = ToolRegistry::register(vec![currency(), weather()]).unwrap();
        let handle = registry.resolve("get_weather").unwrap();
        assert_eq!(handle.name(), "get_weather");

        let args = handle
            .metadata()
            .validate(vec![json!("Paris")], Vec::new())
            .unwrap();
        let output = handle.invoke(args).await.unwrap();
        assert_eq!(output, json!({"location": "Paris", "celsius": false}));
    }

    #[test]
    fn duplicate_registration_errors() {
        let err = ToolRegistry::register(vec![currency(), currency()])
            .expect_err("duplicate registration should fail");
        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "convert_currency"));
    }

    #[test]
    fn unknown_tool_errors() {
        let registry = ToolRegistry::register(vec![currency()]).unwrap();
        let err = registry.resolve("missing").expect_err("unknown tool");
        assert!(matches!(err, ToolError::UnknownTool { name } if name == "missing"));
    }

    #[test]
    fn invalid_metadata_errors() {
        let err = ToolMetadata::new("").expect_err("empty name should error");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolMetadata::new("get weather").expect_err("spaces are not identifiers");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolMetadata::new("echo")
            .unwrap()
            .with_parameter(ToolParameter::required("x", ParamType::Any))
            .unwrap()
            .with_parameter(ToolParameter::required("x", ParamType::Any))
            .expect_err("duplicate parameter");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));
    }

    #[test]
    fn describe_keeps_registration_order() {
        let registry = ToolRegistry::register(vec![weather(), currency()]).unwrap();
        let described = registry.describe();
        assert_eq!(described.len(), 2);
        assert!(described[0].starts_with("def get_weather(location: str, celsius: bool = False)"));
        assert!(described[1].starts_with(
            "def convert_currency(amount: float, from_currency: str, to_currency: str) -> str:"
        ));
        assert!(described[1].contains("amount: The amount of money to convert."));
        assert_eq!(registry.describe(), described);
    }

    #[test]
    fn describe_subset_filters_names() {
        let registry = ToolRegistry::register(vec![weather(), currency()]).unwrap();
        let subset = registry.describe_subset(&["convert_currency".to_owned(), "nope".to_owned()]);
        assert_eq!(subset.len(), 1);
        assert!(subset[0].starts_with("def convert_currency"));
    }

    #[test]
    fn validate_applies_defaults_and_keywords() {
        let registry = ToolRegistry::register(vec![weather()]).unwrap();
        let metadata = registry.resolve("get_weather").unwrap().metadata();

        let args = metadata
            .validate(Vec::new(), vec![("location".into(), json!("Oslo"))])
            .unwrap();
        assert_eq!(args["celsius"], json!(false));

        let args = metadata
            .validate(
                vec![json!("Oslo")],
                vec![("celsius".into(), json!(true))],
            )
            .unwrap();
        assert_eq!(args["celsius"], json!(true));
    }

    #[test]
    fn validate_rejects_bad_arguments() {
        let registry = ToolRegistry::register(vec![currency()]).unwrap();
        let metadata = registry.resolve("convert_currency").unwrap().metadata();

        let missing = metadata
            .validate(vec![json!(10)], Vec::new())
            .expect_err("missing required");
        assert!(missing.to_string().contains("missing required argument `from_currency`"));

        let unknown = metadata
            .validate(
                vec![json!(10), json!("USD"), json!("EUR")],
                vec![("fee".into(), json!(1))],
            )
            .expect_err("unknown keyword");
        assert!(unknown.to_string().contains("unexpected argument `fee`"));

        let twice = metadata
            .validate(
                vec![json!(10), json!("USD"), json!("EUR")],
                vec![("amount".into(), json!(5))],
            )
            .expect_err("duplicate argument");
        assert!(twice.to_string().contains("multiple values"));

        let wrong_type = metadata
            .validate(vec![json!("ten"), json!("USD"), json!("EUR")], Vec::new())
            .expect_err("type mismatch");
        assert!(matches!(wrong_type, ToolError::InvalidArguments { .. }));
        assert!(wrong_type.to_string().contains("expects float but got str"));

        let surplus = metadata
            .validate(
                vec![json!(1), json!("USD"), json!("EUR"), json!("extra")],
                Vec::new(),
            )
            .expect_err("too many positional");
        assert!(matches!(surplus, ToolError::InvalidArguments { .. }));
    }
}
