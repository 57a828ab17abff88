//! Sequential execution of parsed calls.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agent_tools::{ToolError, ToolRegistry, ToolResult};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::parser::{Expr, ParsedCall, ParsedItem};

/// Outcome of a single call: its value or the reason it failed.
#[derive(Clone, Debug, PartialEq)]
pub struct CallOutcome {
    /// Variable the result was assigned to, if any.
    pub binding: Option<String>,
    /// Function the call named; empty when the name could not be parsed.
    pub function_name: String,
    /// Tool output, or the error message.
    pub outcome: Result<Value, String>,
}

impl CallOutcome {
    /// Returns the value when the call succeeded.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// Returns the error message when the call failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(String::as_str)
    }
}

/// Runs parsed calls against a tool registry, one at a time and in order.
///
/// Every failure (unparseable call, unknown tool, invalid arguments, a tool
/// returning an error or panicking) is captured in that call's
/// [`CallOutcome`]; the remaining calls still run.
#[derive(Clone)]
pub struct Executor {
    tools: Arc<ToolRegistry>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("tools", &self.tools.names())
            .finish()
    }
}

impl Executor {
    /// Creates an executor over the supplied registry.
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Returns the registry calls are resolved against.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Executes `calls` in order. Results of bound calls are visible to
    /// later calls through variable references.
    pub async fn execute(&self, calls: Vec<ParsedItem>) -> Vec<CallOutcome> {
        let mut scope: HashMap<String, Value> = HashMap::new();
        let mut outcomes = Vec::with_capacity(calls.len());
        for item in calls {
            let outcome = match item {
                Ok(call) => self.execute_call(call, &mut scope).await,
                Err(failure) => {
                    warn!(
                        function = %failure.function_name,
                        reason = %failure.message,
                        "skipping unparseable call"
                    );
                    CallOutcome {
                        binding: None,
                        outcome: Err(failure.to_string()),
                        function_name: failure.function_name,
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn execute_call(
        &self,
        call: ParsedCall,
        scope: &mut HashMap<String, Value>,
    ) -> CallOutcome {
        let ParsedCall {
            function_name,
            positional,
            keyword,
            binding,
        } = call;

        let result = self
            .invoke(&function_name, &positional, &keyword, scope)
            .await;
        match &result {
            Ok(value) => {
                debug!(function = %function_name, binding = ?binding, "tool call succeeded");
                if let Some(binding) = &binding {
                    scope.insert(binding.clone(), value.clone());
                }
            }
            Err(err) => warn!(function = %function_name, error = %err, "tool call failed"),
        }

        CallOutcome {
            binding,
            function_name,
            outcome: result.map_err(|err| err.to_string()),
        }
    }

    async fn invoke(
        &self,
        name: &str,
        positional: &[Expr],
        keyword: &[(String, Expr)],
        scope: &HashMap<String, Value>,
    ) -> ToolResult<Value> {
        let handle = self.tools.resolve(name)?;

        let invalid = |reason: String| ToolError::InvalidArguments {
            name: name.to_owned(),
            reason,
        };
        let positional = positional
            .iter()
            .map(|expr| expr.evaluate(scope))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let keyword = keyword
            .iter()
            .map(|(key, expr)| expr.evaluate(scope).map(|value| (key.clone(), value)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let arguments = handle.metadata().validate(positional, keyword)?;

        match AssertUnwindSafe(handle.invoke(arguments)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ToolError::execution(format!(
                "tool panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
