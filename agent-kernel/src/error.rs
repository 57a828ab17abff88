//! Errors surfaced by agent construction and runs.

use std::time::Duration;

use agent_adapters::traits::AdapterError;
use agent_prompts::TemplateError;
use agent_tools::ToolError;
use thiserror::Error;

/// Result alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors raised outside the per-call recovery boundary.
///
/// Failures of individual tool calls never appear here; they are recorded in
/// [`ExecutionResults::errors`](crate::ExecutionResults::errors).
#[derive(Debug, Error)]
pub enum AgentError {
    /// No backend is registered under the requested name.
    #[error("unknown backend `{name}` (available: {available})")]
    UnknownBackend {
        /// Requested backend name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// The backend needs a provider but none was configured.
    #[error("backend `{backend}` requires a provider")]
    MissingProvider {
        /// Backend that was being built.
        backend: String,
    },

    /// The configured provider is not recognised by the backend.
    #[error("unknown provider `{name}` for backend `{backend}`")]
    UnknownProvider {
        /// Requested provider.
        name: String,
        /// Backend that was being built.
        backend: String,
    },

    /// Tool registration failed.
    #[error(transparent)]
    Tool {
        /// Source tool error.
        #[from]
        source: ToolError,
    },

    /// The model backend failed to produce a completion.
    #[error("model backend error: {source}")]
    Adapter {
        /// Source adapter error.
        #[from]
        source: AdapterError,
    },

    /// The system prompt could not be rendered.
    #[error("system prompt error: {source}")]
    Template {
        /// Source template error.
        #[from]
        source: TemplateError,
    },

    /// The completion request did not finish in time.
    #[error("completion request timed out after {after:?}")]
    CompletionTimeout {
        /// Configured timeout.
        after: Duration,
    },

    /// A final answer was requested from results holding no usable value.
    #[error("execution produced no final value")]
    NoFinalValue,
}
