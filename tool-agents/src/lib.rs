//! Tool-calling agent runtime SDK facade.
//!
//! Bundles the runtime crates behind feature flags. The tool registry is
//! always available; everything else can be switched off when an
//! application only needs part of the stack.

#![warn(missing_docs, clippy::pedantic)]

/// Tool registration and argument validation.
pub use agent_tools as tools;

/// Completion parsing, execution and backend dispatch (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Model and embedding backends (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Tool relevance ranking (enabled by `ranking` feature).
#[cfg(feature = "ranking")]
pub use agent_ranking as ranking;

/// System prompt templates (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use agent_prompts as prompts;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

/// Tracing initialisation (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Items most applications need to define tools and run an agent.
#[cfg(feature = "kernel")]
pub mod prelude {
    pub use agent_config::AgentConfig;
    pub use agent_kernel::{
        Agent, AgentError, AgentResult, BackendDispatcher, ExecutionResults, Query, RunOptions,
        ToolCallingAgent,
    };
    pub use agent_tools::{
        ParamType, ToolArguments, ToolError, ToolHandle, ToolMetadata, ToolParameter,
        ToolRegistry, ToolResult,
    };
}
