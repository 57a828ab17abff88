//! Tool-calling agent runtime.
//!
//! An [`Agent`] renders a system prompt advertising its tools, asks a model
//! adapter for a completion, parses the Python-style calls out of that
//! completion, and runs them against a
//! [`ToolRegistry`](agent_tools::ToolRegistry). The outcome of every call,
//! good or bad, lands in [`ExecutionResults`].
//!
//! [`BackendDispatcher`] turns an [`AgentConfig`](agent_config::AgentConfig)
//! into a ready agent by picking the model adapter and tool ranker named by
//! its `backend` field.

#![warn(missing_docs, clippy::pedantic)]

mod agent;
mod dispatch;
mod error;
mod executor;
pub mod parser;
mod results;

pub use agent::{
    Agent, CompletionObserver, Query, RunOptions, ToolCallingAgent, TracingCompletionObserver,
};
pub use dispatch::{API_BACKEND, Backend, BackendDispatcher, OLLAMA_BACKEND};
pub use error::{AgentError, AgentResult};
pub use executor::{CallOutcome, Executor};
pub use results::{ExecutionResults, FLOAT_TOLERANCE, FunctionResults};
