//! Tool declaration and registry utilities.
//!
//! Tools are declared explicitly: a [`registry::ToolMetadata`] carries the
//! name, description and ordered [`schema::ToolParameter`] list, and a
//! [`registry::Tool`] implementation performs the call. The
//! [`registry::ToolRegistry`] freezes a set of tools for the lifetime of an
//! agent and validates model-supplied arguments against their schemas.

#![warn(missing_docs, clippy::pedantic)]

pub mod registry;
pub mod schema;

pub use registry::{
    Tool, ToolArguments, ToolError, ToolHandle, ToolMetadata, ToolRegistry, ToolResult,
};
pub use schema::{ParamType, ToolParameter};
