//! Prompt construction for tool-calling agents.
//!
//! [`template`] provides `{{variable}}` substitution; [`system`] holds the
//! system prompt that lists the available tool signatures.

#![warn(missing_docs, clippy::pedantic)]

pub mod system;
pub mod template;

pub use system::{DEFAULT_SYSTEM_PROMPT, FUNCTIONS_SCHEMA_VAR, SystemPrompt};
pub use template::{PromptTemplate, TemplateError, TemplateResult};
