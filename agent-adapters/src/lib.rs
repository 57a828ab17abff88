//! Completion and embedding backends used by agents.
//!
//! Each module exposes implementations for a specific backend while sharing
//! the trait-based interface defined in [`traits`]: [`ollama`] talks to a
//! local model server, [`api`] to hosted OpenAI-compatible providers.

#![warn(missing_docs, clippy::pedantic)]

pub mod api;
pub mod ollama;
pub mod traits;

mod http_client;
