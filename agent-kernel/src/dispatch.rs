//! Backend selection by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use agent_adapters::api::{self, ApiAdapter, ApiConfig};
use agent_adapters::ollama::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_OLLAMA_MODEL, OllamaAdapter, OllamaConfig, OllamaEmbedder,
};
use agent_adapters::traits::{AdapterError, ModelAdapter};
use agent_config::AgentConfig;
use agent_ranking::{EmbeddingRanker, KeywordRanker, ToolRanker};
use agent_tools::ToolRegistry;
use tracing::info;

use crate::agent::Agent;
use crate::{AgentError, AgentResult};

/// Backend name for a local Ollama daemon.
pub const OLLAMA_BACKEND: &str = "ollama";
/// Backend name for hosted OpenAI-compatible providers.
pub const API_BACKEND: &str = "api";

/// A model adapter paired with the ranker that narrows its tool list.
#[derive(Clone)]
pub struct Backend {
    /// Completion source.
    pub adapter: Arc<dyn ModelAdapter>,
    /// Tool relevance ranker.
    pub ranker: Arc<dyn ToolRanker>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.adapter.metadata();
        f.debug_struct("Backend")
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .finish_non_exhaustive()
    }
}

type Constructor = dyn Fn(&AgentConfig) -> AgentResult<Backend> + Send + Sync;

/// Table of backend constructors keyed by name.
///
/// [`BackendDispatcher::default`] knows `ollama` and `api`; callers can
/// [`register`](BackendDispatcher::register) more, or replace either.
#[derive(Clone)]
pub struct BackendDispatcher {
    constructors: BTreeMap<String, Arc<Constructor>>,
}

impl fmt::Debug for BackendDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDispatcher")
            .field("backends", &self.names())
            .finish()
    }
}

impl Default for BackendDispatcher {
    fn default() -> Self {
        Self::empty()
            .register(OLLAMA_BACKEND, ollama_backend)
            .register(API_BACKEND, api_backend)
    }
}

impl BackendDispatcher {
    /// Creates a dispatcher with no backends.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers `constructor` under `name`, replacing any previous entry.
    #[must_use]
    pub fn register<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&AgentConfig) -> AgentResult<Backend> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Builds the backend named by `config.backend`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownBackend`] for unregistered names, and
    /// whatever the constructor reports otherwise.
    pub fn backend(&self, config: &AgentConfig) -> AgentResult<Backend> {
        let constructor =
            self.constructors
                .get(&config.backend)
                .ok_or_else(|| AgentError::UnknownBackend {
                    name: config.backend.clone(),
                    available: self.names().join(", "),
                })?;
        let backend = constructor(config)?;
        let metadata = backend.adapter.metadata();
        info!(
            backend = %config.backend,
            provider = metadata.provider(),
            model = metadata.model(),
            "backend ready"
        );
        Ok(backend)
    }

    /// Builds an [`Agent`] for `config` over `tools`.
    ///
    /// # Errors
    ///
    /// Propagates [`BackendDispatcher::backend`] errors.
    pub fn build_agent(&self, config: &AgentConfig, tools: ToolRegistry) -> AgentResult<Agent> {
        let Backend { adapter, ranker } = self.backend(config)?;
        Ok(Agent::new(adapter, tools)
            .with_ranker(ranker)
            .with_config(config))
    }
}

fn ollama_config(model: &str, config: &AgentConfig) -> AgentResult<OllamaConfig> {
    let ollama = OllamaConfig::new(model).with_default_temperature(config.temperature);
    Ok(match &config.base_url {
        Some(url) => ollama.with_base_url(url)?,
        None => ollama,
    })
}

fn embedding_ranker(embedder: OllamaConfig) -> AgentResult<Arc<dyn ToolRanker>> {
    let embedder = OllamaEmbedder::new(embedder)?;
    Ok(Arc::new(EmbeddingRanker::new(Arc::new(embedder))))
}

fn ollama_backend(config: &AgentConfig) -> AgentResult<Backend> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
    let embedding_model = config
        .embedding_model
        .as_deref()
        .unwrap_or(DEFAULT_EMBEDDING_MODEL);
    Ok(Backend {
        adapter: Arc::new(OllamaAdapter::new(ollama_config(model, config)?)?),
        ranker: embedding_ranker(ollama_config(embedding_model, config)?)?,
    })
}

/// Hosted providers rank tools by keyword overlap, except `ollama`, whose
/// daemon also serves embeddings.
fn api_backend(config: &AgentConfig) -> AgentResult<Backend> {
    let provider = config
        .provider
        .as_deref()
        .ok_or_else(|| AgentError::MissingProvider {
            backend: API_BACKEND.to_owned(),
        })?;
    if api::provider(provider).is_none() {
        return Err(AgentError::UnknownProvider {
            name: provider.to_owned(),
            backend: API_BACKEND.to_owned(),
        });
    }
    let model = config.model.as_deref().ok_or_else(|| {
        AdapterError::configuration(format!("provider `{provider}` requires a model"))
    })?;

    let mut api_config = ApiConfig::new(provider, model)?
        .with_env_key()
        .with_default_temperature(config.temperature);
    if let Some(key) = &config.api_key {
        api_config = api_config.with_api_key(key.clone());
    }
    if let Some(url) = &config.base_url {
        api_config = api_config.with_base_url(url)?;
    }

    let ranker: Arc<dyn ToolRanker> = if provider == "ollama" {
        embedding_ranker(api_embedder_config(config)?)?
    } else {
        Arc::new(KeywordRanker::new())
    };

    Ok(Backend {
        adapter: Arc::new(ApiAdapter::new(api_config)?),
        ranker,
    })
}

/// Embedder settings for the `api` backend's `ollama` provider. A configured
/// base URL points at the OpenAI-compatible `/v1/` root of the same daemon
/// that serves `/api/embed`.
fn api_embedder_config(config: &AgentConfig) -> AgentResult<OllamaConfig> {
    let embedding_model = config
        .embedding_model
        .as_deref()
        .unwrap_or(DEFAULT_EMBEDDING_MODEL);
    let embedder = OllamaConfig::new(embedding_model);
    Ok(match &config.base_url {
        Some(url) => embedder.with_base_url(daemon_root(url))?,
        None => embedder,
    })
}

fn daemon_root(api_base: &str) -> &str {
    let trimmed = api_base.trim().trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed)
}
