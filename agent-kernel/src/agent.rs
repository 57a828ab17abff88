//! The tool-calling agent: prompt, completion, execution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agent_adapters::traits::{
    AdapterMetadata, CompletionRequest, MessageRole, ModelAdapter, PromptMessage,
};
use agent_config::AgentConfig;
use agent_prompts::SystemPrompt;
use agent_ranking::{ToolDescriptor, ToolRanker};
use agent_tools::ToolRegistry;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::executor::Executor;
use crate::parser::parse_completion;
use crate::results::ExecutionResults;
use crate::{AgentError, AgentResult};

/// What the user asked: a single message or a whole conversation.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// A single user message.
    Text(String),
    /// A conversation; the system prompt is prepended to it.
    Messages(Vec<PromptMessage>),
}

impl Query {
    fn into_messages(self) -> Vec<PromptMessage> {
        match self {
            Self::Text(text) => vec![PromptMessage::user(text)],
            Self::Messages(messages) => messages,
        }
    }

    /// Text used to rank tools: the query itself, or the latest user
    /// message of a conversation.
    #[must_use]
    pub fn search_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Messages(messages) => messages
                .iter()
                .rev()
                .find(|message| message.role() == MessageRole::User)
                .map_or("", PromptMessage::content),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<PromptMessage>> for Query {
    fn from(messages: Vec<PromptMessage>) -> Self {
        Self::Messages(messages)
    }
}

/// Per-run switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Return the completion without parsing or executing it.
    pub dry_run: bool,
    /// Hand the completion to the agent's [`CompletionObserver`].
    pub show_completion: bool,
    /// Advertise at most this many tools, picked by the ranker.
    pub num_tools: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            show_completion: true,
            num_tools: None,
        }
    }
}

impl RunOptions {
    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets whether the completion is shown to the observer.
    #[must_use]
    pub const fn with_show_completion(mut self, show: bool) -> Self {
        self.show_completion = show;
        self
    }

    /// Limits the number of tools advertised in the prompt.
    #[must_use]
    pub const fn with_num_tools(mut self, limit: usize) -> Self {
        self.num_tools = Some(limit);
        self
    }
}

impl From<&AgentConfig> for RunOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            show_completion: config.show_completion,
            num_tools: config.num_tools,
        }
    }
}

/// Capability every backend-driven agent offers.
#[async_trait]
pub trait ToolCallingAgent: Send + Sync {
    /// Answers `query` by asking the model for tool calls and running them.
    ///
    /// # Errors
    ///
    /// Fails only when no completion could be obtained (backend error,
    /// timeout, prompt rendering). Failures of individual calls are reported
    /// in [`ExecutionResults::errors`].
    async fn run(&self, query: Query, options: RunOptions) -> AgentResult<ExecutionResults>;
}

/// Receives each completion when `show_completion` is set.
pub trait CompletionObserver: Send + Sync {
    /// Called with the raw completion before it is parsed.
    fn on_completion(&self, model: &AdapterMetadata, completion: &str);
}

/// Observer that logs completions through `tracing`.
#[derive(Debug, Default)]
pub struct TracingCompletionObserver;

impl CompletionObserver for TracingCompletionObserver {
    fn on_completion(&self, model: &AdapterMetadata, completion: &str) {
        info!(
            provider = model.provider(),
            model = model.model(),
            "agent response\n{completion}"
        );
    }
}

/// Agent backed by a [`ModelAdapter`] and a fixed tool registry.
pub struct Agent {
    adapter: Arc<dyn ModelAdapter>,
    ranker: Option<Arc<dyn ToolRanker>>,
    executor: Executor,
    prompt: SystemPrompt,
    observer: Arc<dyn CompletionObserver>,
    temperature: f32,
    max_output_tokens: Option<u32>,
    completion_timeout: Option<Duration>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.adapter.metadata();
        f.debug_struct("Agent")
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .field("tools", &self.executor.tools().names())
            .field("ranker_configured", &self.ranker.is_some())
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Creates an agent with the default system prompt and temperature 0.
    #[must_use]
    pub fn new(adapter: Arc<dyn ModelAdapter>, tools: ToolRegistry) -> Self {
        Self {
            adapter,
            ranker: None,
            executor: Executor::new(Arc::new(tools)),
            prompt: SystemPrompt::default(),
            observer: Arc::new(TracingCompletionObserver),
            temperature: 0.0,
            max_output_tokens: None,
            completion_timeout: None,
        }
    }

    /// Applies the sampling settings and timeout from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.temperature = config.temperature;
        self.max_output_tokens = config.max_output_tokens;
        self.completion_timeout = config.completion_timeout();
        self
    }

    /// Installs the ranker used when a run limits the number of tools.
    #[must_use]
    pub fn with_ranker(mut self, ranker: Arc<dyn ToolRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Replaces the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: SystemPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    /// Replaces the completion observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Aborts the completion request after `timeout`.
    #[must_use]
    pub const fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = Some(timeout);
        self
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        self.executor.tools()
    }

    /// Returns the adapter metadata.
    #[must_use]
    pub fn metadata(&self) -> &AdapterMetadata {
        self.adapter.metadata()
    }

    /// Signatures to advertise: every tool, or the ranker's top `limit`.
    /// A failing or missing ranker falls back to the full set.
    async fn advertised_tools(&self, query: &str, limit: Option<usize>) -> Vec<String> {
        let tools = self.executor.tools();
        let Some(limit) = limit.filter(|limit| *limit < tools.len()) else {
            return tools.describe();
        };
        let Some(ranker) = &self.ranker else {
            warn!(limit, "no tool ranker configured; advertising every tool");
            return tools.describe();
        };

        let descriptors: Vec<ToolDescriptor> = tools
            .descriptors()
            .into_iter()
            .map(|(name, description)| ToolDescriptor::new(name, description))
            .collect();
        match ranker.rank(query, &descriptors, limit).await {
            Ok(names) => {
                debug!(selected = ?names, "narrowed tool set");
                tools.describe_subset(&names)
            }
            Err(err) => {
                warn!(error = %err, "tool ranking failed; advertising every tool");
                tools.describe()
            }
        }
    }

    async fn complete(&self, request: CompletionRequest) -> AgentResult<String> {
        let completion = self.adapter.complete(request);
        match self.completion_timeout {
            Some(after) => tokio::time::timeout(after, completion)
                .await
                .map_err(|_| AgentError::CompletionTimeout { after })?
                .map_err(AgentError::from),
            None => completion.await.map_err(AgentError::from),
        }
    }
}

#[async_trait]
impl ToolCallingAgent for Agent {
    async fn run(&self, query: Query, options: RunOptions) -> AgentResult<ExecutionResults> {
        let signatures = self
            .advertised_tools(query.search_text(), options.num_tools)
            .await;
        let system = self.prompt.render(&signatures)?;

        let mut messages = query.into_messages();
        messages.insert(0, PromptMessage::system(system));
        let mut request = CompletionRequest::new(messages)?.with_temperature(self.temperature);
        if let Some(tokens) = self.max_output_tokens {
            request = request.with_max_output_tokens(tokens);
        }

        let completion = self.complete(request).await?;
        if options.show_completion {
            self.observer
                .on_completion(self.adapter.metadata(), &completion);
        }
        if options.dry_run {
            return Ok(ExecutionResults::dry(completion));
        }

        let calls = parse_completion(&completion);
        debug!(calls = calls.len(), "parsed completion");
        let outcomes = self.executor.execute(calls).await;
        Ok(ExecutionResults::aggregate(completion, outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_uses_latest_user_message() {
        let query = Query::from(vec![
            PromptMessage::user("first question"),
            PromptMessage::new(MessageRole::Assistant, "an answer"),
            PromptMessage::user("follow-up about weather"),
            PromptMessage::new(MessageRole::Assistant, "thinking"),
        ]);
        assert_eq!(query.search_text(), "follow-up about weather");
        assert_eq!(Query::from("plain").search_text(), "plain");
        assert_eq!(Query::Messages(Vec::new()).search_text(), "");
    }

    #[test]
    fn run_options_follow_config() {
        let config = AgentConfig {
            dry_run: true,
            show_completion: false,
            num_tools: Some(2),
            ..AgentConfig::default()
        };
        assert_eq!(
            RunOptions::from(&config),
            RunOptions::default()
                .with_dry_run(true)
                .with_show_completion(false)
                .with_num_tools(2)
        );
        assert!(RunOptions::default().show_completion);
    }
}
