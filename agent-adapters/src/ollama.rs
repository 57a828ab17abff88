//! `Ollama` chat and embedding adapters for a local model server.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::{HyperClient, JsonPost, build_https_client, endpoint, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, CompletionRequest, EmbeddingAdapter,
    ModelAdapter, PromptMessage,
};

/// Default address of a locally running Ollama daemon.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434/";

/// Chat model pulled by default for tool calling.
pub const DEFAULT_OLLAMA_MODEL: &str = "driaforall/tiny-agent-a:3b";

/// Embedding model used for tool relevance ranking.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Configuration for the `Ollama` adapters.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    timeout: Duration,
}

impl OllamaConfig {
    /// Creates a configuration for the supplied model using default settings.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_owned(),
            model: model.into(),
            default_temperature: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Overrides the base URL of the local Ollama daemon.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "Ollama")?;
        Ok(self)
    }

    /// Sets the sampling temperature used when the request does not provide
    /// one explicitly.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP timeout for requests to the Ollama daemon.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured base URL (always ends with `/`).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// `Ollama` chat adapter calling `/api/chat` without streaming.
pub struct OllamaAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OllamaAdapter {
    /// Constructs a new adapter from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid or the HTTP
    /// client cannot be constructed.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: OllamaConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: build_https_client()?,
            endpoint: endpoint(&config.base_url, "api/chat", "Ollama")?,
            metadata: AdapterMetadata::new("ollama", config.model.clone()),
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        let temperature = request.temperature().or(self.default_temperature);
        let options = (temperature.is_some() || request.max_output_tokens().is_some()).then(|| {
            ChatOptions {
                temperature,
                max_output_tokens: request.max_output_tokens(),
            }
        });

        ChatRequest {
            model: self.metadata.model().to_owned(),
            stream: false,
            messages: request.messages().iter().map(ChatMessage::from).collect(),
            options,
        }
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn complete(&self, request: CompletionRequest) -> AdapterResult<String> {
        let payload = self.build_request(&request);
        debug!(model = %payload.model, messages = payload.messages.len(), "ollama chat");

        let response: ChatResponse = JsonPost {
            client: &self.client,
            endpoint: &self.endpoint,
            bearer: None,
            timeout: self.timeout,
            label: "Ollama",
        }
        .send(&payload)
        .await?;

        if let Some(error) = response.error {
            return Err(AdapterError::Response { reason: error });
        }

        Ok(response
            .message
            .map(|message| message.content)
            .or(response.response)
            .unwrap_or_default())
    }
}

/// `Ollama` embedding adapter calling `/api/embed`.
pub struct OllamaEmbedder {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    timeout: Duration,
}

impl fmt::Debug for OllamaEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaEmbedder")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OllamaEmbedder {
    /// Constructs an embedder; the configured model must be an embedding model.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: OllamaConfig) -> AdapterResult<Self> {
        Ok(Self {
            client: build_https_client()?,
            endpoint: endpoint(&config.base_url, "api/embed", "Ollama")?,
            metadata: AdapterMetadata::new("ollama", config.model.clone()),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl EmbeddingAdapter for OllamaEmbedder {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn embed(&self, inputs: &[String]) -> AdapterResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbedRequest {
            model: self.metadata.model(),
            input: inputs,
        };
        let response: EmbedResponse = JsonPost {
            client: &self.client,
            endpoint: &self.endpoint,
            bearer: None,
            timeout: self.timeout,
            label: "Ollama embed",
        }
        .send(&payload)
        .await?;

        if let Some(error) = response.error {
            return Err(AdapterError::Response { reason: error });
        }
        if response.embeddings.len() != inputs.len() {
            return Err(AdapterError::Response {
                reason: format!(
                    "expected {} embeddings, received {}",
                    inputs.len(),
                    response.embeddings.len()
                ),
            });
        }
        Ok(response.embeddings)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&PromptMessage> for ChatMessage {
    fn from(message: &PromptMessage) -> Self {
        Self {
            role: message.role().to_string(),
            content: message.content().to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "num_predict")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_base_url_without_scheme() {
        let err = OllamaConfig::new("gemma")
            .with_base_url("localhost:11434")
            .expect_err("missing scheme should error");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn chat_response_parsing_prefers_message() {
        let json = r#"{
            "message": {"role": "assistant", "content": "hi"},
            "response": "ignored"
        }"#;

        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.message.unwrap().content, "hi");
    }

    #[test]
    fn build_request_respects_defaults() {
        let config = OllamaConfig::new(DEFAULT_OLLAMA_MODEL).with_default_temperature(0.1);
        let adapter = OllamaAdapter::new(config).expect("adapter");
        let request = CompletionRequest::new(vec![
            PromptMessage::system("tools"),
            PromptMessage::user("hello"),
        ])
        .unwrap();

        let chat = adapter.build_request(&request);
        assert_eq!(chat.model, DEFAULT_OLLAMA_MODEL);
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert!(!chat.stream);
        assert_eq!(chat.options.and_then(|o| o.temperature), Some(0.1));
    }

    #[test]
    fn build_request_omits_empty_options() {
        let adapter = OllamaAdapter::new(OllamaConfig::new("gemma")).expect("adapter");
        let request = CompletionRequest::new(vec![PromptMessage::user("hello")]).unwrap();
        assert!(adapter.build_request(&request).options.is_none());
    }

    #[test]
    fn embed_response_parsing() {
        let json = r#"{"model": "nomic-embed-text", "embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#;
        let parsed: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert!(parsed.error.is_none());
    }
}
