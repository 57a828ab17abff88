//! Hosted chat-completions adapter for OpenAI-compatible providers.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::{HyperClient, JsonPost, build_https_client, endpoint, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, CompletionRequest, ModelAdapter, PromptMessage,
};

/// A hosted provider speaking the chat-completions protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Provider {
    /// Identifier accepted in configuration.
    pub name: &'static str,
    /// API root, ending with `/`.
    pub base_url: &'static str,
    /// Environment variable holding the API key, if the provider needs one.
    pub api_key_env: Option<&'static str>,
}

/// Providers recognised by the `api` backend.
pub const PROVIDERS: &[Provider] = &[
    Provider {
        name: "openai",
        base_url: "https://api.openai.com/v1/",
        api_key_env: Some("OPENAI_API_KEY"),
    },
    Provider {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1/",
        api_key_env: Some("OPENROUTER_API_KEY"),
    },
    Provider {
        name: "together",
        base_url: "https://api.together.xyz/v1/",
        api_key_env: Some("TOGETHER_API_KEY"),
    },
    Provider {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1/",
        api_key_env: Some("GROQ_API_KEY"),
    },
    Provider {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1/",
        api_key_env: Some("DEEPSEEK_API_KEY"),
    },
    Provider {
        name: "ollama",
        base_url: "http://127.0.0.1:11434/v1/",
        api_key_env: None,
    },
];

/// Looks up a provider by name.
#[must_use]
pub fn provider(name: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|provider| provider.name == name)
}

/// Configuration for the hosted API adapter.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    provider: &'static Provider,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl ApiConfig {
    /// Creates a configuration for a known provider and model.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the provider is not in
    /// [`PROVIDERS`].
    pub fn new(provider_name: &str, model: impl Into<String>) -> AdapterResult<Self> {
        let provider = provider(provider_name).ok_or_else(|| {
            AdapterError::configuration(format!("unknown API provider `{provider_name}`"))
        })?;

        Ok(Self {
            provider,
            api_key: None,
            model: model.into(),
            base_url: provider.base_url.to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
        })
    }

    /// Loads the API key from the provider's environment variable.
    #[must_use]
    pub fn with_env_key(mut self) -> Self {
        if let Some(var) = self.provider.api_key_env {
            self.api_key = env::var(var).ok();
        }
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the provider's base URL (proxies, self-hosted gateways).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), self.provider.name)?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Adapter that calls a hosted provider's chat-completions endpoint.
pub struct ApiAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: Option<String>,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for ApiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAdapter")
            .field("provider", &self.metadata.provider())
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ApiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the provider requires an API
    /// key and none was supplied, or the endpoint is invalid.
    pub fn new(config: ApiConfig) -> AdapterResult<Self> {
        let provider = config.provider;
        if provider.api_key_env.is_some() && config.api_key.is_none() {
            return Err(AdapterError::configuration(format!(
                "provider `{}` requires an API key (set {})",
                provider.name,
                provider.api_key_env.unwrap_or_default()
            )));
        }

        Ok(Self {
            client: build_https_client()?,
            endpoint: endpoint(&config.base_url, "chat/completions", provider.name)?,
            metadata: AdapterMetadata::new(provider.name, config.model),
            api_key: config.api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages: request.messages().iter().map(ApiMessage::from).collect(),
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            stream: false,
        }
    }
}

#[async_trait]
impl ModelAdapter for ApiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn complete(&self, request: CompletionRequest) -> AdapterResult<String> {
        let payload = self.build_request(&request);
        debug!(
            provider = self.metadata.provider(),
            model = %payload.model,
            "chat completion"
        );

        let response: ChatCompletionResponse = JsonPost {
            client: &self.client,
            endpoint: &self.endpoint,
            bearer: self.api_key.as_deref(),
            timeout: self.timeout,
            label: "API",
        }
        .send(&payload)
        .await?;

        Ok(first_content(response))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&PromptMessage> for ApiMessage {
    fn from(message: &PromptMessage) -> Self {
        Self {
            role: message.role().to_string(),
            content: message.content().to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_content(response: ChatCompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.and_then(|message| message.content))
        .unwrap_or_default()
}
