use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use serde_json::{Map, Value};

use mongogenius_core::{AiSettings, InvocationError, OutputShape};

use crate::{parse, prompt};

/// The generative-model service. One call, one complete reply.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, InvocationError>;
}

/// Declare `shape` to the model, send `prompt` once and check the reply.
pub async fn invoke(
    client: &dyn ModelClient,
    prompt: &str,
    shape: &OutputShape,
) -> Result<Map<String, Value>, InvocationError> {
    let system = prompt::system_prompt(shape);
    let raw = client.generate(&system, prompt).await?;
    tracing::debug!(shape = shape.name, bytes = raw.len(), "model replied");
    parse::conform(&raw, shape)
}

fn map_backend(provider: &str) -> Result<LLMBackend, InvocationError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(InvocationError::UnknownProvider(other.to_string())),
    }
}

/// Fail with `InvocationError::Timeout` if `fut` does not finish within `limit`.
async fn within<F, T>(limit: Duration, fut: F) -> Result<T, InvocationError>
where
    F: Future<Output = Result<T, InvocationError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| InvocationError::Timeout(limit))?
}

/// `ModelClient` backed by the `llm` crate. The provider is built per call
/// from the settings it was created with.
#[derive(Debug, Clone)]
pub struct LlmClient {
    settings: AiSettings,
}

impl LlmClient {
    pub fn new(settings: AiSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, InvocationError> {
        let settings = &self.settings;
        let backend = map_backend(&settings.provider)?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&settings.model)
            .system(system);

        if !settings.api_key.is_empty() {
            builder = builder.api_key(&settings.api_key);
        }
        if let Some(url) = &settings.base_url {
            builder = builder.base_url(url);
        }

        let llm = builder
            .build()
            .map_err(|e| InvocationError::Build(e.to_string()))?;

        let messages = vec![ChatMessage::user().content(prompt).build()];

        tracing::info!("sending to {} ({})", settings.provider, settings.model);

        let text = within(settings.timeout(), async {
            let response = llm
                .chat(&messages)
                .await
                .map_err(|e| InvocationError::Transport(e.to_string()))?;
            Ok(response.text())
        })
        .await?;

        match text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(InvocationError::EmptyResponse),
        }
    }
}
