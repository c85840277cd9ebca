use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::http::{default_client, error_for_status};
use crate::models::{ChatMessage, Generation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Hosted chat-completion capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Returns every candidate the provider produced, in provider order.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation, ProviderError>;

    /// Checks the credential without generating anything.
    async fn verify(&self) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "is_single")]
    n: u8,
}

fn is_single(n: &u8) -> bool {
    *n == 1
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    index: usize,
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Groq's OpenAI-compatible chat completions API.
pub struct GroqChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    candidate_count: u8,
}

impl std::fmt::Debug for GroqChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqChatModel")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("candidate_count", &self.candidate_count)
            .finish()
    }
}

impl GroqChatModel {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: default_client(config.timeout)?,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            candidate_count: config.candidate_count,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn transport(&self, error: reqwest::Error) -> ProviderError {
        ProviderError::from_transport(self.name(), error)
    }
}

#[async_trait]
impl LanguageModel for GroqChatModel {
    fn name(&self) -> &str {
        "groq"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            n: self.candidate_count,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        let status = response.status();
        let text = response.text().await.map_err(|error| self.transport(error))?;

        if let Err(status_error) = error_for_status(self.name(), status) {
            error!(%status, model = %self.model, "chat completion failed");
            debug!(body = %text, "chat completion error body");
            return Err(status_error);
        }

        let mut parsed: ChatResponse = serde_json::from_str(&text)?;
        parsed.choices.sort_by_key(|choice| choice.index);

        if parsed.choices.is_empty() {
            return Err(ProviderError::MalformedResponse {
                provider: self.name().to_string(),
                details: "response contained no choices".to_string(),
            });
        }

        let candidates = parsed
            .choices
            .into_iter()
            .map(|choice| {
                choice
                    .message
                    .content
                    .ok_or_else(|| ProviderError::MalformedResponse {
                        provider: self.name().to_string(),
                        details: format!("choice {} has no message content", choice.index),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(candidates = candidates.len(), "chat completion received");
        Ok(Generation { candidates })
    }

    async fn verify(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        error_for_status(self.name(), response.status())
    }
}
