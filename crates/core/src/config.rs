use crate::error::ConfigError;
use crate::http::DEFAULT_TIMEOUT;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const API_KEY_ENV: &str = "GROQ_API_KEY";
pub const MODEL_ENV: &str = "GROQ_MODEL";
pub const BASE_URL_ENV: &str = "GROQ_BASE_URL";

pub const DEFAULT_MODEL: &str = "gemma2-9b-it";
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_TOP_K: usize = 3;

pub const GROUNDED_SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the user's question. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

pub const PLAIN_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question using the conversation so far.";

/// Unvalidated provider values as gathered from flags and the environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub candidate_count: Option<u8>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Optional TOML secrets store with a `[GROQ]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsFile {
    #[serde(default, rename = "GROQ", alias = "groq")]
    pub groq: GroqSecrets,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroqSecrets {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl SecretsFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|error| ConfigError::Secrets(error.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::Secrets(format!("{}: {error}", path.display())))?;
        Self::parse(&text)
    }
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
    pub timeout: Duration,
    pub candidate_count: u8,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("candidate_count", &self.candidate_count)
            .finish()
    }
}

impl ProviderConfig {
    /// Secrets file values win over flag and environment values; a missing
    /// credential is fatal.
    pub fn resolve(
        settings: ProviderSettings,
        secrets: Option<&SecretsFile>,
    ) -> Result<Self, ConfigError> {
        let secret_key = secrets.and_then(|file| file.groq.api_key.clone().and_then(non_blank));
        let secret_model = secrets.and_then(|file| file.groq.model.clone().and_then(non_blank));

        let api_key = secret_key
            .or_else(|| settings.api_key.and_then(non_blank))
            .ok_or(ConfigError::MissingCredential(API_KEY_ENV))?;

        let model = secret_model
            .or_else(|| settings.model.and_then(non_blank))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = settings
            .base_url
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url)?;

        let timeout = settings.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                details: "must be greater than zero".to_string(),
            });
        }

        let candidate_count = settings.candidate_count.unwrap_or(1);
        if candidate_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "candidate_count",
                details: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            api_key,
            model,
            base_url,
            timeout,
            candidate_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub top_k: usize,
    pub grounded_prompt: String,
    pub plain_prompt: String,
    /// Rephrase follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            grounded_prompt: GROUNDED_SYSTEM_PROMPT.to_string(),
            plain_prompt: PLAIN_SYSTEM_PROMPT.to_string(),
            condense_question: false,
        }
    }
}

impl ChatConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "top_k",
                details: "must be greater than zero".to_string(),
            });
        }
        Ok(self)
    }
}
