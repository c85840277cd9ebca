use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    DocumentParse(String),

    #[error("unsupported content type {content_type} for {file_name}")]
    UnsupportedContentType {
        file_name: String,
        content_type: String,
    },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

impl IngestError {
    pub fn user_message(&self) -> String {
        match self {
            Self::DocumentParse(_) => {
                "The uploaded file could not be read as a PDF. The previous document is still active."
                    .to_string()
            }
            Self::UnsupportedContentType { content_type, .. } => format!(
                "Only PDF uploads are supported (received {content_type})."
            ),
            Self::RegexError(_) | Self::InvalidChunkConfig(_) => {
                "The document loader is misconfigured.".to_string()
            }
        }
    }
}

/// Failures talking to a hosted model endpoint.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    #[error("{provider} rejected the credential (status {status})")]
    Authentication { provider: String, status: u16 },

    #[error("{provider} rate limited the request")]
    RateLimited { provider: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("malformed response from {provider}: {details}")]
    MalformedResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn from_transport(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else {
            Self::Http(error)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("embedding provider timed out: {0}")]
    Timeout(#[source] ProviderError),

    #[error("embedding dimension {actual} does not match provider dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count {embeddings} doesn't match input count {inputs}")]
    CountMismatch { inputs: usize, embeddings: usize },
}

impl From<ProviderError> for IndexError {
    fn from(value: ProviderError) -> Self {
        if value.is_timeout() {
            Self::Timeout(value)
        } else {
            Self::Embedding(value)
        }
    }
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(_) => {
                "Indexing timed out while embedding the document. Please try the upload again."
                    .to_string()
            }
            _ => "The document could not be indexed. The previous document is still active."
                .to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("language model timed out: {0}")]
    Timeout(#[source] ProviderError),
}

impl From<ProviderError> for ChatError {
    fn from(value: ProviderError) -> Self {
        if value.is_timeout() {
            Self::Timeout(value)
        } else {
            Self::Generation(value)
        }
    }
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuestion => "Please type a question.".to_string(),
            Self::Timeout(_) => {
                "The assistant took too long to respond. Please try again.".to_string()
            }
            Self::Generation(ProviderError::RateLimited { .. }) => {
                "The assistant is busy right now. Please wait a moment and try again.".to_string()
            }
            Self::Generation(_) => "The assistant could not produce an answer.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),

    #[error("credential rejected by {provider}: {details}")]
    Authentication { provider: String, details: String },

    #[error("invalid value for {field}: {details}")]
    InvalidValue { field: &'static str, details: String },

    #[error("could not read secrets file: {0}")]
    Secrets(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Per-request failures surfaced by a [`crate::Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl SessionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ingest(_) => false,
            Self::Index(error) => error.is_retryable(),
            Self::Chat(error) => error.is_retryable(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Ingest(error) => error.user_message(),
            Self::Index(error) => error.user_message(),
            Self::Chat(error) => error.user_message(),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
