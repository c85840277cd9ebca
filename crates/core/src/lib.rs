pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod http;
pub mod index;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod session;

#[cfg(test)]
mod test_support;

pub use chunking::{build_chunks, normalize_whitespace, split_text, ChunkingConfig, PageNormalizer};
pub use config::{ChatConfig, ProviderConfig, ProviderSettings, SecretsFile};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingEndpoint, EmbeddingProvider, HttpEmbeddingProvider,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ChatError, ConfigError, IndexError, IngestError, ProviderError, SessionError};
pub use extractor::{extract_page_texts, ExtractedPdf, LopdfExtractor, PageText, PdfExtractor};
pub use index::{DistanceMetric, FlatIndex, IndexHandle, IndexOptions, VectorIndex};
pub use llm::{GroqChatModel, LanguageModel};
pub use loader::DocumentLoader;
pub use memory::ConversationMemory;
pub use models::{
    ChatMessage, Chunk, ConversationTurn, DocumentFingerprint, Generation, IndexEntry,
    IngestionOptions, LoadedDocument, RetrievalResult, Role, ScoredChunk, UploadedDocument,
};
pub use orchestrator::{compose_messages, ChatAnswer, ChatOrchestrator};
pub use session::{DocumentIndexer, Session, UploadSummary};
