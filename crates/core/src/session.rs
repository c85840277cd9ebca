//! Explicit per-user session state: the transcript plus at most one active
//! document index.

use crate::embeddings::EmbeddingProvider;
use crate::error::SessionError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::{IndexHandle, IndexOptions};
use crate::llm::LanguageModel;
use crate::loader::DocumentLoader;
use crate::memory::ConversationMemory;
use crate::models::{ConversationTurn, DocumentFingerprint, UploadedDocument};
use crate::orchestrator::{ChatAnswer, ChatOrchestrator};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Load-then-embed pipeline, shareable read-only across sessions.
pub struct DocumentIndexer<E = LopdfExtractor> {
    loader: DocumentLoader<E>,
    embedder: Arc<dyn EmbeddingProvider>,
    options: IndexOptions,
}

impl<E: PdfExtractor> DocumentIndexer<E> {
    pub fn new(
        loader: DocumentLoader<E>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> Self {
        Self {
            loader,
            embedder,
            options,
        }
    }

    pub async fn index(
        &self,
        upload: &UploadedDocument,
    ) -> Result<(DocumentFingerprint, IndexHandle), SessionError> {
        let loaded = self.loader.load(upload)?;
        let handle =
            IndexHandle::build(&loaded.chunks, Arc::clone(&self.embedder), self.options).await?;
        Ok((loaded.fingerprint, handle))
    }
}

#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub document: DocumentFingerprint,
    pub indexed_chunks: usize,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    memory: ConversationMemory,
    index: Option<IndexHandle>,
    document: Option<DocumentFingerprint>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            memory: ConversationMemory::new(),
            index: None,
            document: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Replaces the active index only when loading and indexing both
    /// succeed; on error the previous document stays active.
    pub async fn upload<E: PdfExtractor>(
        &mut self,
        upload: &UploadedDocument,
        indexer: &DocumentIndexer<E>,
    ) -> Result<UploadSummary, SessionError> {
        let (document, handle) = indexer.index(upload).await?;
        let summary = UploadSummary {
            document: document.clone(),
            indexed_chunks: handle.len(),
        };

        info!(
            session = %self.id,
            file = %document.file_name,
            chunks = handle.len(),
            replaced = self.index.is_some(),
            "document index installed"
        );
        self.index = Some(handle);
        self.document = Some(document);
        Ok(summary)
    }

    pub async fn ask<M: LanguageModel + ?Sized>(
        &mut self,
        question: &str,
        orchestrator: &ChatOrchestrator<M>,
    ) -> Result<ChatAnswer, SessionError> {
        let answer = orchestrator
            .respond(question, &mut self.memory, self.index.as_ref())
            .await?;
        Ok(answer)
    }

    /// Clears the transcript; the active document stays indexed.
    pub fn reset(&mut self) {
        self.memory.reset();
        info!(session = %self.id, "conversation reset");
    }

    pub fn history(&self) -> &[ConversationTurn] {
        self.memory.history()
    }

    pub fn index(&self) -> Option<&IndexHandle> {
        self.index.as_ref()
    }

    pub fn document(&self) -> Option<&DocumentFingerprint> {
        self.document.as_ref()
    }
}
