use crate::chunking::{build_chunks, ChunkingConfig, PageNormalizer};
use crate::error::{IngestError, Result};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{DocumentFingerprint, IngestionOptions, LoadedDocument, UploadedDocument};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

const PDF_CONTENT_TYPES: [&str; 2] = ["application/pdf", "application/x-pdf"];

/// Turns uploaded PDF bytes into an ordered chunk sequence.
pub struct DocumentLoader<E = LopdfExtractor> {
    extractor: E,
    chunking: ChunkingConfig,
    normalizer: PageNormalizer,
}

impl DocumentLoader<LopdfExtractor> {
    pub fn new(options: &IngestionOptions) -> Result<Self> {
        Self::with_extractor(LopdfExtractor, options)
    }
}

impl<E: PdfExtractor> DocumentLoader<E> {
    pub fn with_extractor(extractor: E, options: &IngestionOptions) -> Result<Self> {
        Ok(Self {
            extractor,
            chunking: ChunkingConfig::from(options).validate()?,
            normalizer: PageNormalizer::new()?,
        })
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    /// Chunks are ordered by page, then by position within the page. A PDF
    /// without extractable text loads successfully with no chunks.
    pub fn load(&self, upload: &UploadedDocument) -> Result<LoadedDocument> {
        check_content_type(upload)?;

        let extracted = self.extractor.extract_pages(&upload.bytes)?;
        let fingerprint = build_document_fingerprint(upload, extracted.page_count);

        let mut chunks = Vec::new();
        let mut cursor = 0u64;
        for page in extracted.pages {
            let normalized = self.normalizer.normalize(&page.text);
            let (page_chunks, next_cursor) =
                build_chunks(&fingerprint, page.number, &normalized, self.chunking, cursor);
            debug!(page = page.number, chunks = page_chunks.len(), "page chunked");
            cursor = next_cursor;
            chunks.extend(page_chunks);
        }

        info!(
            file = %upload.file_name,
            document_id = %fingerprint.document_id,
            pages = fingerprint.page_count,
            chunk_count = chunks.len(),
            "document loaded"
        );

        Ok(LoadedDocument {
            fingerprint,
            chunks,
        })
    }
}

fn check_content_type(upload: &UploadedDocument) -> Result<()> {
    let Some(declared) = upload.content_type.as_deref() else {
        return Ok(());
    };

    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if PDF_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(IngestError::UnsupportedContentType {
            file_name: upload.file_name.clone(),
            content_type: declared.to_string(),
        })
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn build_document_fingerprint(upload: &UploadedDocument, page_count: u32) -> DocumentFingerprint {
    let checksum = digest_bytes(&upload.bytes);
    DocumentFingerprint {
        document_id: checksum.clone(),
        file_name: upload.file_name.clone(),
        checksum,
        page_count,
        ingested_at: Utc::now(),
    }
}
