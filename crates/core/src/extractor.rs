use crate::error::IngestError;
use lopdf::Document;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    pub page_count: u32,
    /// Pages with readable text, in page order.
    pub pages: Vec<PageText>,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<ExtractedPdf, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<ExtractedPdf, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::DocumentParse(error.to_string()))?;

        let page_numbers = document.get_pages().into_keys().collect::<Vec<_>>();
        let page_count = page_numbers.len() as u32;

        let mut pages = Vec::new();
        for page_no in page_numbers {
            // Image-only or font-less pages are skipped, not fatal.
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page = page_no, error = %error, "page text not extractable");
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(ExtractedPdf { page_count, pages })
    }
}

pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(bytes).map(|extracted| extracted.pages)
}
