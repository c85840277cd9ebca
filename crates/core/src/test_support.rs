//! Fixtures shared by the unit tests.

use crate::error::ProviderError;
use crate::llm::LanguageModel;
use crate::models::{ChatMessage, Generation};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Mutex;

/// Builds an in-memory PDF with one page per entry; an empty entry produces
/// a page without any text operators.
pub fn pdf_with_pages(pages: &[&str]) -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            vec![Operation::new("q", vec![]), Operation::new("Q", vec![])]
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Language model that replays canned generations and records every request.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<Vec<Result<Generation, ProviderError>>>,
    pub default_answer: String,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn answering(answer: &str) -> Self {
        Self {
            default_answer: answer.to_string(),
            ..Self::default()
        }
    }

    pub fn then(self, response: Result<Generation, ProviderError>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(response);
        }
        self
    }

    pub fn failing() -> Self {
        Self::default().then(Err(ProviderError::BackendResponse {
            backend: "scripted".to_string(),
            details: "503 Service Unavailable".to_string(),
        }))
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation, ProviderError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Generation {
                candidates: vec![self.default_answer.clone()],
            })
        } else {
            responses.remove(0)
        }
    }

    async fn verify(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
