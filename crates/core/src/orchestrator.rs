//! Retrieval-augmented answering: retrieve, compose, generate, record.

use crate::config::ChatConfig;
use crate::error::{ChatError, ProviderError};
use crate::index::IndexHandle;
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::models::{ChatMessage, ConversationTurn, Role, RetrievalResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CONDENSE_INSTRUCTION: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnswer {
    pub text: String,
    /// Chunks the answer was grounded on; empty when retrieval was skipped or failed.
    pub context: RetrievalResult,
}

pub struct ChatOrchestrator<M>
where
    M: LanguageModel + ?Sized,
{
    model: Arc<M>,
    config: ChatConfig,
}

impl<M> ChatOrchestrator<M>
where
    M: LanguageModel + ?Sized,
{
    pub fn new(model: Arc<M>, config: ChatConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub async fn answer(
        &self,
        question: &str,
        memory: &mut ConversationMemory,
        index: Option<&IndexHandle>,
    ) -> Result<String, ChatError> {
        self.respond(question, memory, index)
            .await
            .map(|answer| answer.text)
    }

    /// Memory is only touched after generation succeeds, and then receives
    /// both the question and the answer.
    pub async fn respond(
        &self,
        question: &str,
        memory: &mut ConversationMemory,
        index: Option<&IndexHandle>,
    ) -> Result<ChatAnswer, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let context = self.retrieve(question, memory.history(), index).await;
        let messages = compose_messages(&self.config, &context, memory.history(), question);
        debug!(
            messages = messages.len(),
            context_chunks = context.len(),
            "prompt composed"
        );

        let text = self.generate(&messages).await?;
        memory.append_exchange(question, text.clone());

        info!(
            grounded = !context.is_empty(),
            history_turns = memory.len(),
            "question answered"
        );
        Ok(ChatAnswer { text, context })
    }

    async fn retrieve(
        &self,
        question: &str,
        history: &[ConversationTurn],
        index: Option<&IndexHandle>,
    ) -> RetrievalResult {
        let Some(index) = index else {
            return RetrievalResult::default();
        };

        let query = self.retrieval_query(question, history).await;
        match index.query(&query, self.config.top_k).await {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "retrieval failed, answering without document context");
                RetrievalResult::default()
            }
        }
    }

    async fn retrieval_query(&self, question: &str, history: &[ConversationTurn]) -> String {
        if !self.config.condense_question || history.is_empty() {
            return question.to_string();
        }

        let prompt = condense_prompt(history, question);
        match self.generate(&[ChatMessage::user(prompt)]).await {
            Ok(condensed) if !condensed.trim().is_empty() => {
                debug!(standalone = %condensed.trim(), "question condensed");
                condensed.trim().to_string()
            }
            Ok(_) => question.to_string(),
            Err(error) => {
                warn!(error = %error, "question condensing failed, retrieving with the raw question");
                question.to_string()
            }
        }
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let generation = self.model.generate(messages).await?;
        generation
            .selected()
            .map(str::to_string)
            .ok_or_else(|| {
                ChatError::Generation(ProviderError::MalformedResponse {
                    provider: self.model.name().to_string(),
                    details: "no candidates returned".to_string(),
                })
            })
    }
}

/// System prompt (grounded on retrieved chunks when there are any), then the
/// full history oldest first, then the new question.
pub fn compose_messages(
    config: &ChatConfig,
    context: &RetrievalResult,
    history: &[ConversationTurn],
    question: &str,
) -> Vec<ChatMessage> {
    let system = if context.is_empty() {
        config.plain_prompt.clone()
    } else {
        let joined = context.texts().collect::<Vec<_>>().join("\n\n");
        format!("{}\n\n{joined}", config.grounded_prompt)
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(question));
    messages
}

fn condense_prompt(history: &[ConversationTurn], question: &str) -> String {
    let transcript = history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{CONDENSE_INSTRUCTION}\n\nChat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingProvider;
    use crate::index::IndexOptions;
    use crate::models::{Chunk, Generation};
    use crate::test_support::ScriptedModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds successfully for the first `budget` calls, then fails.
    struct FlakyEmbedder {
        calls: AtomicUsize,
        budget: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        fn model_id(&self) -> &str {
            "flaky"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.budget {
                return Err(ProviderError::Timeout {
                    provider: "flaky".to_string(),
                });
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            chunk_id: "chunk-0".to_string(),
            document_id: "doc".to_string(),
            page_number: 1,
            sequence_index: 0,
            text: text.to_string(),
        }
    }

    fn orchestrator(model: &Arc<ScriptedModel>) -> ChatOrchestrator<ScriptedModel> {
        ChatOrchestrator::new(Arc::clone(model), ChatConfig::default())
    }

    #[tokio::test]
    async fn no_index_sends_history_only() -> Result<(), ChatError> {
        let model = Arc::new(ScriptedModel::answering("Hello there"));
        let mut memory = ConversationMemory::new();

        let answer = orchestrator(&model).answer("Hi", &mut memory, None).await?;

        assert_eq!(answer, "Hello there");
        assert_eq!(memory.len(), 2);
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            vec![
                ChatMessage::system(crate::config::PLAIN_SYSTEM_PROMPT),
                ChatMessage::user("Hi")
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn history_is_replayed_oldest_first() -> Result<(), ChatError> {
        let model = Arc::new(ScriptedModel::answering("ok"));
        let mut memory = ConversationMemory::new();
        memory.append_exchange("first question", "first answer");

        orchestrator(&model)
            .answer("second question", &mut memory, None)
            .await?;

        let sent = &model.requests()[0];
        let contents = sent.iter().map(|message| message.content.as_str()).collect::<Vec<_>>();
        assert_eq!(&contents[1..], ["first question", "first answer", "second question"]);
        assert_eq!(sent[1].role, Role::User);
        assert_eq!(sent[2].role, Role::Assistant);

        let recorded = memory
            .history()
            .iter()
            .map(|turn| turn.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(recorded, ["first question", "first answer", "second question", "ok"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_generation_leaves_memory_untouched() {
        let model = Arc::new(ScriptedModel::failing());
        let mut memory = ConversationMemory::new();
        memory.append_exchange("q", "a");

        let result = orchestrator(&model).answer("another", &mut memory, None).await;

        assert!(matches!(result, Err(ChatError::Generation(_))));
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn provider_timeout_is_retryable_and_atomic() {
        let model = Arc::new(ScriptedModel::default().then(Err(ProviderError::Timeout {
            provider: "scripted".to_string(),
        })));
        let mut memory = ConversationMemory::new();

        let error = orchestrator(&model)
            .answer("question", &mut memory, None)
            .await
            .expect_err("timeout should surface");

        assert!(error.is_retryable());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn last_candidate_is_selected() -> Result<(), ChatError> {
        let model = Arc::new(ScriptedModel::default().then(Ok(Generation {
            candidates: vec!["draft".to_string(), "final".to_string()],
        })));
        let mut memory = ConversationMemory::new();

        let answer = orchestrator(&model).answer("q", &mut memory, None).await?;

        assert_eq!(answer, "final");
        assert_eq!(memory.history()[1].content, "final");
        Ok(())
    }

    #[tokio::test]
    async fn zero_candidates_is_a_generation_error() {
        let model = Arc::new(ScriptedModel::default().then(Ok(Generation::default())));
        let mut memory = ConversationMemory::new();

        let result = orchestrator(&model).answer("q", &mut memory, None).await;
        assert!(matches!(result, Err(ChatError::Generation(_))));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let model = Arc::new(ScriptedModel::answering("unused"));
        let mut memory = ConversationMemory::new();

        let result = orchestrator(&model).answer("   ", &mut memory, None).await;
        assert!(matches!(result, Err(ChatError::EmptyQuestion)));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn retrieved_chunks_ground_the_prompt() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            budget: usize::MAX,
        });
        let index = IndexHandle::build(&[chunk("Invoice Total: $42.00")], embedder, IndexOptions::default()).await?;
        let model = Arc::new(ScriptedModel::answering("$42.00"));
        let mut memory = ConversationMemory::new();

        let answer = orchestrator(&model)
            .respond("What is the invoice total?", &mut memory, Some(&index))
            .await?;

        assert_eq!(answer.context.len(), 1);
        let system = &model.requests()[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("Invoice Total: $42.00"));
        assert!(system.content.starts_with(crate::config::GROUNDED_SYSTEM_PROMPT));
        Ok(())
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_plain_chat() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            budget: 1,
        });
        let index = IndexHandle::build(&[chunk("Invoice Total: $42.00")], embedder, IndexOptions::default()).await?;
        let model = Arc::new(ScriptedModel::answering("I am not sure."));
        let mut memory = ConversationMemory::new();

        let answer = orchestrator(&model)
            .respond("What is the invoice total?", &mut memory, Some(&index))
            .await?;

        assert!(answer.context.is_empty());
        assert_eq!(model.requests()[0][0].content, crate::config::PLAIN_SYSTEM_PROMPT);
        assert_eq!(memory.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn condensing_rewrites_only_the_retrieval_query() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            budget: usize::MAX,
        });
        let index = IndexHandle::build(&[chunk("Invoice Total: $42.00")], embedder, IndexOptions::default()).await?;
        let model = Arc::new(
            ScriptedModel::answering("It is $42.00.").then(Ok(Generation {
                candidates: vec!["What is the invoice total?".to_string()],
            })),
        );
        let config = ChatConfig {
            condense_question: true,
            ..ChatConfig::default()
        };
        let orchestrator = ChatOrchestrator::new(Arc::clone(&model), config);
        let mut memory = ConversationMemory::new();
        memory.append_exchange("Tell me about the invoice", "It is from ACME.");

        let answer = orchestrator.answer("and the total?", &mut memory, Some(&index)).await?;

        assert_eq!(answer, "It is $42.00.");
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0][0].content.contains("Follow Up Input: and the total?"));
        assert!(requests[0][0].content.contains("Human: Tell me about the invoice"));
        let final_request = &requests[1];
        assert_eq!(final_request.last().map(|m| m.content.as_str()), Some("and the total?"));
        assert_eq!(memory.history()[2].content, "and the total?");
        Ok(())
    }

    #[test]
    fn compose_places_context_history_and_question() {
        let config = ChatConfig::default();
        let context = RetrievalResult {
            hits: vec![
                crate::models::ScoredChunk {
                    chunk_id: "a".to_string(),
                    chunk_text: "chunk a".to_string(),
                    score: 0.1,
                },
                crate::models::ScoredChunk {
                    chunk_id: "b".to_string(),
                    chunk_text: "chunk b".to_string(),
                    score: 0.2,
                },
            ],
        };
        let mut memory = ConversationMemory::new();
        memory.append_exchange("q1", "a1");

        let messages = compose_messages(&config, &context, memory.history(), "q2");

        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.ends_with("chunk a\n\nchunk b"));
        assert_eq!(messages[3], ChatMessage::user("q2"));
    }
}
