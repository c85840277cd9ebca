use crate::models::{ConversationTurn, Role};
use chrono::Utc;

/// Append-only transcript of one session, oldest turn first.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
    next_sequence: u64,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) -> &ConversationTurn {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.turns.push(ConversationTurn {
            sequence,
            role,
            content: content.into(),
            recorded_at: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    /// Records a question and its answer together.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.append(Role::User, question);
        self.append(Role::Assistant, answer);
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops every turn. Sequence numbers keep increasing across resets.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}
