use crate::error::IngestError;
use crate::models::{Chunk, DocumentFingerprint, IngestionOptions};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Tried in order; the first one present in the text is used to split it.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn validate(self) -> Result<Self, IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be less than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(self)
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Cleans extracted page text while keeping line and paragraph breaks,
/// which the splitter relies on.
#[derive(Debug, Clone)]
pub struct PageNormalizer {
    inline_space: Regex,
    blank_runs: Regex,
}

impl PageNormalizer {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            inline_space: Regex::new(r"[ \t\u{a0}\u{000c}]+")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let collapsed = self.inline_space.replace_all(&unified, " ");
        let trimmed_lines = collapsed.lines().map(str::trim).collect::<Vec<_>>().join("\n");
        self.blank_runs
            .replace_all(&trimmed_lines, "\n\n")
            .trim()
            .to_string()
    }
}

/// Splits text into pieces of at most `max_chars` characters, preferring
/// paragraph, then line, then word boundaries, with `overlap_chars` of
/// trailing context carried into the next piece.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&'static str], config: ChunkingConfig) -> Vec<String> {
    let (separator, remaining) = pick_separator(text, separators);
    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator).map(str::to_string).collect()
    };

    let mut output = Vec::new();
    let mut pending = Vec::new();

    for piece in pieces {
        if char_len(&piece) < config.max_chars {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            output.extend(merge_pieces(&pending, separator, config));
            pending.clear();
        }

        if remaining.is_empty() {
            output.push(piece);
        } else {
            output.extend(split_recursive(&piece, remaining, config));
        }
    }

    if !pending.is_empty() {
        output.extend(merge_pieces(&pending, separator, config));
    }

    output
}

fn pick_separator<'a>(
    text: &str,
    separators: &'a [&'static str],
) -> (&'static str, &'a [&'static str]) {
    for (position, separator) in separators.iter().copied().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[position + 1..]);
        }
    }
    ("", &[])
}

fn merge_pieces(pieces: &[String], separator: &str, config: ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let joiner = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { separator_len };

    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);

        if !window.is_empty() && total + len + joiner(&window) > config.max_chars {
            push_joined(&mut chunks, &window, separator);

            while total > config.overlap_chars
                || (total > 0 && total + len + joiner(&window) > config.max_chars)
            {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total -= char_len(front) + joiner(&window);
            }
        }

        total += len + joiner(&window);
        window.push_back(piece.as_str());
    }

    push_joined(&mut chunks, &window, separator);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chunks one page. Chunks never span pages; `global_index` continues the
/// document-wide sequence and the next free index is returned.
pub fn build_chunks(
    document: &DocumentFingerprint,
    page: u32,
    page_text: &str,
    config: ChunkingConfig,
    global_index: u64,
) -> (Vec<Chunk>, u64) {
    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for text in split_text(page_text, config) {
        chunks.push(Chunk {
            chunk_id: make_chunk_id(&document.document_id, page, cursor, &text),
            document_id: document.document_id.clone(),
            page_number: page,
            sequence_index: cursor,
            text,
        });
        cursor = cursor.saturating_add(1);
    }

    (chunks, cursor)
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
