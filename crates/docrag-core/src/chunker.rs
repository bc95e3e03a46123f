//! Page-aware paragraph chunking with word-count overlap.
//!
//! Pages are chunked independently so that every chunk cites exactly one page.
//! Paragraphs (blank-line separated) are accumulated greedily until the next
//! one would push the buffer past `max_tokens`; the buffer is then emitted and
//! the next buffer is seeded with the trailing `overlap_tokens` words of the
//! emitted text. Token counts are approximated by whitespace-delimited words.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Chunk, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 800, overlap_tokens: 120 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.overlap_tokens >= self.max_tokens {
            return Err(Error::InvalidConfig(format!(
                "overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Fails with `InvalidConfig` when `overlap_tokens >= max_tokens`.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Chunks pages in order. Whitespace-only pages produce nothing.
    pub fn chunk(&self, pages: &[Page], source_path: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            if page.text.trim().is_empty() {
                debug!(page = page.page_number, source_path, "skipping page without text");
                continue;
            }
            self.chunk_page(page, source_path, &mut chunks);
        }
        debug!(source_path, pages = pages.len(), chunks = chunks.len(), "chunked document");
        chunks
    }

    fn chunk_page(&self, page: &Page, source_path: &str, out: &mut Vec<Chunk>) {
        let ChunkingConfig { max_tokens, overlap_tokens } = self.config;
        let mut buffer: Vec<String> = Vec::new();
        let mut buffer_tokens = 0usize;
        let mut chunk_index = 0u32;

        for paragraph in split_paragraphs(&page.text) {
            let paragraph_tokens = approx_token_count(&paragraph);
            if !buffer.is_empty() && buffer_tokens + paragraph_tokens > max_tokens {
                let text = buffer.join("\n\n").trim().to_string();
                buffer.clear();
                buffer_tokens = 0;
                if overlap_tokens > 0 {
                    let seed = tail_words(&text, overlap_tokens);
                    buffer_tokens = approx_token_count(&seed);
                    buffer.push(seed);
                }
                out.push(Chunk {
                    text,
                    page: page.page_number,
                    chunk_index,
                    source_path: source_path.to_string(),
                });
                chunk_index += 1;
            }
            buffer_tokens += paragraph_tokens;
            buffer.push(paragraph);
        }

        if !buffer.is_empty() {
            out.push(Chunk {
                text: buffer.join("\n\n").trim().to_string(),
                page: page.page_number,
                chunk_index,
                source_path: source_path.to_string(),
            });
        }
    }
}

/// Validates the parameters, then chunks every page of one document.
pub fn chunk_pages(
    pages: &[Page],
    source_path: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(ChunkingConfig { max_tokens, overlap_tokens })?;
    Ok(chunker.chunk(pages, source_path))
}

/// Word count, never below one so that every paragraph has weight.
pub fn approx_token_count(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

/// Paragraphs separated by one or more blank (whitespace-only) lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);
    paragraphs
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = lines.join("\n").trim().to_string();
    lines.clear();
    if !paragraph.is_empty() {
        out.push(paragraph);
    }
}

fn tail_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}
