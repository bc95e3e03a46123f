//! Domain types shared by extraction, chunking, retrieval and prompting.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One physical page of an extracted document, 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self { page_number, text: text.into() }
    }
}

/// A page-scoped span of document text; the unit of embedding and retrieval.
///
/// - `text`: non-empty, trimmed payload
/// - `page`: 1-indexed page the text came from (chunks never span pages)
/// - `chunk_index`: 0-based position within `(source_path, page)`
/// - `source_path`: the originating document as it was given to the indexer
///
/// The serialized field names are the on-disk metadata format of the local
/// store, so they must not be renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
    pub chunk_index: u32,
    pub source_path: String,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            source_path: self.source_path.clone(),
            page: self.page,
            chunk_index: self.chunk_index,
        }
    }

    /// File name of `source_path`, falling back to the full string.
    pub fn source_name(&self) -> &str {
        Path::new(&self.source_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source_path)
    }
}

/// Identity of a chunk across retrieval calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u32,
}

/// A chunk plus its similarity to the query. Higher is more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f32,
}

impl RetrievalResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Role-tagged message sent to a chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}
