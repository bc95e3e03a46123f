use std::path::Path;

use crate::error::Error;
use crate::types::{Chunk, ChatMessage, Page, RetrievalResult};

/// Produces L2-normalized vectors of a fixed dimensionality.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Turns a document on disk into ordered, 1-indexed pages.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> anyhow::Result<Vec<Page>>;
}

/// Chunk text and vectors searchable by cosine proximity.
///
/// Implementations keep vectors and chunk metadata in lockstep: a batch is
/// either added to both or the store is left as it was.
pub trait VectorStore: Send + Sync {
    /// Embeds and appends a batch. An empty batch is a no-op.
    fn add(&mut self, chunks: &[Chunk]) -> anyhow::Result<()>;

    /// Top-`k` results in descending score order. Empty when nothing is indexed.
    fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<RetrievalResult>>;

    /// Drops every indexed chunk. Backends that treat truncation as an
    /// administrative action keep this default and refuse.
    fn reset(&mut self) -> anyhow::Result<()> {
        Err(Error::Unsupported("reset is not available for this vector store".into()).into())
    }

    /// Number of indexed chunks, when the backend can tell cheaply.
    fn len(&self) -> Option<usize> {
        None
    }
}

/// Stateless chat-completion transport.
pub trait ChatModel: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}
