//! Core types, traits, configuration and chunking for the docrag workspace.

pub mod chunker;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use chunker::{chunk_pages, Chunker, ChunkingConfig};
pub use error::{Error, Result};
pub use types::{ChatMessage, Chunk, ChunkKey, Page, RetrievalResult, Role};
