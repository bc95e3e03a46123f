//! Vector stores behind the [`VectorStore`] capability.
//!
//! Two interchangeable variants, chosen once at construction:
//! - [`LocalVectorStore`]: LanceDB table plus `chunks.json` in a data directory
//! - [`SupabaseVectorStore`]: PostgREST tables and a `match_chunks` RPC
//!
//! `VECTOR_BACKEND` (`faiss`/`local` or `supabase`) overrides the configured
//! backend.

use anyhow::Result;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use docrag_core::config::VectorConfig;
use docrag_core::error::Error;
pub use docrag_core::traits::VectorStore;
use docrag_embed::EmbedderHandle;

pub mod local;
pub mod remote;
pub mod schema;

pub use local::LocalVectorStore;
pub use remote::{SupabaseConfig, SupabaseVectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Supabase,
}

impl Backend {
    /// `faiss` is accepted as an alias of `local`.
    pub fn parse(name: &str) -> docrag_core::Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" | "faiss" => Ok(Self::Local),
            "supabase" => Ok(Self::Supabase),
            other => Err(Error::InvalidConfig(format!("Unsupported VECTOR_BACKEND: {other}"))),
        }
    }

    pub fn from_config(config: &VectorConfig) -> docrag_core::Result<Self> {
        match std::env::var("VECTOR_BACKEND") {
            Ok(name) if !name.trim().is_empty() => Self::parse(&name),
            _ => Self::parse(&config.backend),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> docrag_core::Result<Self> {
        Self::parse(s)
    }
}

/// Opens the configured store. Local data lives in `data_dir`.
pub fn open_store(
    config: &VectorConfig,
    data_dir: &Path,
    embedder: EmbedderHandle,
) -> Result<Box<dyn VectorStore>> {
    let backend = Backend::from_config(config)?;
    info!(?backend, "opening vector store");
    match backend {
        Backend::Local => Ok(Box::new(LocalVectorStore::open(data_dir, embedder)?)),
        Backend::Supabase => {
            let remote = SupabaseConfig::from_env(Duration::from_secs(config.timeout_secs))?;
            Ok(Box::new(SupabaseVectorStore::new(remote, embedder)?))
        }
    }
}
