use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status from a remote service; body kept verbatim.
    #[error("{status} {body}")]
    Transport { status: u16, body: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Handbook drafting stopped early. Sections already written stay on disk.
    #[error("Handbook incomplete ({completed}/{total} sections written to {}): {reason}", path.display())]
    PartialHandbook {
        completed: usize,
        total: usize,
        path: PathBuf,
        reason: String,
    },

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
