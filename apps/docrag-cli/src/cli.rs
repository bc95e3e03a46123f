use clap::{ArgAction, Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docrag",
    version,
    about = "Index PDFs, ask grounded questions and draft cited handbooks"
)]
pub struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the pages extracted from a document
    Extract { file: PathBuf },

    /// Show how a document would be chunked
    Chunk { file: PathBuf },

    /// Extract, chunk and index documents or directories of documents
    Index {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Index in place instead of copying into the storage directory
        #[arg(long)]
        no_copy: bool,
    },

    /// Delete every indexed chunk (local backend only)
    Reset,

    /// Raw similarity search against the index
    Search {
        query: String,

        #[arg(short = 'k', long = "top-k")]
        top_k: Option<NonZeroUsize>,
    },

    /// Answer a question from the indexed documents, with citations
    Ask {
        question: String,

        #[arg(short = 'k', long = "top-k")]
        top_k: Option<NonZeroUsize>,

        /// Also print the evidence sent to the model
        #[arg(long)]
        show_context: bool,
    },

    /// Draft a long-form handbook on a topic, section by section
    Handbook { topic: String },

    /// List documents in the storage directory
    List,
}
