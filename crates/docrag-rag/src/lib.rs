//! Retrieval and grounding: multi-query retrieval, evidence formatting,
//! citation-enforcing prompts, the xAI transport, question answering and
//! handbook drafting.

pub mod answer;
pub mod evidence;
pub mod handbook;
pub mod llm;
pub mod prompt;
pub mod retriever;

pub use answer::{Answer, Assistant};
pub use evidence::{format_evidence, provenance_tag};
pub use handbook::{handbook_file_name, parse_outline, Handbook, HandbookGenerator, Stage};
pub use llm::{XaiClient, XaiConfig};
pub use prompt::REFUSAL;
pub use retriever::{decompose_query, merge_results, MultiQueryRetriever, Retrieval, RetrieverOptions};
