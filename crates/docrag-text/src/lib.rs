//! docrag-text
//!
//! Page-by-page text extraction (poppler `pdftotext` for PDFs, plain files for
//! development corpora) and discovery of persisted documents.

pub mod discover;
pub mod extract;

pub use discover::discover_documents;
pub use extract::{pages_from_text, DocumentExtractor, PdfExtractor, PlainTextExtractor};
