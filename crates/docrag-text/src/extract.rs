use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use docrag_core::error::Error;
use docrag_core::traits::TextExtractor;
use docrag_core::types::Page;

const FORM_FEED: char = '\u{c}';

/// PDF text via poppler's `pdftotext`, one page per form feed.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    binary: PathBuf,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self { binary: PathBuf::from("pdftotext") }
    }
}

impl PdfExtractor {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("PDF not found: {}", path.display())).into());
        }
        let output = Command::new(&self.binary)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| {
                Error::Operation(format!(
                    "failed to run {}: {} (is poppler installed?)",
                    self.binary.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(path = %path.display(), "pdftotext failed: {}", stderr.trim());
            return Err(anyhow!("pdftotext failed for {}: {}", path.display(), stderr.trim()));
        }
        let pages = pages_from_text(&String::from_utf8_lossy(&output.stdout));
        let empty = pages.iter().filter(|p| p.text.is_empty()).count();
        if empty > 0 {
            warn!(path = %path.display(), empty, "pages without extractable text (scanned?)");
        }
        info!(path = %path.display(), pages = pages.len(), "extracted PDF text");
        Ok(pages)
    }
}

/// Plain-text documents. Form feeds split pages; otherwise the file is page 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("document not found: {}", path.display())).into());
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => String::from_utf8_lossy(
                &std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
            )
            .to_string(),
        };
        let pages = pages_from_text(&content);
        debug!(path = %path.display(), pages = pages.len(), "read text document");
        Ok(pages)
    }
}

/// Picks an extractor by file extension (`.pdf`, otherwise plain text).
#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor {
    pdf: PdfExtractor,
    text: PlainTextExtractor,
}

impl DocumentExtractor {
    pub fn new(pdf: PdfExtractor) -> Self {
        Self { pdf, text: PlainTextExtractor }
    }
}

impl TextExtractor for DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        if is_pdf(path) { self.pdf.extract(path) } else { self.text.extract(path) }
    }
}

pub(crate) fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Splits raw extractor output into 1-indexed pages.
///
/// The empty segment after a trailing form feed is not a page. Each page has
/// carriage returns folded to newlines and surrounding whitespace trimmed.
pub fn pages_from_text(raw: &str) -> Vec<Page> {
    let mut segments: Vec<&str> = raw.split(FORM_FEED).collect();
    if segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    segments
        .into_iter()
        .zip(1u32..)
        .map(|(segment, number)| Page::new(number, normalize_page_text(segment)))
        .collect()
}

fn normalize_page_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_delimit_pages() {
        let pages = pages_from_text("first page\r\nline two\u{c}\u{c}  third  \u{c}");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], Page::new(1, "first page\nline two"));
        assert_eq!(pages[1], Page::new(2, ""));
        assert_eq!(pages[2], Page::new(3, "third"));
    }

    #[test]
    fn text_without_form_feed_is_one_page() {
        let pages = pages_from_text("just text\n\nmore");
        assert_eq!(pages, vec![Page::new(1, "just text\n\nmore")]);
        assert!(pages_from_text("").is_empty());
    }

    #[test]
    fn missing_pdf_is_not_found() {
        let err = PdfExtractor::default()
            .extract(Path::new("/definitely/not/here.pdf"))
            .expect_err("missing");
        match err.downcast_ref::<Error>() {
            Some(Error::NotFound(msg)) => assert!(msg.contains("here.pdf")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_binary_is_reported() {
        let tmp = tempfile::tempdir().expect("tmp");
        let pdf = tmp.path().join("a.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").expect("write");
        let err = PdfExtractor::with_binary("/nonexistent/pdftotext")
            .extract(&pdf)
            .expect_err("no binary");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Operation(_))));
    }
}
