use docrag_core::types::{Chunk, RetrievalResult};

/// `[file.pdf | p.3 | c1]`, the label answers must cite verbatim.
pub fn provenance_tag(chunk: &Chunk) -> String {
    format!("[{} | p.{} | c{}]", chunk.source_name(), chunk.page, chunk.chunk_index)
}

/// One line per result, in input order: tag, then the chunk text with
/// newlines collapsed to spaces and cut to `max_chars` characters.
pub fn format_evidence(results: &[RetrievalResult], max_chars: usize) -> String {
    results
        .iter()
        .map(|r| {
            let text: String = r
                .chunk
                .text
                .trim()
                .replace("\r\n", " ")
                .replace(['\n', '\r'], " ")
                .chars()
                .take(max_chars)
                .collect();
            format!("{} {}", provenance_tag(&r.chunk), text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
