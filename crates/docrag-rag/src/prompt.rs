//! Grounded prompt templates for answers, outlines and handbook sections.

use docrag_core::types::ChatMessage;

/// Returned verbatim when retrieval finds nothing, and demanded from the
/// model when the context does not support an answer.
pub const REFUSAL: &str = "I don't have enough information in the uploaded PDFs.";

pub fn rag_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    let system = format!(
        "You are a strict RAG assistant. Use ONLY the provided PDF context. \
         If the answer is not explicitly supported by the context, say: \"{REFUSAL}\" \
         Every factual claim must include an inline citation using the exact \
         bracket label from the context, e.g. [file.pdf | p.12 | c3]. \
         Do not invent sources, pages, or citations."
    );
    let user = format!(
        "PDF CONTEXT:\n{context}\n\nQUESTION:\n{question}\n\nAnswer clearly and include citations for claims."
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn outline_messages(topic: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are an expert technical author. Create a detailed handbook outline. \
             Return ONLY a numbered table of contents with sections and subsections. \
             Keep it comprehensive enough to support a 20,000+ word handbook.",
        ),
        ChatMessage::user(format!("Create a handbook outline on: {topic}")),
    ]
}

pub fn section_goals(title: &str) -> String {
    format!("Cover this topic thoroughly: {title}")
}

pub fn section_messages(title: &str, goals: &str, evidence: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are writing one section of a long technical handbook. \
             Use ONLY the provided evidence. If evidence is insufficient, state that clearly. \
             Cite claims inline using the exact bracket labels from the evidence.",
        ),
        ChatMessage::user(format!(
            "SECTION TITLE:\n{title}\n\nSECTION GOALS:\n{goals}\n\nEVIDENCE:\n{evidence}\n\n\
             Write this section in a clear handbook style with headings, bullet lists where useful, \
             and citations for claims."
        )),
    ]
}
