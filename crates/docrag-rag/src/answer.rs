use anyhow::Result;
use std::fmt;
use tracing::info;

use docrag_core::traits::{ChatModel, VectorStore};
use docrag_core::types::RetrievalResult;

use crate::prompt::{rag_messages, REFUSAL};
use crate::retriever::{MultiQueryRetriever, Retrieval};

/// Outcome of a grounded question.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Model output plus the evidence it was given.
    Answered {
        text: String,
        evidence: Vec<RetrievalResult>,
        context: String,
    },
    /// Retrieval found nothing; the model was not consulted.
    Refused,
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Self::Answered { text, .. } => text,
            Self::Refused => REFUSAL,
        }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused)
    }

    pub fn context(&self) -> &str {
        match self {
            Self::Answered { context, .. } => context,
            Self::Refused => "",
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Retrieve, refuse on empty evidence, otherwise prompt the model.
pub struct Assistant<'a> {
    store: &'a dyn VectorStore,
    chat: &'a dyn ChatModel,
    retriever: MultiQueryRetriever,
}

impl<'a> Assistant<'a> {
    pub fn new(store: &'a dyn VectorStore, chat: &'a dyn ChatModel, retriever: MultiQueryRetriever) -> Self {
        Self { store, chat, retriever }
    }

    pub fn answer(&self, question: &str, k: usize) -> Result<Answer> {
        let Some(Retrieval { results, evidence }) = self.retriever.retrieve(question, self.store, k)? else {
            info!("no evidence for question; refusing");
            return Ok(Answer::Refused);
        };
        let text = self.chat.complete(&rag_messages(question, &evidence))?;
        info!(evidence = results.len(), "answered question");
        Ok(Answer::Answered { text, evidence: results, context: evidence })
    }
}
