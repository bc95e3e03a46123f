//! Long-form handbook drafting.
//!
//! Stages run strictly in order: outline, then one section at a time. The
//! header and outline are written as soon as the outline arrives and every
//! section is appended on completion, so a failure part-way leaves the
//! finished sections on disk and is reported as [`Error::PartialHandbook`].

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use docrag_core::error::Error;
use docrag_core::traits::{ChatModel, VectorStore};

use crate::prompt::{outline_messages, section_goals, section_messages, REFUSAL};
use crate::retriever::MultiQueryRetriever;

const FALLBACK_SECTION: &str = "1. Introduction";
const MAX_FILE_STEM_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    OutlinePending,
    OutlineDone { sections: usize },
    SectionPending { index: usize, total: usize, title: String },
    SectionDone { index: usize, total: usize, title: String },
    Complete { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handbook {
    pub topic: String,
    pub sections: Vec<String>,
    pub text: String,
    pub path: PathBuf,
}

pub struct HandbookGenerator<'a> {
    store: &'a dyn VectorStore,
    chat: &'a dyn ChatModel,
    retriever: MultiQueryRetriever,
    top_k: usize,
    out_dir: PathBuf,
}

impl<'a> HandbookGenerator<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        chat: &'a dyn ChatModel,
        retriever: MultiQueryRetriever,
        top_k: usize,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { store, chat, retriever, top_k, out_dir: out_dir.into() }
    }

    pub fn generate(&self, topic: &str) -> Result<Handbook> {
        self.generate_with_progress(topic, |_| {})
    }

    pub fn generate_with_progress<F>(&self, topic: &str, mut on_stage: F) -> Result<Handbook>
    where
        F: FnMut(Stage),
    {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("creating {}", self.out_dir.display()))?;
        let path = self.out_dir.join(handbook_file_name(topic));

        on_stage(Stage::OutlinePending);
        let toc = self.chat.complete(&outline_messages(topic))?;
        std::fs::write(&path, format!("# Handbook: {topic}\n\n## Table of Contents\n\n{toc}\n\n"))
            .with_context(|| format!("writing {}", path.display()))?;
        let sections = parse_outline(&toc);
        let total = sections.len();
        info!(topic, sections = total, path = %path.display(), "handbook outline saved");
        on_stage(Stage::OutlineDone { sections: total });

        for (index, title) in sections.iter().enumerate() {
            on_stage(Stage::SectionPending { index, total, title: title.clone() });
            if let Err(e) = self.write_section(topic, title, &path) {
                warn!(topic, completed = index, total, "handbook stopped: {e:#}");
                return Err(Error::PartialHandbook {
                    completed: index,
                    total,
                    path,
                    reason: format!("{e:#}"),
                }
                .into());
            }
            on_stage(Stage::SectionDone { index, total, title: title.clone() });
        }

        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        on_stage(Stage::Complete { path: path.clone() });
        info!(topic, path = %path.display(), "handbook complete");
        Ok(Handbook { topic: topic.to_string(), sections, text, path })
    }

    fn write_section(&self, topic: &str, title: &str, path: &Path) -> Result<()> {
        let query = format!("{topic} — {title}");
        let body = match self.retriever.retrieve(&query, self.store, self.top_k)? {
            Some(retrieval) => {
                let messages = section_messages(title, &section_goals(title), &retrieval.evidence);
                self.chat.complete(&messages)?
            }
            None => {
                warn!(title, "no evidence for section");
                REFUSAL.to_string()
            }
        };
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        write!(file, "\n\n---\n\n## {title}\n\n{body}\n")?;
        Ok(())
    }
}

/// Numbered outline lines (`"1. Scope"`, `"12. Storage"`) become section
/// titles. An outline without any yields a single introduction section.
pub fn parse_outline(toc: &str) -> Vec<String> {
    let sections: Vec<String> = toc
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with(|c: char| c.is_ascii_digit())
                && line.chars().take(4).any(|c| c == '.')
        })
        .map(str::to_string)
        .collect();
    if sections.is_empty() {
        vec![FALLBACK_SECTION.to_string()]
    } else {
        sections
    }
}

/// `handbook_<topic>.md`, with spaces as underscores, only filename-safe
/// characters, and at most 40 characters of topic.
pub fn handbook_file_name(topic: &str) -> String {
    let stem: String = topic
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_FILE_STEM_CHARS)
        .collect();
    let stem = if stem.is_empty() { "untitled".to_string() } else { stem };
    format!("handbook_{stem}.md")
}
