#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use docrag_core::traits::{ChatModel, VectorStore};
use docrag_core::types::{ChatMessage, Chunk, RetrievalResult};

pub fn chunk(source: &str, page: u32, idx: u32, text: &str) -> Chunk {
    Chunk { text: text.to_string(), page, chunk_index: idx, source_path: source.to_string() }
}

/// Canned hits per exact query string; records every search.
#[derive(Default)]
pub struct ScriptedStore {
    responses: HashMap<String, Vec<RetrievalResult>>,
    pub searches: Mutex<Vec<(String, usize)>>,
}

impl ScriptedStore {
    pub fn with(mut self, query: &str, hits: Vec<RetrievalResult>) -> Self {
        self.responses.insert(query.to_string(), hits);
        self
    }

    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().expect("lock").clone()
    }
}

impl VectorStore for ScriptedStore {
    fn add(&mut self, _chunks: &[Chunk]) -> Result<()> {
        Err(anyhow!("scripted store is read-only"))
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.searches.lock().expect("lock").push((query.to_string(), k));
        let mut hits = self.responses.get(query).cloned().unwrap_or_default();
        hits.truncate(k);
        Ok(hits)
    }
}

/// Scores chunks by the share of query words they contain.
#[derive(Default)]
pub struct KeywordStore {
    chunks: Vec<Chunk>,
}

impl VectorStore for KeywordStore {
    fn add(&mut self, chunks: &[Chunk]) -> Result<()> {
        self.chunks.extend_from_slice(chunks);
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<RetrievalResult> = self
            .chunks
            .iter()
            .filter_map(|c| {
                let text = c.text.to_lowercase();
                let matched = words.iter().filter(|w| text.contains(w.as_str())).count();
                (matched > 0).then(|| RetrievalResult::new(c.clone(), matched as f32 / words.len() as f32))
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> Option<usize> {
        Some(self.chunks.len())
    }
}

/// Replays scripted replies in order and records every request.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn replying<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String>>,
    {
        Self { replies: Mutex::new(replies.into_iter().collect()), calls: Mutex::default() }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("lock").clone()
    }
}

impl ChatModel for ScriptedChat {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().expect("lock").push(messages.to_vec());
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
    }
}
