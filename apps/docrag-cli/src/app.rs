use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use docrag_core::config::{resolve_with_base, Config, Settings};
use docrag_core::error::Error;
use docrag_core::traits::{TextExtractor, VectorStore};
use docrag_core::Chunker;
use docrag_embed::{default_handle, EmbedderHandle};
use docrag_rag::{
    provenance_tag, Assistant, HandbookGenerator, MultiQueryRetriever, RetrieverOptions, Stage, XaiClient,
};
use docrag_text::{discover_documents, DocumentExtractor};

use crate::cli::Command;

const PREVIEW_CHARS: usize = 160;

pub struct App {
    settings: Settings,
    root: PathBuf,
    embedder: EmbedderHandle,
}

impl App {
    pub fn new(settings: Settings, root: impl Into<PathBuf>) -> Self {
        let embedder = default_handle(&settings.embedding);
        Self { settings, root: root.into(), embedder }
    }

    /// Layered config from the working directory.
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        let root = std::env::current_dir().context("resolving working directory")?;
        Ok(Self::new(config.settings()?, root))
    }

    pub fn with_embedder(mut self, embedder: EmbedderHandle) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pdf_dir(&self) -> PathBuf {
        resolve_with_base(&self.root, &self.settings.storage.pdf_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        resolve_with_base(&self.root, &self.settings.storage.data_dir)
    }

    pub fn handbook_dir(&self) -> PathBuf {
        resolve_with_base(&self.root, &self.settings.storage.handbook_dir)
    }

    fn open_store(&self) -> Result<Box<dyn VectorStore>> {
        docrag_vector::open_store(&self.settings.vector, &self.data_dir(), self.embedder.clone())
    }

    fn chat(&self) -> Result<XaiClient> {
        XaiClient::from_env(&self.settings.llm)
    }

    fn top_k(&self, requested: Option<NonZeroUsize>) -> usize {
        requested.map_or(self.settings.retrieval.top_k, NonZeroUsize::get)
    }

    pub fn run(&self, command: Command, out: &mut dyn Write) -> Result<()> {
        match command {
            Command::Extract { file } => self.extract(&file, out),
            Command::Chunk { file } => self.chunk(&file, out),
            Command::Index { paths, no_copy } => self.index(&paths, !no_copy, out),
            Command::Reset => {
                self.open_store()?.reset()?;
                writeln!(out, "index reset")?;
                Ok(())
            }
            Command::Search { query, top_k } => self.search(&query, self.top_k(top_k), out),
            Command::Ask { question, top_k, show_context } => {
                self.ask(&question, self.top_k(top_k), show_context, out)
            }
            Command::Handbook { topic } => self.handbook(&topic, out),
            Command::List => {
                let documents = discover_documents(&self.pdf_dir());
                if documents.is_empty() {
                    writeln!(out, "no documents in {}", self.pdf_dir().display())?;
                }
                for doc in documents {
                    writeln!(out, "{}", doc.display())?;
                }
                Ok(())
            }
        }
    }

    fn extract(&self, file: &Path, out: &mut dyn Write) -> Result<()> {
        let pages = DocumentExtractor::default().extract(file)?;
        for page in &pages {
            let words = page.text.split_whitespace().count();
            writeln!(out, "## page {} ({words} words)", page.page_number)?;
            writeln!(out, "{}", preview(&page.text, PREVIEW_CHARS))?;
        }
        Ok(())
    }

    fn chunk(&self, file: &Path, out: &mut dyn Write) -> Result<()> {
        let pages = DocumentExtractor::default().extract(file)?;
        let chunker = Chunker::new(self.settings.chunking)?;
        let chunks = chunker.chunk(&pages, &file.to_string_lossy());
        for chunk in &chunks {
            let words = chunk.text.split_whitespace().count();
            writeln!(out, "{} ({words} words) {}", provenance_tag(chunk), preview(&chunk.text, PREVIEW_CHARS))?;
        }
        writeln!(out, "{} chunks from {} pages", chunks.len(), pages.len())?;
        Ok(())
    }

    fn index(&self, inputs: &[PathBuf], copy: bool, out: &mut dyn Write) -> Result<()> {
        let documents = collect_documents(inputs)?;
        if documents.is_empty() {
            writeln!(out, "no documents found")?;
            return Ok(());
        }
        let extractor = DocumentExtractor::default();
        let chunker = Chunker::new(self.settings.chunking)?;
        let mut store = self.open_store()?;

        let pb = ProgressBar::new(documents.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
                .progress_chars("#>-"),
        );
        let mut summary = Vec::with_capacity(documents.len());
        for doc in &documents {
            pb.set_message(display_name(doc));
            let stored = if copy { self.persist_document(doc)? } else { doc.clone() };
            let pages = extractor.extract(&stored)?;
            let chunks = chunker.chunk(&pages, &stored.to_string_lossy());
            store.add(&chunks)?;
            summary.push(format!("{}: {} pages, {} chunks", display_name(&stored), pages.len(), chunks.len()));
            pb.inc(1);
        }
        pb.finish_and_clear();

        for line in &summary {
            writeln!(out, "{line}")?;
        }
        if let Some(total) = store.len() {
            writeln!(out, "{total} chunks indexed")?;
        }
        info!(documents = documents.len(), "indexing complete");
        Ok(())
    }

    /// Copies `doc` into the storage directory unless it already lives there.
    fn persist_document(&self, doc: &Path) -> Result<PathBuf> {
        let pdf_dir = self.pdf_dir();
        std::fs::create_dir_all(&pdf_dir).with_context(|| format!("creating {}", pdf_dir.display()))?;
        let name = doc
            .file_name()
            .ok_or_else(|| Error::NotFound(format!("no file name in {}", doc.display())))?;
        let dest = pdf_dir.join(name);
        let same = match (doc.canonicalize(), dest.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same {
            std::fs::copy(doc, &dest).with_context(|| format!("copying {} to {}", doc.display(), dest.display()))?;
        }
        Ok(dest)
    }

    fn search(&self, query: &str, k: usize, out: &mut dyn Write) -> Result<()> {
        let hits = self.open_store()?.search(query, k)?;
        if hits.is_empty() {
            writeln!(out, "no results")?;
        }
        for hit in &hits {
            writeln!(out, "{:.3} {} {}", hit.score, provenance_tag(&hit.chunk), preview(&hit.chunk.text, PREVIEW_CHARS))?;
        }
        Ok(())
    }

    fn ask(&self, question: &str, k: usize, show_context: bool, out: &mut dyn Write) -> Result<()> {
        let chat = self.chat()?;
        let store = self.open_store()?;
        let retriever = MultiQueryRetriever::new(RetrieverOptions::from(&self.settings.retrieval));
        let answer = Assistant::new(store.as_ref(), &chat, retriever).answer(question, k)?;
        writeln!(out, "{answer}")?;
        if show_context && !answer.context().is_empty() {
            writeln!(out, "\n--- retrieved context ---\n{}", answer.context())?;
        }
        Ok(())
    }

    fn handbook(&self, topic: &str, out: &mut dyn Write) -> Result<()> {
        let chat = self.chat()?;
        let store = self.open_store()?;
        let options = RetrieverOptions::for_handbook(&self.settings.retrieval, &self.settings.handbook);
        let generator = HandbookGenerator::new(
            store.as_ref(),
            &chat,
            MultiQueryRetriever::new(options),
            self.settings.handbook.top_k,
            self.handbook_dir(),
        );

        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sections {msg}")?
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        let result = generator.generate_with_progress(topic, |stage| match stage {
            Stage::OutlinePending => pb.set_message("drafting outline"),
            Stage::OutlineDone { sections } => pb.set_length(sections as u64),
            Stage::SectionPending { title, .. } => pb.set_message(title),
            Stage::SectionDone { .. } => pb.inc(1),
            Stage::Complete { .. } => pb.finish_and_clear(),
        });
        let handbook = match result {
            Ok(handbook) => handbook,
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        };
        writeln!(out, "{} sections written to {}", handbook.sections.len(), handbook.path.display())?;
        Ok(())
    }
}

/// Files are taken as given; directories contribute every document below them.
fn collect_documents(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_dir() {
            documents.extend(discover_documents(input));
        } else if input.is_file() {
            documents.push(input.clone());
        } else {
            return Err(Error::NotFound(format!("document not found: {}", input.display())).into());
        }
    }
    Ok(documents)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}...")
}
