//! File-backed vector store.
//!
//! Layout under the store directory:
//! - `index/`: a LanceDB database holding the `vectors` table
//! - `chunks.json`: the chunk metadata array, ordered by `position`
//!
//! Both are loaded together or not at all. A store whose files disagree (one
//! missing, unreadable, or row count differing from the metadata length) is
//! opened empty and rewritten by the next `add`.

use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, Float32Array, RecordBatch, RecordBatchIterator, UInt32Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Table};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use docrag_core::traits::VectorStore;
use docrag_core::types::{Chunk, RetrievalResult};
use docrag_embed::EmbedderHandle;

use crate::schema::{vectors_to_record_batch, POSITION_COLUMN, TABLE_NAME};

pub const INDEX_DIR: &str = "index";
pub const METADATA_FILE: &str = "chunks.json";

pub struct LocalVectorStore {
    dir: PathBuf,
    embedder: EmbedderHandle,
    runtime: Runtime,
    table: Option<Table>,
    chunks: Vec<Chunk>,
}

impl LocalVectorStore {
    pub fn open(dir: impl Into<PathBuf>, embedder: EmbedderHandle) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let mut store = Self { dir, embedder, runtime, table: None, chunks: Vec::new() };

        let index = store.index_path();
        let metadata = store.metadata_path();
        match (index.exists(), metadata.exists()) {
            (true, true) => match store.load() {
                Ok((table, chunks)) => {
                    info!(dir = %store.dir.display(), chunks = chunks.len(), "loaded vector store");
                    store.table = Some(table);
                    store.chunks = chunks;
                }
                Err(e) => warn!(dir = %store.dir.display(), "ignoring inconsistent vector store: {e:#}"),
            },
            (false, false) => debug!(dir = %store.dir.display(), "no persisted vectors; starting empty"),
            _ => warn!(dir = %store.dir.display(), "only one of index/metadata present; starting empty"),
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_DIR)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    fn index_uri(&self) -> String {
        self.index_path().to_string_lossy().into_owned()
    }

    fn load(&self) -> Result<(Table, Vec<Chunk>)> {
        let raw = std::fs::read_to_string(self.metadata_path())?;
        let chunks: Vec<Chunk> = serde_json::from_str(&raw)?;
        let uri = self.index_uri();
        let (table, rows) = self.runtime.block_on(async {
            let db = connect(&uri).execute().await?;
            let table = db.open_table(TABLE_NAME).execute().await?;
            let rows = table.count_rows(None).await?;
            Ok::<_, anyhow::Error>((table, rows))
        })?;
        if rows != chunks.len() {
            return Err(anyhow!("index has {rows} vectors but metadata lists {} chunks", chunks.len()));
        }
        Ok((table, chunks))
    }

    fn persist_metadata(&self) -> Result<()> {
        let path = self.metadata_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.chunks)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    fn rows_to_results(&self, batch: &RecordBatch, out: &mut Vec<RetrievalResult>) -> Result<()> {
        let positions = batch
            .column_by_name(POSITION_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
            .ok_or_else(|| anyhow!("search result has no {POSITION_COLUMN} column"))?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow!("search result has no _distance column"))?;
        for i in 0..batch.num_rows() {
            if positions.is_null(i) {
                continue;
            }
            let position = positions.value(i) as usize;
            let Some(chunk) = self.chunks.get(position) else {
                warn!(position, "vector without metadata; skipped");
                continue;
            };
            // cosine distance on unit vectors is 1 - inner product
            out.push(RetrievalResult::new(chunk.clone(), 1.0 - distances.value(i)));
        }
        Ok(())
    }
}

impl VectorStore for LocalVectorStore {
    fn add(&mut self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        let first_position = u32::try_from(self.chunks.len())?;
        let batch = vectors_to_record_batch(first_position, &vectors)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));

        match &self.table {
            Some(table) => {
                self.runtime.block_on(async { table.add(reader).execute().await })?;
            }
            None => {
                let index = self.index_path();
                if index.exists() {
                    std::fs::remove_dir_all(&index)
                        .with_context(|| format!("removing stale index {}", index.display()))?;
                }
                let uri = self.index_uri();
                let table = self.runtime.block_on(async {
                    let db = connect(&uri).execute().await?;
                    let table = db.create_table(TABLE_NAME, reader).execute().await?;
                    Ok::<_, anyhow::Error>(table)
                })?;
                self.table = Some(table);
            }
        }

        self.chunks.extend_from_slice(chunks);
        self.persist_metadata()?;
        info!(added = chunks.len(), total = self.chunks.len(), "indexed chunks");
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let Some(table) = &self.table else {
            return Ok(Vec::new());
        };
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query)?;
        let batches: Vec<RecordBatch> = self.runtime.block_on(async {
            let stream = table
                .vector_search(query_vector)?
                .distance_type(DistanceType::Cosine)
                .limit(k)
                .execute()
                .await?;
            Ok::<_, anyhow::Error>(stream.try_collect::<Vec<_>>().await?)
        })?;

        let mut results = Vec::with_capacity(k);
        for batch in &batches {
            self.rows_to_results(batch, &mut results)?;
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        debug!(query, hits = results.len(), "local vector search");
        Ok(results)
    }

    fn reset(&mut self) -> Result<()> {
        self.table = None;
        self.chunks.clear();
        let index = self.index_path();
        if index.exists() {
            std::fs::remove_dir_all(&index).with_context(|| format!("removing {}", index.display()))?;
        }
        let metadata = self.metadata_path();
        if metadata.exists() {
            std::fs::remove_file(&metadata).with_context(|| format!("removing {}", metadata.display()))?;
        }
        info!(dir = %self.dir.display(), "vector store reset");
        Ok(())
    }

    fn len(&self) -> Option<usize> {
        Some(self.chunks.len())
    }
}
