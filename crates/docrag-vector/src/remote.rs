//! Supabase (PostgREST + pgvector) vector store.
//!
//! Expects a `documents` table (`id`, `source`, `title`), a `chunks` table
//! (`document_id`, `chunk_index`, `page_start`, `page_end`, `content`,
//! `metadata`, `embedding`) and an RPC `match_chunks(query_embedding,
//! match_count)` returning chunk rows with a `similarity` column.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use docrag_core::error::Error;
use docrag_core::traits::VectorStore;
use docrag_core::types::{Chunk, RetrievalResult};
use docrag_embed::EmbedderHandle;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

impl SupabaseConfig {
    /// `SUPABASE_URL` plus `SUPABASE_SERVICE_ROLE_KEY` (or `SUPABASE_ANON_KEY`).
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let url = non_empty_env("SUPABASE_URL");
        let key = non_empty_env("SUPABASE_SERVICE_ROLE_KEY").or_else(|| non_empty_env("SUPABASE_ANON_KEY"));
        match (url, key) {
            (Some(url), Some(key)) => Ok(Self { url, key, timeout }),
            _ => Err(Error::InvalidConfig(
                "Missing SUPABASE_URL and/or SUPABASE_SERVICE_ROLE_KEY (or SUPABASE_ANON_KEY)".into(),
            )
            .into()),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub struct SupabaseVectorStore {
    client: Client,
    base_url: String,
    embedder: EmbedderHandle,
    document_ids: HashMap<String, Value>,
}

impl SupabaseVectorStore {
    pub fn new(config: SupabaseConfig, embedder: EmbedderHandle) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(config.key.trim()).context("invalid Supabase key")?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.key.trim())).context("invalid Supabase key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("failed to build Supabase HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            embedder,
            document_ids: HashMap::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    /// Id of the document row for `source`, inserting the row on first use.
    fn document_id(&mut self, source: &str) -> Result<Value> {
        if let Some(id) = self.document_ids.get(source) {
            return Ok(id.clone());
        }
        let filter = format!("eq.{source}");
        let existing: Vec<IdRow> = send(
            self.client
                .get(self.endpoint("documents"))
                .query(&[("select", "id"), ("source", filter.as_str()), ("limit", "1")]),
        )?
        .json()
        .context("failed to parse documents lookup")?;

        let id = match existing.into_iter().next() {
            Some(row) => row.id,
            None => {
                let created: Vec<IdRow> = send(
                    self.client
                        .post(self.endpoint("documents"))
                        .header("Prefer", "return=representation")
                        .json(&[json!({ "source": source, "title": source })]),
                )?
                .json()
                .context("failed to parse created document")?;
                let row = created
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::Operation(format!("document insert for {source} returned no row")))?;
                info!(source, "created document record");
                row.id
            }
        };
        self.document_ids.insert(source.to_string(), id.clone());
        Ok(id)
    }
}

fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().context("Supabase request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(Error::Transport { status: status.as_u16(), body }.into());
    }
    Ok(response)
}

/// File-name-only document key, so the same PDF uploaded from different
/// directories maps to one document row.
pub fn normalize_source(source_path: &str) -> String {
    Path::new(source_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source_path)
        .to_string()
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Value,
}

#[derive(Debug, Serialize)]
pub struct ChunkRow<'a> {
    pub document_id: &'a Value,
    pub chunk_index: u32,
    pub page_start: u32,
    pub page_end: u32,
    pub content: &'a str,
    pub metadata: Value,
    pub embedding: &'a [f32],
}

impl<'a> ChunkRow<'a> {
    pub fn new(document_id: &'a Value, chunk: &'a Chunk, embedding: &'a [f32]) -> Self {
        Self {
            document_id,
            chunk_index: chunk.chunk_index,
            page_start: chunk.page,
            page_end: chunk.page,
            content: &chunk.text,
            metadata: json!({ "source_path": chunk.source_path, "page": chunk.page }),
            embedding,
        }
    }
}

/// One row of `match_chunks`. Older rows may lack metadata, hence the defaults.
#[derive(Debug, Deserialize)]
pub struct MatchRow {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub page_start: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub similarity: Option<f32>,
}

impl MatchRow {
    pub fn into_result(self) -> RetrievalResult {
        let metadata = self.metadata.unwrap_or(Value::Null);
        let source_path = metadata
            .get("source_path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(self.source)
            .unwrap_or_else(|| "unknown".to_string());
        let page = metadata
            .get("page")
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok())
            .or(self.page_start)
            .unwrap_or(1);
        let chunk = Chunk {
            text: self.content,
            page,
            chunk_index: self.chunk_index.unwrap_or(0),
            source_path,
        };
        RetrievalResult::new(chunk, self.similarity.unwrap_or(0.0))
    }
}

impl VectorStore for SupabaseVectorStore {
    fn add(&mut self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;

        let mut document_ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            document_ids.push(self.document_id(&normalize_source(&chunk.source_path))?);
        }
        let rows: Vec<ChunkRow<'_>> = chunks
            .iter()
            .zip(&vectors)
            .zip(&document_ids)
            .map(|((chunk, vector), id)| ChunkRow::new(id, chunk, vector))
            .collect();
        send(self.client.post(self.endpoint("chunks")).json(&rows))?;
        info!(added = rows.len(), "inserted chunks into Supabase");
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_query(query)?;
        let rows: Vec<MatchRow> = send(
            self.client
                .post(self.endpoint("rpc/match_chunks"))
                .json(&json!({ "query_embedding": query_embedding, "match_count": k })),
        )?
        .json()
        .context("failed to parse match_chunks response")?;
        let mut results: Vec<RetrievalResult> = rows.into_iter().map(MatchRow::into_result).collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        debug!(query, hits = results.len(), "remote vector search");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    #[test]
    fn source_is_file_name_only() {
        assert_eq!(normalize_source("/tmp/uploads/Guide.pdf"), "Guide.pdf");
        assert_eq!(normalize_source("Guide.pdf"), "Guide.pdf");
    }

    #[test]
    fn chunk_row_carries_page_bounds_and_metadata() {
        let chunk = Chunk { text: "body".into(), page: 4, chunk_index: 2, source_path: "/x/a.pdf".into() };
        let id = json!(17);
        let embedding = [0.6f32, 0.8];
        let row = serde_json::to_value(ChunkRow::new(&id, &chunk, &embedding)).expect("json");
        assert_eq!(
            row,
            json!({
                "document_id": 17,
                "chunk_index": 2,
                "page_start": 4,
                "page_end": 4,
                "content": "body",
                "metadata": {"source_path": "/x/a.pdf", "page": 4},
                "embedding": [0.6f32, 0.8f32],
            })
        );
    }

    #[test]
    fn match_rows_fall_back_when_metadata_missing() {
        let rows: Vec<MatchRow> = serde_json::from_value(json!([
            {"content": "a", "chunk_index": 1, "metadata": {"source_path": "/d/a.pdf", "page": 3}, "similarity": 0.9},
            {"content": "b", "source": "b.pdf", "similarity": 0.4},
            {"content": "c"}
        ]))
        .expect("rows");
        let results: Vec<RetrievalResult> = rows.into_iter().map(MatchRow::into_result).collect();

        assert_eq!(results[0].chunk.source_path, "/d/a.pdf");
        assert_eq!((results[0].chunk.page, results[0].chunk.chunk_index), (3, 1));
        assert!((results[0].score - 0.9).abs() < 1e-6);

        assert_eq!(results[1].chunk.source_path, "b.pdf");
        assert_eq!(results[1].chunk.page, 1);

        assert_eq!(results[2].chunk.source_path, "unknown");
        assert_eq!(results[2].score, 0.0);
    }

    struct Recorded {
        method: String,
        target: String,
        apikey: Option<String>,
        body: String,
    }

    /// Answers one request per `(status, body)` reply, in order, closing each
    /// connection; yields what was received.
    fn serve(replies: Vec<(&'static str, &'static str)>) -> (String, JoinHandle<Vec<Recorded>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}", listener.local_addr().expect("addr"));
        let handle = std::thread::spawn(move || {
            let mut recorded = Vec::new();
            for (status, body) in replies {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).expect("request line");
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let target = parts.next().unwrap_or_default().to_string();
                let mut content_length = 0usize;
                let mut apikey = None;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("header");
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().expect("length");
                        } else if name.eq_ignore_ascii_case("apikey") {
                            apikey = Some(value.trim().to_string());
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).expect("body");
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                reader.get_mut().write_all(response.as_bytes()).expect("respond");
                recorded.push(Recorded {
                    method,
                    target,
                    apikey,
                    body: String::from_utf8(request_body).expect("utf8"),
                });
            }
            recorded
        });
        (url, handle)
    }

    fn store_at(url: String) -> SupabaseVectorStore {
        let config = SupabaseConfig { url: format!("{url}/"), key: "service-key".into(), timeout: Duration::from_secs(5) };
        let embedder = EmbedderHandle::ready(std::sync::Arc::new(docrag_embed::FakeEmbedder::new(8)));
        SupabaseVectorStore::new(config, embedder).expect("store")
    }

    fn chunk(source_path: &str, page: u32, chunk_index: u32) -> Chunk {
        Chunk { text: format!("pump seals {page} {chunk_index}"), page, chunk_index, source_path: source_path.into() }
    }

    #[test]
    fn document_row_is_created_once_and_reused() {
        let (url, server) = serve(vec![
            ("200 OK", "[]"),
            ("201 Created", r#"[{"id": 17}]"#),
            ("201 Created", ""),
            ("201 Created", ""),
        ]);
        let mut store = store_at(url);
        store.add(&[chunk("/x/a.pdf", 1, 0), chunk("/x/a.pdf", 1, 1)]).expect("first add");
        // same file name from another directory maps to the same document
        store.add(&[chunk("/y/a.pdf", 2, 0)]).expect("second add");

        let requests = server.join().expect("server");
        let calls: Vec<(&str, &str)> = requests.iter().map(|r| (r.method.as_str(), r.target.as_str())).collect();
        assert_eq!(calls[0].0, "GET");
        assert!(calls[0].1.starts_with("/rest/v1/documents?"), "{}", calls[0].1);
        assert!(calls[0].1.contains("source=eq.a.pdf"), "{}", calls[0].1);
        assert_eq!(&calls[1..], &[("POST", "/rest/v1/documents"), ("POST", "/rest/v1/chunks"), ("POST", "/rest/v1/chunks")]);
        assert!(requests.iter().all(|r| r.apikey.as_deref() == Some("service-key")));

        let created: Value = serde_json::from_str(&requests[1].body).expect("json");
        assert_eq!(created, json!([{"source": "a.pdf", "title": "a.pdf"}]));

        let first: Value = serde_json::from_str(&requests[2].body).expect("json");
        assert_eq!(first.as_array().map(Vec::len), Some(2));
        assert!(first.as_array().into_iter().flatten().all(|row| row["document_id"] == json!(17)));
        assert_eq!(first[1]["chunk_index"], json!(1));
        assert_eq!(first[0]["embedding"].as_array().map(Vec::len), Some(8));

        let second: Value = serde_json::from_str(&requests[3].body).expect("json");
        assert_eq!(second[0]["document_id"], json!(17));
        assert_eq!(second[0]["metadata"], json!({"source_path": "/y/a.pdf", "page": 2}));
    }

    #[test]
    fn existing_document_row_is_looked_up_not_created() {
        let (url, server) = serve(vec![("200 OK", r#"[{"id": "doc-9"}]"#), ("201 Created", "")]);
        let mut store = store_at(url);
        store.add(&[chunk("/x/b.pdf", 1, 0)]).expect("add");

        let requests = server.join().expect("server");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].target, "/rest/v1/chunks");
        let rows: Value = serde_json::from_str(&requests[1].body).expect("json");
        assert_eq!(rows[0]["document_id"], json!("doc-9"));
    }

    #[test]
    fn search_calls_match_chunks_and_orders_by_similarity() {
        let (url, server) = serve(vec![(
            "200 OK",
            r#"[{"content": "low", "chunk_index": 0, "metadata": {"source_path": "/d/a.pdf", "page": 1}, "similarity": 0.2},
                {"content": "high", "chunk_index": 3, "metadata": {"source_path": "/d/a.pdf", "page": 2}, "similarity": 0.8}]"#,
        )]);
        let store = store_at(url);
        let hits = store.search("pump seals", 2).expect("search");

        let requests = server.join().expect("server");
        assert_eq!((requests[0].method.as_str(), requests[0].target.as_str()), ("POST", "/rest/v1/rpc/match_chunks"));
        let body: Value = serde_json::from_str(&requests[0].body).expect("json");
        assert_eq!(body["match_count"], json!(2));
        assert_eq!(body["query_embedding"].as_array().map(Vec::len), Some(8));

        assert_eq!(hits.iter().map(|h| h.chunk.text.as_str()).collect::<Vec<_>>(), vec!["high", "low"]);
        assert_eq!((hits[0].chunk.page, hits[0].chunk.chunk_index), (2, 3));
    }

    #[test]
    fn error_status_from_rpc_is_transport() {
        let (url, server) = serve(vec![("500 Internal Server Error", r#"{"message":"function match_chunks does not exist"}"#)]);
        let err = store_at(url).search("pump seals", 3).expect_err("status");
        server.join().expect("server");
        match err.downcast_ref::<Error>() {
            Some(Error::Transport { status, body }) => {
                assert_eq!(*status, 500);
                assert_eq!(body, r#"{"message":"function match_chunks does not exist"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reset_is_refused() {
        let config = SupabaseConfig { url: "http://127.0.0.1:9".into(), key: "k".into(), timeout: Duration::from_secs(1) };
        let embedder = EmbedderHandle::ready(std::sync::Arc::new(docrag_embed::FakeEmbedder::new(8)));
        let mut store = SupabaseVectorStore::new(config, embedder).expect("store");
        let err = store.reset().expect_err("unsupported");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unsupported(_))));
        assert_eq!(store.len(), None);
    }
}
