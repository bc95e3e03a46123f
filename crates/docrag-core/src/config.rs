//! Layered configuration and path helpers.
//!
//! Figment merges `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_CHUNKING__MAX_TOKENS=600`). The
//! typed [`Settings`] view fills anything missing with defaults. Secrets and
//! backend switches keep their conventional names (`XAI_API_KEY`,
//! `VECTOR_BACKEND`, ...) and are read where they are used.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub handbook: HandbookConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub llm: LlmConfig,
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.chunking.validate()?;
        if self.retrieval.top_k == 0 || self.handbook.top_k == 0 {
            return Err(crate::error::Error::InvalidConfig("top_k must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub pdf_dir: String,
    pub data_dir: String,
    pub handbook_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pdf_dir: "storage/pdfs".into(),
            data_dir: "storage/data".into(),
            handbook_dir: "storage/handbooks".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Lower bound on candidates fetched per sub-query.
    pub min_candidates: usize,
    pub max_subqueries: usize,
    pub evidence_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 6, min_candidates: 4, max_subqueries: 4, evidence_chars: 1500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandbookConfig {
    pub top_k: usize,
    pub evidence_chars: usize,
}

impl Default for HandbookConfig {
    fn default() -> Self {
        Self { top_k: 8, evidence_chars: 1200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Local model directory; `APP_MODEL_DIR`/`MODEL_DIR` take precedence.
    pub model_dir: Option<String>,
    pub max_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { model_dir: None, max_len: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// `local` (alias `faiss`) or `supabase`; `VECTOR_BACKEND` overrides.
    pub backend: String,
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { backend: "local".into(), timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { base_url: "https://api.x.ai".into(), temperature: 0.2, timeout_secs: 120 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = Config::from_figment(Figment::from(Toml::string("[chunking]\nmax_tokens = 300\n")));
        let settings = config.settings().expect("settings");
        assert_eq!(settings.chunking.max_tokens, 300);
        assert_eq!(settings.chunking.overlap_tokens, 120);
        assert_eq!(settings.retrieval.top_k, 6);
        assert_eq!(settings.handbook.top_k, 8);
        assert_eq!(settings.vector.backend, "local");
        assert_eq!(config.get::<usize>("retrieval.evidence_chars").expect("get"), 1500);
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let config = Config::from_figment(Figment::from(Toml::string(
            "[chunking]\nmax_tokens = 100\noverlap_tokens = 100\n",
        )));
        let err = config.settings().expect("settings").validate().expect_err("invalid");
        assert!(matches!(err, crate::error::Error::InvalidConfig(_)));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/docrag");
        assert_eq!(resolve_with_base(base, "storage/data"), base.join("storage/data"));
        assert_eq!(resolve_with_base(base, "/abs/dir"), PathBuf::from("/abs/dir"));
    }
}
