//! Carga y gestión de configuración de la aplicación (índice, embeddings y LLM).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    HuggingFace,
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EmbeddingBackend {
    OpenAI,
    Local,
}

impl EmbeddingBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "local" => Ok(Self::Local),
            other => Err(anyhow!("Proveedor de embeddings no soportado: {other}")),
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "text-embedding-3-small",
            Self::Local => "all-minilm-l6-v2",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub batch_size: usize,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Modelo o repositorio (p. ej. `mistralai/Mistral-7B-Instruct-v0.1`).
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub replace_stale_chunks: bool,
    pub default_top_k: usize,
    pub default_device: String,

    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,

    pub server_addr: String,
    /// Secreto compartido del endpoint de administración; `None` lo desactiva.
    pub admin_token: Option<String>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que [`from_env`](Self::from_env) pero con una fuente arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let index_dir = PathBuf::from(
            get("INDEX_DIR")
                .or_else(|| get("CHROMA_PATH"))
                .unwrap_or_else(|| "index".to_string()),
        );

        let chunk_size = parse_or(get("CHUNK_SIZE"), "CHUNK_SIZE", 800usize)?;
        let chunk_overlap = parse_or(get("CHUNK_OVERLAP"), "CHUNK_OVERLAP", 150usize)?;
        let replace_stale_chunks = parse_bool(get("REPLACE_STALE_CHUNKS"), "REPLACE_STALE_CHUNKS", true)?;
        let default_top_k = parse_or(get("DEFAULT_TOP_K"), "DEFAULT_TOP_K", 5usize)?;
        // Texto libre (`cpu`, `cuda:0`, `mps`...); el proveedor decide qué admite.
        let default_device = get("EMBED_DEVICE")
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "cpu".to_string());

        let backend = EmbeddingBackend::from_str(&get("EMBED_PROVIDER").unwrap_or_else(|| "openai".to_string()))?;
        let embedding = EmbeddingConfig {
            model: get("EMBED_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
            batch_size: parse_or(get("EMBED_BATCH_SIZE"), "EMBED_BATCH_SIZE", 64usize)?,
            backend,
        };

        let llm = LlmConfig {
            provider: LlmProvider::from_str(&get("LLM_PROVIDER").unwrap_or_else(|| "huggingface".to_string()))?,
            model: get("LLM_MODEL").unwrap_or_else(|| "mistralai/Mistral-7B-Instruct-v0.1".to_string()),
            temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", 0.1f64)?,
            max_tokens: parse_or(get("LLM_MAX_TOKENS"), "LLM_MAX_TOKENS", 512u64)?,
        };

        let server_addr = get("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8000".to_string());
        let admin_token = get("ADMIN_TOKEN");

        let cfg = Self {
            data_dir,
            index_dir,
            chunk_size,
            chunk_overlap,
            replace_stale_chunks,
            default_top_k,
            default_device,
            embedding,
            llm,
            server_addr,
            admin_token,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE debe ser mayor que 0");
        }
        if self.chunk_overlap > self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) no puede superar CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.default_top_k == 0 {
            bail!("DEFAULT_TOP_K debe ser >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("EMBED_BATCH_SIZE debe ser >= 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("LLM_TEMPERATURE debe estar en [0.0, 2.0]");
        }
        Ok(())
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {key}: '{value}'")),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, key: &str, default: bool) -> Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("Valor booleano inválido para {key}: '{v}'"),
        },
    }
}
