//! Proveedores de embeddings.
//!
//! El núcleo sólo conoce el trait [`EmbeddingProvider`]; las implementaciones
//! concretas usan Rig (OpenAI) o fastembed en local (feature
//! `local-embeddings`). Todas devuelven vectores normalizados L2.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{RagError, Result};

/// Capacidad externa: texto → vector de dimensión fija, normalizado.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identificador del modelo (se guarda en el manifiesto del almacén).
    fn model_name(&self) -> &str;

    /// Un vector por texto, en el mismo orden.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Construye un proveedor para un dispositivo concreto.
pub type EmbedderFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync>;

/// Fábrica por defecto a partir de la configuración.
pub fn default_factory(cfg: EmbeddingConfig) -> EmbedderFactory {
    Arc::new(move |device: &str| create_embedder(&cfg, device))
}

pub fn create_embedder(cfg: &EmbeddingConfig, device: &str) -> Result<Arc<dyn EmbeddingProvider>> {
    match cfg.backend {
        EmbeddingBackend::OpenAI => {
            if device != "cpu" {
                debug!("Dispositivo '{device}' ignorado: los embeddings de OpenAI son remotos.");
            }
            Ok(Arc::new(OpenAiEmbedder::new(cfg)?))
        }
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => Ok(Arc::new(local::LocalEmbedder::new(cfg, device)?)),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => Err(RagError::Embedding(
            "el proveedor local requiere compilar con --features local-embeddings".into(),
        )),
    }
}

// ---------------------------------------------------------------------
// OPENAI (vía Rig)
// ---------------------------------------------------------------------

pub struct OpenAiEmbedder {
    model: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(RagError::Embedding("Falta OPENAI_API_KEY en el entorno".into()));
        }
        Ok(Self {
            model: cfg.model.clone(),
            batch_size: cfg.batch_size.max(1),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use rig::client::{EmbeddingsClient as _, ProviderClient as _};
        use rig::embeddings::EmbeddingModel as _;
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let embedding_model = client.embedding_model(&self.model);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = embedding_model
                .embed_texts(batch.to_vec())
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;

            if embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Número de embeddings ({}) distinto al número de textos ({})",
                    embeddings.len(),
                    batch.len()
                )));
            }

            vectors.extend(embeddings.into_iter().map(|e| {
                let mut v: Vec<f32> = e.vec.into_iter().map(|x| x as f32).collect();
                normalize(&mut v);
                v
            }));
        }
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------
// LOCAL (fastembed)
// ---------------------------------------------------------------------

#[cfg(feature = "local-embeddings")]
mod local {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tracing::{info, warn};

    use super::{normalize, EmbeddingProvider};
    use crate::config::EmbeddingConfig;
    use crate::error::{RagError, Result};

    pub struct LocalEmbedder {
        model: String,
        batch_size: usize,
        engine: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalEmbedder {
        pub fn new(cfg: &EmbeddingConfig, device: &str) -> Result<Self> {
            if device != "cpu" {
                warn!("El proveedor local sólo usa CPU; se ignora el dispositivo '{device}'.");
            }
            let model = model_for(&cfg.model)?;
            info!("Cargando modelo local de embeddings '{}'...", cfg.model);
            let engine = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(model))
                .map_err(|e| RagError::Embedding(format!("no se pudo cargar el modelo local: {e}")))?;
            Ok(Self {
                model: cfg.model.clone(),
                batch_size: cfg.batch_size.max(1),
                engine: Arc::new(Mutex::new(engine)),
            })
        }
    }

    fn model_for(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            other => Err(RagError::Embedding(format!("modelo local no soportado: {other}"))),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let engine = Arc::clone(&self.engine);
            let texts = texts.to_vec();
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut engine = engine
                    .lock()
                    .map_err(|_| RagError::Embedding("modelo local envenenado".into()))?;
                let mut vectors = engine
                    .embed(texts, Some(batch_size))
                    .map_err(|e| RagError::Embedding(e.to_string()))?;
                vectors.iter_mut().for_each(|v| normalize(v));
                Ok(vectors)
            })
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?
        }
    }
}

// ---------------------------------------------------------------------
// Utilidades vectoriales
// ---------------------------------------------------------------------

/// Normaliza in situ a norma L2 = 1. Los vectores nulos se dejan igual.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        warn!("Vector de embedding nulo; no se normaliza.");
        return;
    }
    v.iter_mut().for_each(|x| *x /= norm);
}

/// Similitud coseno. Devuelve 0.0 para vectores vacíos o de distinta longitud.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_yields_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn local_backend_requires_feature() {
        let cfg = EmbeddingConfig {
            backend: EmbeddingBackend::Local,
            model: "all-minilm-l6-v2".into(),
            batch_size: 8,
        };
        let err = create_embedder(&cfg, "cpu").err().unwrap();
        assert_eq!(err.kind(), "embedding_failure");
    }
}
