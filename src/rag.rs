//! Orquestación de consultas RAG.
//!
//! Flujo de `answer_question`:
//!   1. Validar la entrada (pregunta de al menos 2 caracteres, k > 0).
//!   2. Reconciliar el índice en modo no forzado.
//!   3. Recuperar los `k` chunks más parecidos.
//!   4. Componer la respuesta con la pregunta y el texto recuperado.
//!
//! Los fallos de 2-4 se devuelven envueltos en `RagError::QueryFailed`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::embedding::{self, EmbedderFactory, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::ingest::{IndexSummary, Indexer};
use crate::llm::{self, AnswerComposer, ComposerFactory};
use crate::models::QueryResult;
use crate::retriever::Retriever;

/// Longitud mínima de la pregunta, en caracteres del texto recibido.
pub const MIN_QUESTION_CHARS: usize = 2;

pub struct RagService {
    config: AppConfig,
    indexer: Indexer,
    embedder_factory: EmbedderFactory,
    embedders: Mutex<HashMap<String, Arc<dyn EmbeddingProvider>>>,
    composer_factory: ComposerFactory,
    composer: OnceCell<Arc<dyn AnswerComposer>>,
}

impl RagService {
    /// Servicio con los proveedores reales (Rig / fastembed).
    pub fn new(config: AppConfig) -> Result<Self> {
        let embedders = embedding::default_factory(config.embedding.clone());
        let composer = llm::default_factory(config.llm.clone());
        Self::with_providers(config, embedders, composer)
    }

    pub fn with_providers(
        config: AppConfig,
        embedder_factory: EmbedderFactory,
        composer_factory: ComposerFactory,
    ) -> Result<Self> {
        let indexer = Indexer::from_config(&config)?;
        Ok(Self {
            config,
            indexer,
            embedder_factory,
            embedders: Mutex::new(HashMap::new()),
            composer_factory,
            composer: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Reconciliación explícita (endpoint de administración y CLI).
    pub async fn reindex(&self, force: bool, device: Option<&str>) -> Result<IndexSummary> {
        let device = self.resolve_device(device);
        let embedder = self.embedder(&device)?;
        let (_, summary) = self.indexer.reconcile(embedder, force).await?;
        Ok(summary)
    }

    pub async fn answer_question(
        &self,
        question: &str,
        k: Option<usize>,
        device: Option<&str>,
    ) -> Result<QueryResult> {
        // 1) Validación, sin E/S. La longitud se mide sobre el texto recibido.
        if question.chars().count() < MIN_QUESTION_CHARS || question.trim().is_empty() {
            return Err(RagError::InvalidInput("la pregunta es demasiado corta".into()));
        }
        let question = question.trim();
        let k = k.unwrap_or(self.config.default_top_k);
        if k == 0 {
            return Err(RagError::InvalidInput("k debe ser un entero positivo".into()));
        }
        let device = self.resolve_device(device);

        self.run_query(question, k, &device).await.map_err(|e| {
            warn!("La consulta falló: {e}");
            RagError::query_failed(e)
        })
    }

    async fn run_query(&self, question: &str, k: usize, device: &str) -> Result<QueryResult> {
        // 2) Índice al día
        let embedder = self.embedder(device)?;
        let (store, summary) = self.indexer.reconcile(embedder, false).await?;
        if summary.files_indexed > 0 {
            info!("Índice actualizado antes de la consulta. {summary}");
        }

        // 3) Recuperación
        let sources = Retriever::new(&store).retrieve(question, k).await?;

        // 4) Composición
        let composer = self.composer().await?;
        let context: Vec<String> = sources.iter().map(|s| s.text.clone()).collect();
        let answer = composer.compose(question, &context).await?;

        Ok(QueryResult { answer, sources })
    }

    /// Primer uso: ejecuta la fábrica bajo el cerrojo interno de la celda. Un
    /// fallo no se memoriza y el siguiente intento vuelve a probar.
    async fn composer(&self) -> Result<Arc<dyn AnswerComposer>> {
        self.composer
            .get_or_try_init(|| async { (self.composer_factory)() })
            .await
            .cloned()
    }

    fn embedder(&self, device: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        let mut cache = self.embedders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(embedder) = cache.get(device) {
            return Ok(Arc::clone(embedder));
        }
        let embedder = (self.embedder_factory)(device)?;
        cache.insert(device.to_string(), Arc::clone(&embedder));
        Ok(embedder)
    }

    /// Cualquier dispositivo no vacío (`cpu`, `cuda:1`, `mps`...) se pasa tal
    /// cual al proveedor, que decide si lo usa.
    fn resolve_device(&self, device: Option<&str>) -> String {
        device
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.config.default_device.clone())
    }
}
