//! Reconciliación del índice con el directorio de datos.
//!
//! Cada invocación sigue la misma secuencia:
//!   1. Descubrir: escaneo de ficheros, lectura del ledger y apertura del almacén.
//!   2. Clasificar: un fichero está obsoleto si no figura en el ledger o si su
//!      mtime supera al registrado en más de `MTIME_EPSILON`.
//!   3. Atajo: sin obsoletos no se calcula ningún embedding ni se escribe nada
//!      (salvo crear un almacén vacío la primera vez).
//!   4. Procesar: cargar y trocear los obsoletos en orden de descubrimiento. El
//!      primer fallo de carga aborta la pasada completa.
//!   5. Confirmar: añadir al almacén, `persist()` y sólo entonces guardar el ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chunker::TextSplitter;
use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::ledger::{IndexLedger, LedgerEntries};
use crate::loader;
use crate::models::{Chunk, RawDocument, SourceFile};
use crate::scanner;
use crate::vector_store::{LocalVectorStore, VectorStore};

/// Tolerancia frente al ruido de coma flotante en los mtimes.
pub const MTIME_EPSILON: f64 = 1e-6;

/// Resumen de una pasada de reconciliación.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
pub struct IndexSummary {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub chunks_added: usize,
    pub chunks_removed: usize,
    pub store_created: bool,
}

impl std::fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} indexados. {} chunks añadidos y {} eliminados.",
            self.files_scanned, self.files_indexed, self.chunks_added, self.chunks_removed
        )?;
        if self.store_created {
            write!(f, " Almacén creado.")?;
        }
        Ok(())
    }
}

pub struct Indexer {
    data_dir: PathBuf,
    index_dir: PathBuf,
    splitter: TextSplitter,
    replace_stale_chunks: bool,
    // Serializa reconciliaciones concurrentes dentro del proceso.
    lock: Mutex<()>,
}

impl Indexer {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        index_dir: impl Into<PathBuf>,
        splitter: TextSplitter,
        replace_stale_chunks: bool,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            index_dir: index_dir.into(),
            splitter,
            replace_stale_chunks,
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let splitter = TextSplitter::new(cfg.chunk_size, cfg.chunk_overlap)?;
        Ok(Self::new(
            &cfg.data_dir,
            &cfg.index_dir,
            splitter,
            cfg.replace_stale_chunks,
        ))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn ledger(&self) -> IndexLedger {
        IndexLedger::in_dir(&self.index_dir)
    }

    /// Pone el almacén al día con los ficheros del directorio de datos y lo
    /// devuelve abierto. En modo `force` se borra antes todo el índice.
    pub async fn reconcile(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        force: bool,
    ) -> Result<(LocalVectorStore, IndexSummary)> {
        let _guard = self.lock.lock().await;
        let mut summary = IndexSummary::default();

        if force {
            self.wipe_index()?;
        }

        // 1) Descubrir
        let files = scanner::scan_data_files(&self.data_dir);
        summary.files_scanned = files.len();
        let ledger = self.ledger();
        let mut entries = ledger.load();
        let existing = LocalVectorStore::open(&self.index_dir, Arc::clone(&embedder))?;

        // 2) Clasificar
        let stale: Vec<&SourceFile> = files
            .iter()
            .filter(|file| force || is_stale(file, &entries))
            .collect();

        // 3) Atajo
        if stale.is_empty() {
            let store = match existing {
                Some(store) => {
                    info!("No hay ficheros nuevos o modificados.");
                    store
                }
                None => {
                    info!("Sin ficheros que indexar; creando almacén vacío en {}.", self.index_dir.display());
                    summary.store_created = true;
                    LocalVectorStore::create(&self.index_dir, embedder)?
                }
            };
            return Ok((store, summary));
        }

        // 4) Procesar
        info!("{} ficheros nuevos o modificados.", stale.len());
        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &stale {
            debug!("Cargando {}", file.path.display());
            let docs = load_blocking((*file).clone()).await?;
            chunks.extend(self.splitter.split_documents(&docs));
        }

        // 5) Confirmar
        let mut store = match existing {
            Some(store) => store,
            None => {
                summary.store_created = true;
                LocalVectorStore::create(&self.index_dir, embedder)?
            }
        };
        if self.replace_stale_chunks {
            for file in &stale {
                summary.chunks_removed += store.remove_source(&file.key());
            }
        }

        info!("Añadiendo {} chunks al almacén...", chunks.len());
        summary.chunks_added = store.add(chunks).await?;
        store.persist().await?;

        for file in &stale {
            entries.insert(file.key(), file.modified);
        }
        ledger.save(&entries)?;
        summary.files_indexed = stale.len();

        info!("{summary}");
        Ok((store, summary))
    }

    fn wipe_index(&self) -> Result<()> {
        if self.index_dir.exists() {
            info!("Reindexado forzado: borrando {}", self.index_dir.display());
            std::fs::remove_dir_all(&self.index_dir)
                .map_err(|e| RagError::store("no se pudo borrar el índice", e))?;
        }
        Ok(())
    }
}

fn is_stale(file: &SourceFile, entries: &LedgerEntries) -> bool {
    match entries.get(&file.key()) {
        Some(&recorded) => file.modified > recorded + MTIME_EPSILON,
        None => true,
    }
}

// La extracción de PDF es CPU intensiva; no debe bloquear el runtime.
async fn load_blocking(file: SourceFile) -> Result<Vec<RawDocument>> {
    let path = file.path.clone();
    tokio::task::spawn_blocking(move || loader::load_document(&file))
        .await
        .map_err(|e| RagError::loader(path, e.to_string()))?
}
