//! Almacén vectorial persistente en disco.
//!
//! API pública:
//!   - [`VectorStore`]: capacidad usada por el recuperador (`add`, `search`,
//!     `persist`).
//!   - [`LocalVectorStore`]: implementación en un directorio local con un
//!     manifiesto (`store.json`) y un log de registros (`vectors.jsonl`).
//!
//! Los registros añadidos sólo son duraderos tras `persist()`.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::{Chunk, MetaValue, Metadata, RetrievedChunk, META_SOURCE_FILE};

pub const MANIFEST_FILE: &str = "store.json";
pub const VECTORS_FILE: &str = "vectors.jsonl";
const FORMAT_VERSION: u32 = 1;

/// Registro inmutable: vector + texto + metadatos del chunk de origen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl VectorRecord {
    fn source_file(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE_FILE).and_then(MetaValue::as_str)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    embedding_model: String,
    dimension: Option<usize>,
}

/// Capacidad de almacén vectorial consumida por el núcleo.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Calcula embeddings de los chunks y los añade (pendientes de `persist`).
    async fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Hasta `k` registros ordenados de mayor a menor similitud.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Barrera de durabilidad.
    async fn persist(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LocalVectorStore {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    /// Registros ya escritos en el log (el resto está pendiente).
    durable: usize,
    /// Hubo borrados: el próximo `persist` reescribe el log completo.
    needs_rewrite: bool,
    manifest_dirty: bool,
}

impl std::fmt::Debug for LocalVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVectorStore")
            .field("dir", &self.dir)
            .field("model", &self.embedder.model_name())
            .field("records", &self.records.len())
            .finish()
    }
}

impl LocalVectorStore {
    /// Abre el almacén de `dir`. `Ok(None)` si todavía no existe ninguno.
    pub fn open(dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Option<Self>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&manifest_path)
            .map_err(|e| RagError::store("no se pudo leer el manifiesto", e))?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|e| RagError::store("manifiesto corrupto", e))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(RagError::Store(format!(
                "versión de formato {} no soportada; fuerce un reindexado",
                manifest.format_version
            )));
        }
        if manifest.embedding_model != embedder.model_name() {
            return Err(RagError::Store(format!(
                "el índice se creó con el modelo '{}' y el actual es '{}'; fuerce un reindexado",
                manifest.embedding_model,
                embedder.model_name()
            )));
        }

        let (records, torn) = read_log(&dir.join(VECTORS_FILE))?;
        debug!("Almacén abierto en {} con {} registros.", dir.display(), records.len());

        Ok(Some(Self {
            dir: dir.to_path_buf(),
            embedder,
            dimension: manifest.dimension,
            durable: records.len(),
            records,
            // Nada puede añadirse detrás de un fragmento: el próximo flush reescribe.
            needs_rewrite: torn,
            manifest_dirty: false,
        }))
    }

    /// Crea un almacén vacío y lo deja persistido.
    pub fn create(dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| RagError::store("no se pudo crear el directorio", e))?;
        let mut store = Self {
            dir: dir.to_path_buf(),
            embedder,
            dimension: None,
            records: Vec::new(),
            durable: 0,
            needs_rewrite: true,
            manifest_dirty: true,
        };
        store.flush()?;
        info!("Almacén vectorial creado en {}.", dir.display());
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    /// Elimina los registros derivados de `source_file`. Devuelve cuántos.
    pub fn remove_source(&mut self, source_file: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.source_file() != Some(source_file));
        let removed = before - self.records.len();
        if removed > 0 {
            self.needs_rewrite = true;
        }
        removed
    }

    fn flush(&mut self) -> Result<()> {
        if self.manifest_dirty {
            self.write_manifest()?;
            self.manifest_dirty = false;
        }
        if self.needs_rewrite {
            self.rewrite_log()?;
            self.needs_rewrite = false;
        } else if self.durable < self.records.len() {
            self.append_pending()?;
        }
        self.durable = self.records.len();
        Ok(())
    }

    fn write_manifest(&self) -> Result<()> {
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedder.model_name().to_string(),
            dimension: self.dimension,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| RagError::store("no se pudo serializar el manifiesto", e))?;
        write_atomically(&self.dir, &self.dir.join(MANIFEST_FILE), |w| w.write_all(json.as_bytes()))
            .map_err(|e| RagError::store("no se pudo escribir el manifiesto", e))
    }

    fn rewrite_log(&self) -> Result<()> {
        write_atomically(&self.dir, &self.dir.join(VECTORS_FILE), |w| {
            for record in &self.records {
                write_record(w, record)?;
            }
            Ok(())
        })
        .map_err(|e| RagError::store("no se pudo reescribir el log de vectores", e))
    }

    fn append_pending(&self) -> Result<()> {
        let append = || -> std::io::Result<()> {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(VECTORS_FILE))?;
            let mut writer = BufWriter::new(file);
            for record in &self.records[self.durable..] {
                write_record(&mut writer, record)?;
            }
            writer.flush()?;
            writer.get_ref().sync_data()
        };
        append().map_err(|e| RagError::store("no se pudo escribir el log de vectores", e))
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "el proveedor devolvió {} vectores para {} textos",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_checked(&texts).await?;

        let dimension = match self.dimension {
            Some(d) => d,
            None => vectors.first().map(Vec::len).unwrap_or_default(),
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::Store(format!(
                "dimensión de embedding {} distinta de la del índice ({dimension})",
                bad.len()
            )));
        }
        if self.dimension.is_none() {
            self.dimension = Some(dimension);
            self.manifest_dirty = true;
        }

        let added = chunks.len();
        self.records
            .extend(chunks.into_iter().zip(vectors).map(|(chunk, vector)| VectorRecord {
                id: Uuid::new_v4(),
                vector,
                text: chunk.text,
                metadata: chunk.metadata,
            }));
        Ok(added)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(RagError::InvalidInput("k debe ser un entero positivo".into()));
        }
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embed_checked(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut scored: Vec<(f32, &VectorRecord)> = self
            .records
            .iter()
            .map(|r| (cosine_similarity(&query_vec, &r.vector), r))
            .collect();
        // Orden estable: a igual puntuación gana el registro más antiguo.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, r)| RetrievedChunk {
                metadata: r.metadata.clone(),
                text: r.text.clone(),
                score,
            })
            .collect())
    }

    async fn persist(&mut self) -> Result<()> {
        self.flush()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

fn write_record<W: Write>(w: &mut W, record: &VectorRecord) -> std::io::Result<()> {
    serde_json::to_writer(&mut *w, record)?;
    w.write_all(b"\n")
}

/// Escribe en un temporal del mismo directorio, `sync_all` y renombra.
fn write_atomically<F>(dir: &Path, target: &Path, fill: F) -> std::io::Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> std::io::Result<()>,
{
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Lee el log completo. El booleano indica si se descartó un final incompleto.
fn read_log(path: &Path) -> Result<(Vec<VectorRecord>, bool)> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => return Err(RagError::store("no se pudo leer el log de vectores", e)),
    };

    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut records = Vec::with_capacity(lines.len());
    let mut torn = false;
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<VectorRecord>(line) {
            Ok(record) => records.push(record),
            // Una última línea incompleta es una escritura sin `persist()`
            // interrumpida: nunca llegó a contar en el ledger.
            Err(e) if i + 1 == lines.len() && !raw.ends_with('\n') => {
                warn!("Descartando registro final incompleto en {}: {e}", path.display());
                torn = true;
            }
            Err(e) => {
                return Err(RagError::store(
                    &format!("registro corrupto en la línea {} de {}", i + 1, path.display()),
                    e,
                ))
            }
        }
    }
    Ok((records, torn))
}
