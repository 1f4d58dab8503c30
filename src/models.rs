//! Modelos de dominio del pipeline (ficheros fuente, documentos, chunks y
//! resultados de consulta).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Claves de metadatos conocidas.
pub const META_SOURCE_FILE: &str = "source_file";
pub const META_SOURCE_MTIME: &str = "source_mtime";
pub const META_CHUNK_ID: &str = "chunk_id";

/// Valor de metadato: suma cerrada suficiente para las claves conocidas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Mapa ordenado de metadatos (orden estable al serializar).
pub type Metadata = BTreeMap<String, MetaValue>;

/// Fichero elegible descubierto en el directorio de datos.
/// No se persiste: se deriva del sistema de archivos en cada escaneo.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Segundos desde epoch; 0.0 si `stat` falló.
    pub modified: f64,
}

impl SourceFile {
    /// Clave del fichero en el ledger y en los metadatos.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Texto crudo extraído de un fichero, etiquetado con su procedencia.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub text: String,
    pub metadata: Metadata,
}

/// Trozo de texto acotado; la unidad que se almacena y se recupera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn chunk_id(&self) -> Option<&str> {
        self.metadata.get(META_CHUNK_ID).and_then(MetaValue::as_str)
    }

    pub fn source_file(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE_FILE).and_then(MetaValue::as_str)
    }
}

/// Un chunk recuperado, con su puntuación de similitud.
/// Se serializa como `{metadata, page_content}` para la frontera HTTP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub metadata: Metadata,
    #[serde(rename = "page_content")]
    pub text: String,
    #[serde(skip)]
    pub score: f32,
}

/// Resultado de una consulta RAG.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serializes_as_plain_json_values() {
        let mut meta = Metadata::new();
        meta.insert(META_SOURCE_FILE.into(), "/data/a.txt".into());
        meta.insert(META_SOURCE_MTIME.into(), 1700000000.5.into());
        meta.insert(META_CHUNK_ID.into(), "a.txt::0".into());

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source_file"], "/data/a.txt");
        assert_eq!(json["source_mtime"], 1700000000.5);

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn retrieved_chunk_uses_page_content_and_hides_score() {
        let chunk = RetrievedChunk {
            metadata: Metadata::new(),
            text: "hola".into(),
            score: 0.9,
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["page_content"], "hola");
        assert!(json.get("score").is_none());
    }
}
