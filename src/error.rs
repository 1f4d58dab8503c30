//! Taxonomía de errores del núcleo (indexado + consulta).
//!
//! Cada capa devuelve un [`RagError`] explícito; la frontera HTTP/CLI lo
//! traduce a su representación sin perder la distinción entre tipos.

use std::path::PathBuf;

/// Alias de resultado usado en toda la librería.
pub type Result<T> = std::result::Result<T, RagError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Entrada rechazada antes de cualquier E/S (pregunta corta, k no positivo...).
    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    /// Un fichero fuente no se pudo leer o interpretar. Aborta la reconciliación.
    #[error("no se pudo cargar {}: {source}", path.display())]
    Loader {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("fallo del proveedor de embeddings: {0}")]
    Embedding(String),

    #[error("fallo del almacén vectorial: {0}")]
    Store(String),

    /// Sólo la escritura del ledger es fatal; la lectura degrada a "vacío".
    #[error("no se pudo guardar el ledger {}: {source}", path.display())]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Falta credencial o configuración para el modelo generativo.
    #[error("compositor de respuestas no disponible: {0}")]
    ComposerUnavailable(String),

    #[error("fallo generando la respuesta: {0}")]
    Generation(String),

    /// Envoltorio opaco de cualquier fallo en los pasos 2-4 de una consulta.
    #[error("la consulta falló: {0}")]
    QueryFailed(#[source] Box<RagError>),
}

impl RagError {
    pub fn loader<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Loader {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn store(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Store(format!("{context}: {err}"))
    }

    pub fn query_failed(cause: RagError) -> Self {
        Self::QueryFailed(Box::new(cause))
    }

    /// Código estable para la frontera (HTTP, CLI, logs).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Loader { .. } => "loader_failure",
            Self::Embedding(_) => "embedding_failure",
            Self::Store(_) => "store_failure",
            Self::Ledger { .. } => "ledger_failure",
            Self::ComposerUnavailable(_) => "composer_unavailable",
            Self::Generation(_) => "generation_failure",
            Self::QueryFailed(_) => "query_failed",
        }
    }

    /// Causa subyacente de un `QueryFailed`; el propio error en otro caso.
    pub fn root_cause(&self) -> &RagError {
        match self {
            Self::QueryFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}
