//! Ledger persistente: ruta de fichero → mtime indexado.
//!
//! Si una ruta figura con fecha `T`, todos los chunks del fichero tal como
//! estaba en `T` están ya en el almacén vectorial. Por eso sólo se guarda
//! después de un `persist()` correcto del almacén.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{RagError, Result};

/// Nombre del fichero dentro del directorio del índice.
pub const LEDGER_FILE: &str = "indexed_files.json";

pub type LedgerEntries = BTreeMap<String, f64>;

#[derive(Debug, Clone)]
pub struct IndexLedger {
    path: PathBuf,
}

impl IndexLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(index_dir: &Path) -> Self {
        Self::new(index_dir.join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lee el ledger. Ausente o corrupto ⇒ mapa vacío (sólo provoca
    /// re-indexado redundante, nunca pérdida de datos).
    pub fn load(&self) -> LedgerEntries {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return LedgerEntries::new(),
            Err(err) => {
                warn!("Ledger ilegible en {}: {err}. Se trata como vacío.", self.path.display());
                return LedgerEntries::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Ledger corrupto en {}: {err}. Se trata como vacío.", self.path.display());
                LedgerEntries::new()
            }
        }
    }

    /// Reescribe el ledger completo (JSON indentado) vía fichero temporal +
    /// renombrado atómico. Crea el directorio si hace falta.
    pub fn save(&self, entries: &LedgerEntries) -> Result<()> {
        self.write_atomically(entries).map_err(|source| RagError::Ledger {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomically(&self, entries: &LedgerEntries) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(entries)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
