//! Descubrimiento de ficheros fuente bajo el directorio de datos.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::SourceFile;

/// Extensiones admitidas (en minúsculas, sin punto).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Recorre `root` recursivamente y devuelve los ficheros admitidos,
/// ordenados por ruta. Un directorio inexistente produce una lista vacía.
pub fn scan_data_files(root: &Path) -> Vec<SourceFile> {
    if !root.is_dir() {
        debug!("El directorio de datos {} no existe.", root.display());
        return Vec::new();
    }

    // Rutas absolutas: son la identidad de cada fichero en el ledger.
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    let mut files: Vec<SourceFile> = WalkDir::new(&root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Entrada ilegible durante el escaneo: {err}");
                None
            }
        })
        // `Path::is_file` sigue enlaces simbólicos; `file_type()` no.
        .filter(|e| e.path().is_file() && is_supported(e.path()))
        .map(|e| SourceFile {
            modified: file_mtime(e.path()),
            path: e.into_path(),
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Fecha de modificación en segundos desde epoch, o 0.0 si no se puede leer
/// (el fichero se considerará modificado hasta que sea legible).
pub fn file_mtime(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
