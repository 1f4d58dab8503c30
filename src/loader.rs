//! Conversión de un fichero fuente en documentos de texto crudo.

use std::path::Path;

use crate::error::{RagError, Result};
use crate::models::{Metadata, RawDocument, SourceFile, META_SOURCE_FILE, META_SOURCE_MTIME};

/// Carga un fichero según su extensión. Cualquier fallo es fatal para la
/// pasada de reconciliación y nombra el fichero.
pub fn load_document(file: &SourceFile) -> Result<Vec<RawDocument>> {
    let text = match extension_of(&file.path).as_str() {
        "pdf" => extract_pdf(&file.path)?,
        _ => std::fs::read_to_string(&file.path).map_err(|e| RagError::loader(&file.path, e))?,
    };

    Ok(vec![RawDocument {
        text,
        metadata: provenance(file),
    }])
}

fn extract_pdf(path: &Path) -> Result<String> {
    // pdf-extract puede entrar en pánico con PDFs malformados.
    match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(RagError::loader(path, e.to_string())),
        Err(_) => Err(RagError::loader(path, "el extractor de PDF abortó")),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn provenance(file: &SourceFile) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(META_SOURCE_FILE.to_string(), file.key().into());
    metadata.insert(META_SOURCE_MTIME.to_string(), file.modified.into());
    metadata
}
