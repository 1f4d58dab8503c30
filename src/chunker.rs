//! Troceado determinista de documentos en chunks solapados.
//!
//! El texto se parte primero por el separador (`\n`) y después las líneas se
//! empaquetan con avidez hasta `chunk_size` caracteres, arrastrando hacia el
//! siguiente chunk hasta `chunk_overlap` caracteres de contexto final. Las
//! longitudes se miden en caracteres, no en bytes.

use std::collections::VecDeque;
use std::path::Path;

use tracing::warn;

use crate::error::{RagError, Result};
use crate::models::{Chunk, MetaValue, RawDocument, META_CHUNK_ID, META_SOURCE_FILE};

const DEFAULT_SEPARATOR: &str = "\n";

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidInput("chunk_size debe ser mayor que 0".into()));
        }
        if chunk_overlap > chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk_overlap ({chunk_overlap}) no puede superar chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator: DEFAULT_SEPARATOR.to_string(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Parte un texto en trozos. Un texto vacío (o sólo espacios) no produce
    /// ninguno; una línea más larga que `chunk_size` se emite entera.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let splits: Vec<&str> = text.split(self.separator.as_str()).filter(|s| !s.is_empty()).collect();
        self.merge_splits(&splits)
    }

    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let sep_len = char_len(&self.separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &split in splits {
            let len = char_len(split);
            let joiner = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner(&window) > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Chunk de {total} caracteres, mayor que el límite configurado ({})",
                        self.chunk_size
                    );
                }
                if !window.is_empty() {
                    if let Some(chunk) = self.join(&window) {
                        chunks.push(chunk);
                    }
                    // Descarta por delante hasta que sólo quede el solapamiento
                    // y quepa la línea siguiente.
                    while total > self.chunk_overlap
                        || (total > 0 && total + len + joiner(&window) > self.chunk_size)
                    {
                        let removed_sep = if window.len() > 1 { sep_len } else { 0 };
                        match window.pop_front() {
                            Some(first) => total -= char_len(first) + removed_sep,
                            None => break,
                        }
                    }
                }
            }

            window.push_back(split);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }

        if let Some(chunk) = self.join(&window) {
            chunks.push(chunk);
        }
        chunks
    }

    fn join(&self, window: &VecDeque<&str>) -> Option<String> {
        let joined = window
            .iter()
            .copied()
            .collect::<Vec<_>>()
            .join(&self.separator);
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Trocea documentos conservando sus metadatos y añadiendo
    /// `chunk_id = <basename>::<i>`, con `i` desde 0 en cada documento.
    pub fn split_documents(&self, docs: &[RawDocument]) -> Vec<Chunk> {
        let mut out = Vec::new();
        for doc in docs {
            let base = basename(doc);
            for (i, text) in self.split_text(&doc.text).into_iter().enumerate() {
                let mut metadata = doc.metadata.clone();
                metadata.insert(META_CHUNK_ID.to_string(), MetaValue::Text(format!("{base}::{i}")));
                out.push(Chunk { text, metadata });
            }
        }
        out
    }
}

fn basename(doc: &RawDocument) -> String {
    doc.metadata
        .get(META_SOURCE_FILE)
        .and_then(MetaValue::as_str)
        .and_then(|p| Path::new(p).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn doc(path: &str, text: &str) -> RawDocument {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE_FILE.into(), path.into());
        RawDocument {
            text: text.into(),
            metadata,
        }
    }

    #[test]
    fn rejects_overlap_larger_than_size() {
        assert!(TextSplitter::new(10, 11).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(10, 10).is_ok());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = TextSplitter::new(800, 150).unwrap();
        assert_eq!(splitter.split_text("uno\ndos\ntres"), vec!["uno\ndos\ntres"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(800, 150).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("\n\n  \n").is_empty());
    }

    #[test]
    fn overlap_carries_trailing_lines_forward() {
        let splitter = TextSplitter::new(3, 1).unwrap();
        assert_eq!(splitter.split_text("a\nb\nc\nd"), vec!["a\nb", "b\nc", "c\nd"]);
    }

    #[test]
    fn zero_overlap_packs_disjoint_windows() {
        let splitter = TextSplitter::new(3, 0).unwrap();
        assert_eq!(splitter.split_text("a\nb\nc\nd"), vec!["a\nb", "c\nd"]);
    }

    #[test]
    fn oversized_line_is_emitted_whole() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        assert_eq!(splitter.split_text("abcdefgh\nij"), vec!["abcdefgh", "ij"]);
    }

    #[test]
    fn lengths_are_counted_in_chars() {
        // 3 caracteres por línea aunque ocupen más bytes.
        let splitter = TextSplitter::new(7, 0).unwrap();
        assert_eq!(splitter.split_text("ñáé\nüöç\nabc"), vec!["ñáé\nüöç", "abc"]);
    }

    #[test]
    fn chunks_respect_size_when_lines_fit() {
        let text = (0..200)
            .map(|i| format!("línea número {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let splitter = TextSplitter::new(120, 30).unwrap();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 120));
        // Cada chunk empieza con contexto del anterior.
        for pair in chunks.windows(2) {
            let first_line = pair[1].lines().next().unwrap();
            assert!(pair[0].contains(first_line));
        }
    }

    #[test]
    fn chunk_ids_restart_per_document_and_are_deterministic() {
        let splitter = TextSplitter::new(3, 1).unwrap();
        let docs = vec![doc("/data/a.txt", "a\nb\nc\nd"), doc("/data/sub/b.md", "x\ny")];

        let first = splitter.split_documents(&docs);
        let second = splitter.split_documents(&docs);
        assert_eq!(first, second);

        let ids: Vec<&str> = first.iter().filter_map(|c| c.chunk_id()).collect();
        assert_eq!(ids, vec!["a.txt::0", "a.txt::1", "a.txt::2", "b.md::0"]);
        assert_eq!(first[3].source_file(), Some("/data/sub/b.md"));
    }

    #[test]
    fn missing_source_uses_unknown_basename() {
        let splitter = TextSplitter::new(10, 0).unwrap();
        let docs = vec![RawDocument {
            text: "hola".into(),
            metadata: Metadata::new(),
        }];
        let chunks = splitter.split_documents(&docs);
        assert_eq!(chunks[0].chunk_id(), Some("unknown::0"));
    }
}
