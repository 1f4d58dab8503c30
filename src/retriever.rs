//! Recuperación top-k sobre cualquier [`VectorStore`].

use crate::error::{RagError, Result};
use crate::models::RetrievedChunk;
use crate::vector_store::VectorStore;

pub const DEFAULT_TOP_K: usize = 5;

pub struct Retriever<'a> {
    store: &'a dyn VectorStore,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a dyn VectorStore) -> Self {
        Self { store }
    }

    /// Como mucho `k` chunks, de mayor a menor similitud. Sin filtrado ni
    /// reordenación propia.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(RagError::InvalidInput("k debe ser un entero positivo".into()));
        }
        self.store.search(query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Metadata};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Almacén fijo que devuelve más resultados de los pedidos si puede.
    struct FixedStore {
        searches: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
            Ok(chunks.len())
        }

        async fn search(&self, _query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok((0..10)
                .map(|i| RetrievedChunk {
                    metadata: Metadata::new(),
                    text: format!("chunk {i}"),
                    score: 1.0 - i as f32 / 10.0,
                })
                .take(k)
                .collect())
        }

        async fn persist(&mut self) -> Result<()> {
            Ok(())
        }

        fn len(&self) -> usize {
            10
        }
    }

    #[tokio::test]
    async fn delegates_with_requested_k() {
        let store = FixedStore {
            searches: AtomicUsize::new(0),
        };
        let hits = Retriever::new(&store).retrieve("pregunta", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "chunk 0");
    }

    #[tokio::test]
    async fn zero_k_never_reaches_the_store() {
        let store = FixedStore {
            searches: AtomicUsize::new(0),
        };
        let err = Retriever::new(&store).retrieve("pregunta", 0).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(store.searches.load(Ordering::SeqCst), 0);
    }
}
