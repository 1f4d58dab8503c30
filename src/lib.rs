//! Preguntas y respuestas sobre un corpus documental privado (RAG).
//!
//! El índice se mantiene de forma incremental: sólo se vuelven a procesar los
//! ficheros cuyo mtime supera al registrado en el ledger, y el ledger nunca se
//! escribe antes de que el almacén vectorial haya hecho `persist()`.

pub mod api;
pub mod app_state;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod loader;
pub mod models;
pub mod rag;
pub mod retriever;
pub mod scanner;
pub mod vector_store;

pub use error::{RagError, Result};
pub use rag::RagService;
