//! Dobles de prueba compartidos por los tests de integración.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use docqa_rag::config::AppConfig;
use docqa_rag::embedding::{normalize, EmbedderFactory, EmbeddingProvider};
use docqa_rag::llm::{AnswerComposer, ComposerFactory};
use docqa_rag::{RagError, RagService, Result};

const DIMS: usize = 256;

/// Embedder determinista: bolsa de palabras con hashing FNV-1a en 256 ejes.
/// Cuenta llamadas y textos para verificar la incrementalidad.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl CountingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        v[(fnv1a(&word.to_lowercase()) % DIMS as u64) as usize] += 1.0;
    }
    normalize(&mut v);
    v
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Embedding("proveedor caído".into()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Compositor que registra cada llamada y responde sin red.
#[derive(Default)]
pub struct RecordingComposer {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingComposer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerComposer for RecordingComposer {
    async fn compose(&self, question: &str, context: &[String]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_vec()));
        Ok(match context.first() {
            Some(first) => format!("Según el contexto: {first}"),
            None => "No lo sé.".to_string(),
        })
    }
}

pub fn config(data_dir: &Path, index_dir: &Path, extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("DATA_DIR".to_string(), data_dir.to_string_lossy().into_owned()),
        ("INDEX_DIR".to_string(), index_dir.to_string_lossy().into_owned()),
        ("CHUNK_SIZE".to_string(), "60".to_string()),
        ("CHUNK_OVERLAP".to_string(), "15".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn embedder_factory(embedder: &Arc<CountingEmbedder>) -> EmbedderFactory {
    let embedder = Arc::clone(embedder);
    Arc::new(move |_device: &str| Ok(Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>))
}

pub fn composer_factory(composer: &Arc<RecordingComposer>) -> ComposerFactory {
    let composer = Arc::clone(composer);
    Arc::new(move || Ok(Arc::clone(&composer) as Arc<dyn AnswerComposer>))
}

pub fn service(
    cfg: AppConfig,
    embedder: &Arc<CountingEmbedder>,
    composer: &Arc<RecordingComposer>,
) -> RagService {
    RagService::with_providers(cfg, embedder_factory(embedder), composer_factory(composer)).unwrap()
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    std::fs::canonicalize(&path).unwrap()
}

/// Adelanta el mtime de un fichero sin cambiar su contenido.
pub fn touch_forward(path: &Path, secs: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

pub const ALPHA: &str = "Rust garantiza seguridad de memoria.\nEl compilador comprueba los préstamos.\nNo hay recolector de basura.";
pub const BETA: &str = "Python es un lenguaje interpretado.\nTiene tipado dinámico.";
