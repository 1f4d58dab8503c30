//! Compositor de respuestas sobre Rig.
//!
//! El núcleo sólo ve el trait [`AnswerComposer`]. La política de "responder
//! sólo con el contexto" va en el texto del prompt; no se comprueba aquí.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use tracing::debug;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{RagError, Result};

/// Instrucciones entregadas al modelo. `{context}` y `{question}` se sustituyen.
pub const PROMPT_TEMPLATE: &str = "Use the following pieces of context to answer the questions at the end.
Answer only from the context. If you don't know the answer, say you do not know.
{context}
Question: {question}
";

/// Variables de entorno con la credencial de cada proveedor.
const HUGGINGFACE_KEY_VAR: &str = "HUGGINGFACE_API_KEY";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

#[async_trait]
pub trait AnswerComposer: Send + Sync {
    async fn compose(&self, question: &str, context: &[String]) -> Result<String>;
}

/// Construye el compositor en su primer uso.
pub type ComposerFactory = Arc<dyn Fn() -> Result<Arc<dyn AnswerComposer>> + Send + Sync>;

pub fn default_factory(cfg: LlmConfig) -> ComposerFactory {
    Arc::new(move || Ok(Arc::new(RigComposer::new(&cfg)?) as Arc<dyn AnswerComposer>))
}

/// Rellena la plantilla. Los fragmentos se separan con una línea en blanco.
pub fn build_prompt(question: &str, context: &[String]) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", &context.join("\n\n"))
        .replace("{question}", question)
}

pub struct RigComposer {
    cfg: LlmConfig,
}

impl RigComposer {
    /// Falla con `ComposerUnavailable` si falta la credencial del proveedor.
    pub fn new(cfg: &LlmConfig) -> Result<Self> {
        let var = match cfg.provider {
            LlmProvider::HuggingFace => HUGGINGFACE_KEY_VAR,
            LlmProvider::OpenAI => OPENAI_KEY_VAR,
        };
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(Self { cfg: cfg.clone() }),
            _ => Err(RagError::ComposerUnavailable(format!(
                "falta {var} para el proveedor {:?}",
                cfg.provider
            ))),
        }
    }
}

#[async_trait]
impl AnswerComposer for RigComposer {
    async fn compose(&self, question: &str, context: &[String]) -> Result<String> {
        let prompt = build_prompt(question, context);
        debug!(
            "Generando respuesta con {} ({} fragmentos de contexto)",
            self.cfg.model,
            context.len()
        );

        let answer = match self.cfg.provider {
            LlmProvider::HuggingFace => {
                use rig::client::ProviderClient as _;
                use rig::providers::huggingface;

                let client = huggingface::Client::from_env();
                let agent = client
                    .agent(&self.cfg.model)
                    .temperature(self.cfg.temperature)
                    .max_tokens(self.cfg.max_tokens)
                    .build();
                agent.prompt(prompt.as_str()).await
            }
            LlmProvider::OpenAI => {
                use rig::client::ProviderClient as _;
                use rig::providers::openai;

                let client = openai::Client::from_env();
                let agent = client
                    .agent(&self.cfg.model)
                    .temperature(self.cfg.temperature)
                    .max_tokens(self.cfg.max_tokens)
                    .build();
                agent.prompt(prompt.as_str()).await
            }
        }
        .map_err(|e| RagError::Generation(e.to_string()))?;

        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = build_prompt(
            "¿Qué es Rust?",
            &["Rust es un lenguaje.".to_string(), "Tiene ownership.".to_string()],
        );
        assert!(prompt.starts_with("Use the following pieces of context"));
        assert!(prompt.contains("say you do not know.\nRust es un lenguaje.\n\nTiene ownership.\nQuestion: ¿Qué es Rust?\n"));
    }

    #[test]
    fn empty_context_still_builds_a_prompt() {
        let prompt = build_prompt("hola", &[]);
        assert!(prompt.contains("say you do not know.\n\nQuestion: hola\n"));
    }

    #[test]
    fn missing_credential_is_composer_unavailable() {
        // Proveedor cuya variable no existe en el entorno de test.
        if std::env::var(HUGGINGFACE_KEY_VAR).is_ok() {
            return;
        }
        let cfg = LlmConfig {
            provider: LlmProvider::HuggingFace,
            model: "mistralai/Mistral-7B-Instruct-v0.1".into(),
            temperature: 0.1,
            max_tokens: 512,
        };
        let err = RigComposer::new(&cfg).err().unwrap();
        assert_eq!(err.kind(), "composer_unavailable");
    }
}
