use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docqa_rag::{api, app_state::AppState, config::AppConfig, RagService};

#[derive(Parser)]
#[command(name = "docqa", version, about = "Preguntas y respuestas sobre tus documentos (RAG)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Arranca el servicio HTTP.
    Serve,
    /// Reconciliación del índice con el directorio de datos.
    Reindex {
        /// Borra el índice y procesa todos los ficheros.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        device: Option<String>,
    },
    /// Responde una pregunta y muestra las fuentes.
    Ask {
        question: String,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 2. Configuración y servicio
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let service = RagService::new(cfg).context("Error inicializando el servicio RAG")?;

    match cli.command {
        Command::Serve => serve(service).await,
        Command::Reindex { force, device } => {
            let started = Instant::now();
            let summary = service.reindex(force, device.as_deref()).await?;
            println!("{summary}");
            println!("Tiempo total: {:.2}s", started.elapsed().as_secs_f64());
            Ok(())
        }
        Command::Ask { question, k, device } => {
            let result = service.answer_question(&question, k, device.as_deref()).await?;
            println!("{}\n", result.answer);
            for (i, source) in result.sources.iter().enumerate() {
                let origin = source
                    .metadata
                    .get(docqa_rag::models::META_CHUNK_ID)
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                println!("[{}] {origin} (similitud {:.3})", i + 1, source.score);
            }
            Ok(())
        }
    }
}

async fn serve(service: RagService) -> Result<()> {
    let server_addr = service.config().server_addr.clone();
    if service.config().admin_token.is_none() {
        info!("ADMIN_TOKEN no definido: /admin/reindex rechazará todas las peticiones.");
    }

    let app = api::create_router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Apagado ordenado con Ctrl-C.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
