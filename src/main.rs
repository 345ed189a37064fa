// ABOUTME: Entry point for the resonator binary.
// ABOUTME: Parses CLI arguments, initializes tracing, runs startup reconciliation, and serves HTTP until a shutdown signal.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use resonator_audio::{HfMusicGenerator, MusicGenerator, TicklerChain};
use resonator_server::{AppState, Lifecycle, ResonatorConfig, create_router};

#[derive(Parser)]
#[command(name = "resonator")]
#[command(about = "Generative music service with a durable song library")]
struct Cli {
    /// Socket address to bind (overrides RESONATOR_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Directory for the database and audio files (overrides OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resonator=debug,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = ResonatorConfig::from_lookup(|key| match key {
        "RESONATOR_BIND" if cli.bind.is_some() => cli.bind.clone(),
        "OUTPUT_DIR" if cli.output_dir.is_some() => cli.output_dir.clone(),
        _ => std::env::var(key).ok(),
    })
    .context("invalid configuration")?;

    tracing::info!("resonator starting up with model {}", config.model_name);

    let generator: Arc<dyn MusicGenerator> = Arc::new(HfMusicGenerator::new(
        config.hf_client(),
        config.model_name.clone(),
    ));

    let mut lifecycle = Lifecycle::new();
    let store = lifecycle
        .start(&config, generator.as_ref())
        .await
        .context("startup failed")?;

    let bind = config.bind;
    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        generator,
        Arc::new(TicklerChain),
    ));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!("listening on {}", bind);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    lifecycle.shutdown(&store)?;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("unable to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("unable to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
