use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use adu_permit_chat::assistant_api::{AssistantBackend, OpenAiBackend};
use adu_permit_chat::config::Config;
use adu_permit_chat::registry::SessionRegistry;
use adu_permit_chat::{console, web};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the console transport keeps stdout to itself
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load());
    if config.openai.api_key.is_empty() {
        anyhow::bail!("OPENAI_API_KEY is not set");
    }

    let backend: Arc<dyn AssistantBackend> = Arc::new(OpenAiBackend::new(
        &config.openai.api_key,
        config.openai.base_url.as_deref(),
    ));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("main: Ctrl-C received, shutting down");
            signal.cancel();
        }
    });

    match config.server.transport.as_str() {
        "stdio" => {
            tracing::info!("main: starting console chat");
            console::run(backend, config.clone(), shutdown).await?;
        }
        _ => {
            let bind: SocketAddr = config
                .server
                .bind
                .parse()
                .with_context(|| format!("Invalid ADU_HTTP_BIND '{}' (expected host:port)", config.server.bind))?;
            let bearer_token = config.server.bearer_token.clone();
            let registry = Arc::new(SessionRegistry::new(backend, config.clone(), shutdown.clone()));
            let _sweeper = registry.spawn_sweeper();
            let state = web::AppState::new(registry)?;
            web::serve(bind, state, bearer_token, shutdown).await?;
        }
    }

    tracing::info!("main: shut down cleanly");
    Ok(())
}
