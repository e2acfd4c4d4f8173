//! Relay Daemon - HTTP front end for the ConvoScribe relay
//!
//! Serves the chat, summarize and explain routes plus the static web client.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:5000, ~/.config/convoscribe/relay.toml)
//! relay-daemon
//!
//! # Custom bind address and client directory
//! relay-daemon --bind 0.0.0.0:8080 --static-dir ./web
//!
//! # Verbose logging
//! RUST_LOG=debug relay-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (in-flight requests finish)

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use relay_core::{
    load_config_from_path, CompletionOrchestrator, ConfigOverrides, HttpBackendFactory,
    OllamaBackend, OpenAiBackend, RelayConfig, TranscriptWorkflow, YouTubeTranscripts,
};

use server::{build_router, AppState, HealthTarget};

/// Relay Daemon - LLM chat and YouTube summary relay
#[derive(Parser, Debug)]
#[command(name = "relay-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "RELAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config and RELAY_BIND)
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<String>,

    /// Directory of static client files (overrides config and RELAY_STATIC_DIR)
    #[arg(short = 's', long, value_name = "DIR")]
    static_dir: Option<PathBuf>,
}

/// Initialize logging; `RUST_LOG` adds to the default directives
fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_daemon=info".parse()?)
                .add_directive("relay_core=info".parse()?),
        )
        .with_target(true)
        .init();

    Ok(())
}

/// Resolve configuration: CLI > environment > file > defaults
fn resolve_config(args: &Args) -> Result<RelayConfig> {
    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load relay configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(bind) = &args.bind {
        overrides = overrides.with_bind_addr(bind.clone());
    }
    if let Some(dir) = &args.static_dir {
        overrides = overrides.with_static_dir(dir.clone());
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid relay configuration")?;
    Ok(config)
}

/// Backends reported by `/api/health`
fn health_targets(config: &RelayConfig, http_client: &reqwest::Client) -> Vec<HealthTarget> {
    let mut targets = vec![HealthTarget {
        name: "ollama".to_string(),
        backend: Arc::new(OllamaBackend::with_client(
            config.ollama.endpoint.as_str(),
            http_client.clone(),
        )),
    }];

    if let Some(api_key) = config.openai.api_key.as_deref() {
        targets.push(HealthTarget {
            name: "openai".to_string(),
            backend: Arc::new(
                OpenAiBackend::with_client(api_key, http_client.clone())
                    .with_base_url(config.openai.base_url.as_str()),
            ),
        });
    }

    targets
}

/// Resolves when SIGINT or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables take precedence
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();
    init_logging()?;

    info!("Relay daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(path) => info!(path = ?path, "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to read .env"),
    }

    let config = resolve_config(&args)?;
    info!(
        source = %config.source(),
        config_file = ?config.config_file_path,
        ollama = %config.ollama.endpoint,
        openai = config.openai.api_key.is_some(),
        "Configuration loaded"
    );

    let http_client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let factory = Arc::new(HttpBackendFactory::new(
        http_client.clone(),
        config.openai.api_key.clone(),
    ));
    let transcripts = Arc::new(YouTubeTranscripts::new(
        http_client.clone(),
        config.transcript_languages.clone(),
    ));

    let orchestrator = CompletionOrchestrator::from_config(&config, factory.clone());
    info!(candidates = orchestrator.catalog().len(), "Chat candidates ready");
    let workflow = TranscriptWorkflow::from_config(&config, transcripts, factory);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        workflow: Arc::new(workflow),
        health_targets: Arc::new(health_targets(&config, &http_client)),
    };
    let router = build_router(state, config.server.static_dir.as_deref());

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening for HTTP requests");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    match result {
        Ok(()) => {
            info!("Relay daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Relay daemon stopped with error");
            Err(e)
        }
    }
}
