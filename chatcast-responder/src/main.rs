//! chatcast-responder - Main entry point
//!
//! Starts the comment pipeline and serves the HTTP control API. Comments are
//! posted to `/comments` by the aggregator bridge; answers are played through
//! the subtitle sink.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatcast_common::config::resolve_config_path;
use chatcast_common::events::EventBus;
use chatcast_responder::api::{self, AppState};
use chatcast_responder::client::{AnswerRequestClient, HttpTransport};
use chatcast_responder::config::{CliOverrides, ResponderConfig, CONFIG_ENV_VAR};
use chatcast_responder::fetch::HttpAudioFetcher;
use chatcast_responder::metrics::PipelineCounters;
use chatcast_responder::pipeline::{PipelineController, PipelineParts};
use chatcast_responder::playback::SubtitleSink;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Slot held for clips whose duration cannot be read
const FALLBACK_CLIP_DURATION: Duration = Duration::from_secs(3);

/// Command-line arguments for chatcast-responder
#[derive(Parser, Debug)]
#[command(name = "chatcast-responder")]
#[command(about = "Answers live-stream comments with spoken replies")]
#[command(version)]
struct Args {
    /// Config file (default: $CHATCAST_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chat-messages endpoint of the conversational backend
    #[arg(long, env = "CHATCAST_API_URL")]
    api_url: Option<String>,

    /// Backend API key
    #[arg(long, env = "CHATCAST_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CHATCAST_PORT")]
    port: Option<u16>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "CHATCAST_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR)
        .context("Failed to resolve config path")?;
    let overrides = CliOverrides {
        api_url: args.api_url,
        api_key: args.api_key,
        port: args.port,
        log_level: args.log_level,
    };
    let config = ResponderConfig::load(&config_path, &overrides)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize tracing
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("chatcast_responder={level},chatcast_common={level},tower_http=debug").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chatcast-responder v{}", env!("CARGO_PKG_VERSION"));
    if config_path.exists() {
        info!("Config: {}", config_path.display());
    } else {
        warn!("Config file {} not found, using defaults", config_path.display());
    }
    config.validate().context("Invalid configuration")?;

    let transport = HttpTransport::new(CONNECT_TIMEOUT).context("Failed to build HTTP client")?;
    let fetcher = Arc::new(HttpAudioFetcher::new(
        transport.client().clone(),
        config.backend.audio_fetch_timeout(),
    ));
    let client = Arc::new(
        AnswerRequestClient::new(&config.backend, Arc::new(transport))
            .context("Failed to create answer client")?,
    );
    info!("Backend endpoint: {}", client.endpoint());

    let controller = Arc::new(PipelineController::new(
        &config,
        PipelineParts {
            client,
            fetcher,
            sink: Arc::new(SubtitleSink::new(FALLBACK_CLIP_DURATION)),
            events: EventBus::new(config.server.event_capacity),
            metrics: Arc::new(PipelineCounters::new()),
        },
    ));
    controller.start();

    if controller.test_connection().await {
        info!("Backend reachable");
    } else {
        warn!("Backend not reachable; comments will fail until it is");
    }

    let state = AppState::new(Arc::clone(&controller), config.pipeline.default_author_name.clone());
    api::serve(state, config.server.port, shutdown_signal())
        .await
        .context("Server error")?;

    controller.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
