//! Pipeline engine binary.
//!
//! Runs one stage's dispatch loop, selected by `PIPELINE_STAGE`
//! (upload, transcribe, or tag).

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edupipe_engine::{ContinuousRunner, Dispatcher, EngineConfig, EnvHandlerFactory};
use edupipe_models::Stage;
use edupipe_store::VideoRepo;

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("edupipe=info".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let stage = match std::env::var("PIPELINE_STAGE")
        .ok()
        .as_deref()
        .and_then(Stage::parse)
    {
        Some(stage) => stage,
        None => {
            error!("PIPELINE_STAGE must be one of: upload, transcribe, tag");
            std::process::exit(1);
        }
    };

    info!(stage = %stage, "Starting edupipe-engine");

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let store = match VideoRepo::from_env() {
        Ok(repo) => Arc::new(repo),
        Err(e) => {
            error!("Failed to create record store: {}", e);
            std::process::exit(1);
        }
    };

    let factory = Arc::new(EnvHandlerFactory::new(
        stage,
        config.clone(),
        store.clone(),
    ));
    let dispatcher = Dispatcher::new(config.clone(), store, factory);
    let runner = ContinuousRunner::new(config, dispatcher);

    // Ctrl-c stops the loop after the current round.
    let shutdown = runner.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    match runner.run().await {
        Ok(summary) => {
            info!(
                rounds = summary.rounds,
                items_succeeded = summary.items_succeeded,
                items_failed = summary.items_failed,
                "Engine shutdown complete"
            );
        }
        Err(e) => {
            error!("Runner error: {}", e);
            std::process::exit(1);
        }
    }
}
