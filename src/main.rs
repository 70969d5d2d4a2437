//! Wyoming macOS TTS - A Wyoming protocol text-to-speech server.
//!
//! This application exposes the macOS `say` command to Wyoming clients such
//! as Home Assistant. Request text is split into sentences, each sentence is
//! synthesized by a `say` subprocess, and the audio is streamed back in
//! fixed-size chunks.

mod audio;
mod config;
mod protocol;
mod server;
mod tts;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use config::{AppConfig, print_voice_info, print_voices};
use server::{Server, ServerUri};
use tts::{SaySynthesizer, SayVoiceCatalog, VoiceCatalog};

/// Wait for Ctrl+C or SIGTERM, then cancel the shutdown token.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Log to stderr: stdout carries the protocol for stdio://
    // Respect RUST_LOG env var, fallback to debug flag, default to info
    let filter = EnvFilter::try_from_default_env().or_else(|_| if config.debug { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let catalog = SayVoiceCatalog::new(&config);

    // Catalog helpers print and exit
    if config.list_voices || config.voice_info.is_some() {
        let voices = catalog.voices().await?;
        match &config.voice_info {
            Some(name) => print_voice_info(&voices, name)?,
            None => print_voices(&voices),
        }
        return Ok(());
    }

    info!("🗣️ Wyoming macOS TTS v{}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    let synthesizer = SaySynthesizer::new(&config);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let server = Server::new(config.session_config(), synthesizer, catalog, shutdown.clone());
    let result = server.run(&config.uri).await;
    shutdown.cancel();
    result?;

    info!("✅ Server stopped");

    // A pending stdin read holds a blocking thread that the runtime would wait for
    if config.uri == ServerUri::Stdio {
        std::process::exit(0);
    }
    Ok(())
}
