//! AudioLink WebRTC server binary entry point
//!
//! Streams an Ogg/Opus file to every peer that connects and logs the
//! header-extension metadata peers send back.
//!
//! # Usage
//!
//! ```bash
//! # WebSocket signaling (default: 0.0.0.0:8080)
//! cargo run -p audiolink-webrtc-server -- \
//!   --mode websocket \
//!   --ws-address 0.0.0.0:8080 \
//!   --audio-file ./output.ogg
//!
//! # HTTP signaling: POST /session with {"offer": "<sdp>"}
//! cargo run -p audiolink-webrtc-server -- \
//!   --mode http \
//!   --http-address 0.0.0.0:8080 \
//!   --extension-uri urn:ietf:params:rtp-hdrext:ssrc-seq
//!
//! # Configure STUN servers
//! cargo run -p audiolink-webrtc-server -- \
//!   --stun-servers stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302
//! ```

use anyhow::Context;
use audiolink_webrtc::signaling::{HttpSignalingServer, WebSocketSignalingServer};
use audiolink_webrtc::{AudioLinkConfig, SessionService, WebRtcEngineFactory};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// AudioLink WebRTC Server
///
/// Streams a pre-recorded Ogg/Opus file over WebRTC, tagging every packet
/// with a custom RTP header extension.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling transport: 'websocket' (duplex, trickle ICE) or 'http' (POST /session)
    #[arg(short, long, default_value = "websocket", env = "AUDIOLINK_MODE")]
    mode: ServerMode,

    /// WebSocket signaling listen address (websocket mode only)
    #[arg(long, default_value = "0.0.0.0:8080", env = "AUDIOLINK_WS_ADDRESS")]
    ws_address: SocketAddr,

    /// HTTP signaling listen address (http mode only)
    #[arg(long, default_value = "0.0.0.0:8080", env = "AUDIOLINK_HTTP_ADDRESS")]
    http_address: SocketAddr,

    /// Ogg/Opus file streamed to peers
    #[arg(long, default_value = "output.ogg", env = "AUDIOLINK_AUDIO_FILE")]
    audio_file: PathBuf,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// Custom RTP header-extension URI
    #[arg(
        long,
        default_value = audiolink_webrtc::DEFAULT_EXTENSION_URI,
        env = "AUDIOLINK_EXTENSION_URI"
    )]
    extension_uri: String,

    /// Pacing interval between Ogg pages in milliseconds
    #[arg(long, default_value_t = 20, env = "AUDIOLINK_PAGE_INTERVAL_MS")]
    page_interval_ms: u64,

    /// Correlation value written into the header extension
    #[arg(long, default_value_t = 12345, env = "AUDIOLINK_CORRELATION_VALUE")]
    correlation_value: u32,

    /// Maximum concurrent sessions (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "AUDIOLINK_MAX_SESSIONS")]
    max_sessions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ServerMode {
    /// WebSocket signaling server
    Websocket,
    /// HTTP offer/answer server
    Http,
}

impl Args {
    fn to_config(&self) -> AudioLinkConfig {
        AudioLinkConfig {
            stun_servers: self.stun_servers.clone(),
            extension_uri: self.extension_uri.clone(),
            audio_file: self.audio_file.clone(),
            page_interval_ms: self.page_interval_ms,
            correlation_value: self.correlation_value,
            max_sessions: self.max_sessions,
            ..Default::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Ctrl+C / SIGTERM flip the shutdown watch; a second signal exits at once
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        if *shutdown_tx.borrow() {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(0);
        }
        eprintln!("\nSignal received, shutting down...");
        let _ = shutdown_tx.send(true);
    })
    .context("Failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("audiolink-worker")
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async_main(args, shutdown_rx))
}

async fn async_main(args: Args, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?args.mode,
        "AudioLink WebRTC Server starting"
    );

    let config = args.to_config();
    config.validate()?;

    info!(
        audio_file = %config.audio_file.display(),
        extension_uri = %config.extension_uri,
        stun_servers = config.stun_servers.len(),
        page_interval_ms = config.page_interval_ms,
        max_sessions = config.max_sessions,
        "Configuration loaded"
    );

    if !config.audio_available() {
        warn!(
            "Audio file {} not found; sessions will not stream audio",
            config.audio_file.display()
        );
    }

    let config = Arc::new(config);
    let factory = Arc::new(WebRtcEngineFactory::new(Arc::clone(&config)));
    let service = Arc::new(SessionService::new(config, factory));

    match args.mode {
        ServerMode::Websocket => {
            let server = WebSocketSignalingServer::bind(args.ws_address, Arc::clone(&service))
                .await
                .with_context(|| format!("Failed to bind {}", args.ws_address))?;
            server.serve(wait_for_shutdown(shutdown_rx)).await;
        }
        ServerMode::Http => {
            let server = HttpSignalingServer::bind(args.http_address, Arc::clone(&service))
                .await
                .with_context(|| format!("Failed to bind {}", args.http_address))?;
            server.serve(wait_for_shutdown(shutdown_rx)).await?;
        }
    }

    let remaining = service.registry().len().await;
    info!(remaining_sessions = remaining, "Server shut down");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
    info!("Shutdown signal received, stopping server...");
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,webrtc=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
