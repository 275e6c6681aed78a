//! WebSocket signaling server

use super::handler::handle_connection;
use crate::session::SessionService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// WebSocket signaling server
///
/// Every accepted connection gets its own session.
pub struct WebSocketSignalingServer {
    listener: TcpListener,
    service: Arc<SessionService>,
}

impl WebSocketSignalingServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, service: Arc<SessionService>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "WebSocket signaling server listening on ws://{}",
            listener.local_addr()?
        );
        Ok(Self { listener, service })
    }

    /// Bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let service = Arc::clone(&self.service);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, service).await {
                                    error!("WebSocket connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept WebSocket connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("WebSocket signaling server received shutdown signal");
                    break;
                }
            }
        }

        info!("WebSocket signaling server accept loop exited");
    }
}
