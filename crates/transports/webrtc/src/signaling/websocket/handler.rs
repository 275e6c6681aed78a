//! WebSocket connection handler
//!
//! One task per connection reads frames and feeds text messages to the
//! session's state machine. A forward task writes outbound messages.

use crate::session::SessionService;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Message, Result as WsResult},
};
use tracing::{debug, error, info, warn};

/// Handle a single WebSocket connection until it closes
pub async fn handle_connection(stream: TcpStream, service: Arc<SessionService>) -> WsResult<()> {
    let addr = stream.peer_addr()?;
    info!("New WebSocket connection from: {}", addr);

    let ws_stream = accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    // Channel for sending messages back to this connection
    let (tx, mut rx) = mpsc::channel::<String>(128);

    let ws_tx = Arc::new(Mutex::new(ws_tx));
    let ws_tx_clone = Arc::clone(&ws_tx);
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let mut ws_tx = ws_tx_clone.lock().await;
            if let Err(e) = ws_tx.send(Message::Text(msg)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let machine = match service.open(Some(tx)).await {
        Ok(machine) => machine,
        Err(e) => {
            error!("Failed to open session for {}: {}", addr, e);
            let _ = ws_tx.lock().await.send(Message::Close(None)).await;
            forward_task.abort();
            return Ok(());
        }
    };
    let handle = machine.session().handle();
    info!("{} bound to {}", handle, addr);

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = machine.handle_text(&text).await {
                    if e.is_per_message() {
                        warn!("{} dropped message: {}", handle, e);
                    } else {
                        error!("{} error handling message: {}", handle, e);
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket connection closed by client: {}", addr);
                break;
            }
            Ok(Message::Ping(data)) => {
                let mut ws_tx = ws_tx.lock().await;
                let _ = ws_tx.send(Message::Pong(data)).await;
            }
            Ok(other) => {
                debug!("{} ignoring non-text frame ({} bytes)", handle, other.len());
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        }
    }

    info!("Cleaning up {}", handle);
    machine.close().await;
    forward_task.abort();

    Ok(())
}
