//! HTTP signaling: one offer in, one complete answer out
//!
//! - POST /session - `{"offer": "<sdp>"}` → `{"answer": "<sdp>"}`
//!
//! The answer is returned after candidate gathering, so no candidates are
//! trickled afterwards. Other methods on `/session` get 405.

use crate::session::SessionService;
use crate::{Error, Result};
use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Request body for POST /session
#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    /// Remote SDP offer
    pub offer: String,
}

/// Response body for POST /session
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// Local SDP answer including gathered candidates
    pub answer: String,
}

/// Build the signaling router
pub fn router(service: Arc<SessionService>) -> Router {
    Router::new()
        .route("/session", post(create_session_handler))
        .with_state(service)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}

/// Map a session error to a status code
fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::AudioUnavailable(_) => StatusCode::METHOD_NOT_ALLOWED,
        Error::MalformedMessage(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn create_session_handler(
    State(service): State<Arc<SessionService>>,
    body: Bytes,
) -> std::result::Result<Json<AnswerResponse>, (StatusCode, String)> {
    // Checked before the body so a missing file wins over a bad request
    if !service.config().audio_available() {
        warn!(
            "Rejecting session: audio file {} not found",
            service.config().audio_file.display()
        );
        return Err((
            StatusCode::METHOD_NOT_ALLOWED,
            "audio file not available".to_string(),
        ));
    }

    let request: OfferRequest = serde_json::from_slice(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid session request: {}", e),
        )
    })?;

    match service.answer_offer(request.offer).await {
        Ok(answer) => Ok(Json(AnswerResponse { answer })),
        Err(e) => {
            error!("Failed to answer offer: {}", e);
            Err((status_for(&e), e.to_string()))
        }
    }
}

/// HTTP signaling server
pub struct HttpSignalingServer {
    listener: TcpListener,
    service: Arc<SessionService>,
}

impl HttpSignalingServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, service: Arc<SessionService>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "HTTP signaling server listening on http://{}",
            listener.local_addr()?
        );
        Ok(Self { listener, service })
    }

    /// Bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, router(self.service))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::SignalingError(format!("HTTP server error: {}", e)))
    }
}
