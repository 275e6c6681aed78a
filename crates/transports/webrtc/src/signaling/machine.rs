//! Signaling state machine
//!
//! One machine per session. Inbound signaling messages arrive one at a time
//! from the transport's reader loop; engine events arrive on the session's
//! event queue and are consumed by [`SignalingStateMachine::run_events`].
//! Both paths take the session's negotiation lock before touching local or
//! remote descriptions.
//!
//! Once the peer opens a data channel, renegotiation moves in band: offers
//! are sent on the channel and answers arriving on it are applied.

use crate::media::extension::resolve_extension_id;
use crate::media::receiver::run_track_reader;
use crate::peer::engine::{
    EngineEvent, EngineEventReceiver, EngineState, SessionDescription, SignalingChannel,
};
use crate::session::peer_session::{PeerSession, SessionState};
use crate::session::registry::SessionRegistry;
use crate::signaling::protocol::{CandidateMessage, SignalingMessage};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Drives one session through `Idle → Negotiating → Connected → Closed`
pub struct SignalingStateMachine {
    session: Arc<PeerSession>,
    registry: Arc<SessionRegistry>,

    /// Duplex channel back to the remote peer. `None` for request/response
    /// signaling, where nothing can be pushed to the peer.
    outbound: Option<mpsc::Sender<String>>,

    /// Peer-opened data channel used for in-band renegotiation
    data_channel: Mutex<Option<Arc<dyn SignalingChannel>>>,
}

impl SignalingStateMachine {
    /// Create a machine for a registered session
    pub fn new(
        session: Arc<PeerSession>,
        registry: Arc<SessionRegistry>,
        outbound: Option<mpsc::Sender<String>>,
    ) -> Self {
        Self {
            session,
            registry,
            outbound,
            data_channel: Mutex::new(None),
        }
    }

    /// Session driven by this machine
    pub fn session(&self) -> &Arc<PeerSession> {
        &self.session
    }

    /// Parse and handle one inbound text message
    ///
    /// Unknown message types are ignored. Errors only concern this message.
    pub async fn handle_text(&self, text: &str) -> Result<()> {
        match SignalingMessage::parse(text)? {
            Some(message) => self.handle_message(message).await,
            None => {
                debug!("{} ignoring message of unknown type", self.session.handle());
                Ok(())
            }
        }
    }

    /// Handle one inbound signaling message
    pub async fn handle_message(&self, message: SignalingMessage) -> Result<()> {
        debug!("{} received {}", self.session.handle(), message.kind());

        match message {
            SignalingMessage::Offer { sdp } => {
                let answer = self.accept_offer(sdp).await?;
                self.send(SignalingMessage::Answer { sdp: answer.sdp }).await
            }
            SignalingMessage::Answer { sdp } => self.accept_answer(sdp).await,
            SignalingMessage::Candidate(candidate) => {
                let candidate = candidate.into_candidate()?;
                self.session.engine().add_ice_candidate(candidate).await
            }
            SignalingMessage::Hello => self.send_offer().await,
        }
    }

    /// Build an offer, apply it locally and send it to the peer
    pub async fn send_offer(&self) -> Result<()> {
        let offer = self.create_local_offer().await?;
        self.send(SignalingMessage::Offer { sdp: offer.sdp }).await
    }

    /// Build an offer, apply it locally and send it on `channel`
    async fn send_offer_in_band(&self, channel: Arc<dyn SignalingChannel>) -> Result<()> {
        let offer = self.create_local_offer().await?;
        let text = SignalingMessage::Offer { sdp: offer.sdp }.to_json()?;
        channel.send_text(text).await
    }

    async fn create_local_offer(&self) -> Result<SessionDescription> {
        let engine = self.session.engine();
        let _guard = self.session.lock_negotiation().await;

        let offer = engine.create_offer().await?;
        engine.set_local_description(offer.clone()).await?;
        self.session.set_state(SessionState::Negotiating);
        Ok(offer)
    }

    /// Data channel currently used for in-band signaling
    pub fn data_channel(&self) -> Option<Arc<dyn SignalingChannel>> {
        self.data_channel.lock().clone()
    }

    /// Apply a remote offer and produce the local answer
    ///
    /// The answer is applied locally but not sent; callers decide how it
    /// reaches the peer.
    pub async fn accept_offer(&self, sdp: String) -> Result<SessionDescription> {
        let engine = self.session.engine();
        let _guard = self.session.lock_negotiation().await;

        engine
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        let answer = engine.create_answer().await?;
        engine.set_local_description(answer.clone()).await?;

        self.session.set_state(SessionState::Negotiating);
        self.settle();
        Ok(answer)
    }

    /// Apply a remote answer to our last offer
    pub async fn accept_answer(&self, sdp: String) -> Result<()> {
        let _guard = self.session.lock_negotiation().await;
        self.session
            .engine()
            .set_remote_description(SessionDescription::answer(sdp))
            .await?;
        self.settle();
        Ok(())
    }

    /// Negotiation finished; fall back to `Connected` if media already flows
    fn settle(&self) {
        if self.session.engine_state() == EngineState::Connected {
            self.session.set_state(SessionState::Connected);
        }
    }

    /// Handle one engine event
    pub async fn handle_event(&self, event: EngineEvent) {
        let handle = self.session.handle();

        match event {
            EngineEvent::NegotiationNeeded => {
                let result = match self.data_channel() {
                    Some(channel) => self.send_offer_in_band(channel).await,
                    None if self.outbound.is_some() => self.send_offer().await,
                    None => {
                        debug!("{} has no duplex channel, skipping renegotiation", handle);
                        return;
                    }
                };
                if let Err(e) = result {
                    warn!("{} failed to renegotiate: {}", handle, e);
                }
            }
            EngineEvent::CandidateGenerated(Some(candidate)) => {
                let message = SignalingMessage::Candidate(CandidateMessage::from(candidate));
                if let Err(e) = self.send(message).await {
                    warn!("{} failed to send candidate: {}", handle, e);
                }
            }
            EngineEvent::CandidateGenerated(None) => {
                debug!("{} finished gathering candidates", handle);
            }
            EngineEvent::StateChanged(state) => self.on_engine_state(state).await,
            EngineEvent::TrackReceived(track) => {
                tokio::spawn(run_track_reader(track, Arc::clone(&self.session)));
            }
            EngineEvent::DataChannelOpened(channel) => {
                info!("{} signaling over data channel {}", handle, channel.label());
                *self.data_channel.lock() = Some(channel);
            }
            EngineEvent::DataChannelMessage { label, text } => {
                if let Err(e) = self.handle_in_band(&text).await {
                    warn!("{} dropped message on data channel {}: {}", handle, label, e);
                }
            }
            EngineEvent::DataChannelClosed(label) => {
                let mut current = self.data_channel.lock();
                if current.as_ref().is_some_and(|c| c.label() == label) {
                    info!("{} data channel {} closed", handle, label);
                    *current = None;
                }
            }
        }
    }

    /// Apply answers received on the data channel; other messages are ignored
    async fn handle_in_band(&self, text: &str) -> Result<()> {
        match SignalingMessage::parse(text)? {
            Some(SignalingMessage::Answer { sdp }) => self.accept_answer(sdp).await,
            Some(other) => {
                debug!(
                    "{} ignoring {} on data channel",
                    self.session.handle(),
                    other.kind()
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn on_engine_state(&self, state: EngineState) {
        let handle = self.session.handle();
        self.session.set_engine_state(state);
        info!("{} engine state: {}", handle, state);

        match state {
            EngineState::Connected => {
                // Bind before publishing Connected so the packetizer's first
                // packet already carries the extension
                if self.session.claim_negotiator() {
                    self.resolve_extension().await;
                }
                self.session.set_state(SessionState::Connected);
            }
            EngineState::Failed | EngineState::Closed => {
                warn!("{} engine {}", handle, state);
                // Request/response sessions have no transport close to wait for
                if self.outbound.is_none() {
                    self.close().await;
                }
            }
            _ => {}
        }
    }

    async fn resolve_extension(&self) {
        let binding = self.session.extension();
        let transceivers = self.session.engine().negotiated_header_extensions().await;
        let id = resolve_extension_id(binding.uri(), &transceivers);

        if binding.bind(id) {
            info!(
                "{} header extension {} negotiated with id {}",
                self.session.handle(),
                binding.uri(),
                id
            );
        } else {
            warn!(
                "{} header extension {} was not negotiated, packets carry no metadata",
                self.session.handle(),
                binding.uri()
            );
        }
    }

    /// Consume engine events until the queue ends or the session closes
    pub async fn run_events(self: Arc<Self>, mut events: EngineEventReceiver) {
        let mut state = self.session.subscribe_state();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                // The watch guard must not outlive the branch
                _ = async {
                    let _ = state.wait_for(|s| *s == SessionState::Closed).await;
                } => break,
            }
        }

        debug!("{} event loop finished", self.session.handle());
    }

    /// Tear the session down: `Closed`, out of the registry, engine closed
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        if !self.session.set_state(SessionState::Closed) {
            return;
        }

        let handle = self.session.handle();
        self.registry.remove(handle).await;

        if let Err(e) = self.session.engine().close().await {
            warn!("{} failed to close engine: {}", handle, e);
        }
    }

    async fn send(&self, message: SignalingMessage) -> Result<()> {
        let Some(outbound) = &self.outbound else {
            return Ok(());
        };

        let text = message.to_json()?;
        outbound
            .send(text)
            .await
            .map_err(|_| Error::SignalingError("outbound channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::peer_session::tests::idle_session;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_event_loop_can_be_spawned() {
        let registry = Arc::new(SessionRegistry::default());
        let session = idle_session(registry.next_handle());
        let machine = Arc::new(SignalingStateMachine::new(
            Arc::clone(&session),
            registry,
            None,
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let events = Arc::clone(&machine).run_events(rx);
        assert_send(&events);
        let task = tokio::spawn(events);

        tx.send(EngineEvent::CandidateGenerated(None)).unwrap();
        machine.close().await;
        task.await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
