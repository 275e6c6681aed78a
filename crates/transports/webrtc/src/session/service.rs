//! Session setup shared by the signaling transports

use crate::config::AudioLinkConfig;
use crate::media::ogg::OggPageReader;
use crate::media::packetizer::{Packetizer, PacketizerConfig};
use crate::peer::engine::{EngineFactory, PacketSink};
use crate::session::peer_session::PeerSession;
use crate::session::registry::SessionRegistry;
use crate::signaling::machine::SignalingStateMachine;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Creates sessions: engine, registry entry, event task and packetizer
pub struct SessionService {
    config: Arc<AudioLinkConfig>,
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn EngineFactory>,
}

impl SessionService {
    /// Create a service with a fresh registry sized from the config
    pub fn new(config: Arc<AudioLinkConfig>, factory: Arc<dyn EngineFactory>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        Self::with_registry(config, registry, factory)
    }

    /// Create a service over an existing registry
    pub fn with_registry(
        config: Arc<AudioLinkConfig>,
        registry: Arc<SessionRegistry>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            config,
            registry,
            factory,
        }
    }

    /// Shared configuration
    pub fn config(&self) -> &Arc<AudioLinkConfig> {
        &self.config
    }

    /// Session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a session
    ///
    /// With `outbound`, messages for the peer (offers, answers, candidates)
    /// are pushed to it. When the audio file is missing the session still
    /// opens, without an outbound track.
    pub async fn open(
        &self,
        outbound: Option<mpsc::Sender<String>>,
    ) -> Result<Arc<SignalingStateMachine>> {
        let with_audio = self.config.audio_available();
        if !with_audio {
            warn!(
                "Audio file {} not found, session will not stream audio",
                self.config.audio_file.display()
            );
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let parts = self.factory.create(events_tx, with_audio).await?;

        let handle = self.registry.next_handle();
        let session = Arc::new(PeerSession::new(
            handle,
            Arc::clone(&parts.engine),
            self.config.extension_uri.clone(),
        ));

        if let Err(e) = self.registry.insert(Arc::clone(&session)).await {
            if let Err(close_err) = parts.engine.close().await {
                warn!("{} failed to close rejected engine: {}", handle, close_err);
            }
            return Err(e);
        }

        let machine = Arc::new(SignalingStateMachine::new(
            Arc::clone(&session),
            Arc::clone(&self.registry),
            outbound,
        ));
        tokio::spawn(Arc::clone(&machine).run_events(events_rx));

        if let Some(sink) = parts.audio_sink {
            self.start_packetizer(session, sink);
        }

        info!("Opened {}", handle);
        Ok(machine)
    }

    fn start_packetizer(&self, session: Arc<PeerSession>, sink: Arc<dyn PacketSink>) {
        let handle = session.handle();
        let path = self.config.audio_file.clone();
        let config = PacketizerConfig::from(self.config.as_ref());

        tokio::spawn(async move {
            // Opening parses the identification page; keep that file I/O off
            // the async workers
            let opened = tokio::task::spawn_blocking({
                let path = path.clone();
                move || OggPageReader::open(path)
            })
            .await;

            let reader = match opened {
                Ok(Ok(reader)) => reader,
                Ok(Err(e)) => {
                    error!("{} cannot stream {}: {}", handle, path.display(), e);
                    return;
                }
                Err(e) => {
                    error!("{} audio open task failed: {}", handle, e);
                    return;
                }
            };

            let packetizer = Packetizer::new(config, Box::new(reader), sink, session);
            match packetizer.run().await {
                Ok(sent) => info!("{} packetizer finished, {} packets sent", handle, sent),
                Err(e) => warn!("{} packetizer stopped: {}", handle, e),
            }
        });
    }

    /// Answer an offer in one request/response exchange
    ///
    /// Requires the audio file. Waits for candidate gathering so the answer
    /// carries every local candidate.
    pub async fn answer_offer(&self, offer_sdp: String) -> Result<String> {
        if !self.config.audio_available() {
            return Err(Error::AudioUnavailable(
                self.config.audio_file.display().to_string(),
            ));
        }

        let machine = self.open(None).await?;
        match self.complete_answer(&machine, offer_sdp).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                machine.close().await;
                Err(e)
            }
        }
    }

    async fn complete_answer(
        &self,
        machine: &SignalingStateMachine,
        offer_sdp: String,
    ) -> Result<String> {
        let answer = machine.accept_offer(offer_sdp).await?;

        let engine = machine.session().engine();
        engine.wait_for_gathering().await;

        // The local description now includes the gathered candidates
        Ok(engine
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .unwrap_or(answer.sdp))
    }
}
