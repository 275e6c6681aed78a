//! Test harness for session and signaling tests
//!
//! Supplies a scripted peer-connection engine, in-memory tracks and a
//! factory that keeps every engine it created so tests can inject events.

#![allow(dead_code)]

pub mod media;

use async_trait::async_trait;
use audiolink_webrtc::peer::{
    EngineEvent, EngineEventSender, EngineFactory, EngineParts, HeaderExtension, IceCandidate,
    InboundTrack, PacketSink, PeerEngine, SessionDescription, SignalingChannel,
};
use audiolink_webrtc::{AudioLinkConfig, Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use webrtc::rtp::packet::Packet;

pub const EXTENSION_URI: &str = "urn:ietf:params:rtp-hdrext:session-id";

/// Initialize tracing for tests (call once per test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,webrtc=warn")
        .try_init();
}

/// Config pointing at `audio_file`
pub fn config_with_audio(audio_file: &Path) -> AudioLinkConfig {
    AudioLinkConfig {
        audio_file: audio_file.to_path_buf(),
        ..Default::default()
    }
}

/// Config whose audio file does not exist
pub fn config_without_audio() -> AudioLinkConfig {
    config_with_audio(Path::new("/nonexistent/audiolink-test.ogg"))
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Like [`wait_until`] for async conditions
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition().await
}

/// Scripted engine recording every call
///
/// Remote descriptions that do not start with `v=0` are rejected, which
/// stands in for unparseable SDP.
pub struct MockEngine {
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    extensions: Mutex<Vec<Vec<HeaderExtension>>>,
    offers_created: AtomicU32,
    extension_queries: AtomicU32,
    closed: AtomicBool,
    close_fails: AtomicBool,
}

impl MockEngine {
    pub fn new(extensions: Vec<Vec<HeaderExtension>>) -> Self {
        Self {
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            extensions: Mutex::new(extensions),
            offers_created: AtomicU32::new(0),
            extension_queries: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            close_fails: AtomicBool::new(false),
        }
    }

    /// Make `close` report an error (the engine still ends up closed)
    pub fn fail_on_close(&self) {
        self.close_fails.store(true, Ordering::SeqCst);
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn local(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    pub fn set_extensions(&self, extensions: Vec<Vec<HeaderExtension>>) {
        *self.extensions.lock() = extensions;
    }

    pub fn offers_created(&self) -> u32 {
        self.offers_created.load(Ordering::SeqCst)
    }

    pub fn extension_queries(&self) -> u32 {
        self.extension_queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::WebRtcError("engine closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerEngine for MockEngine {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.check_open()?;
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("v=0\r\no=mock-offer {}\r\n", n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.check_open()?;
        if self.remote.lock().is_none() {
            return Err(Error::WebRtcError("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer("v=0\r\no=mock-answer\r\n"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.check_open()?;
        *self.local.lock() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.check_open()?;
        if !desc.sdp.starts_with("v=0") {
            return Err(Error::WebRtcError("SDP parse error".to_string()));
        }
        *self.remote.lock() = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.check_open()?;
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local()
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        self.remote()
    }

    async fn negotiated_header_extensions(&self) -> Vec<Vec<HeaderExtension>> {
        self.extension_queries.fetch_add(1, Ordering::SeqCst);
        self.extensions.lock().clone()
    }

    async fn wait_for_gathering(&self) {}

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.close_fails.load(Ordering::SeqCst) {
            return Err(Error::WebRtcError("close failed".to_string()));
        }
        Ok(())
    }
}

/// Packet sink recording packets with their send instant
pub struct MockSink {
    packets: Mutex<Vec<(Instant, Packet)>>,
    fail_after: Option<usize>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            packets: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    /// Sink that rejects every packet after the first `n`
    pub fn failing_after(n: usize) -> Self {
        Self {
            packets: Mutex::new(Vec::new()),
            fail_after: Some(n),
        }
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.packets.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }
}

#[async_trait]
impl PacketSink for MockSink {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let mut packets = self.packets.lock();
        if let Some(limit) = self.fail_after {
            if packets.len() >= limit {
                return Err(Error::MediaTrackError("track closed".to_string()));
            }
        }
        packets.push((Instant::now(), packet.clone()));
        Ok(())
    }
}

/// Inbound track fed from a channel; reads fail once the sender is dropped
pub struct MockTrack {
    id: String,
    packets: tokio::sync::Mutex<mpsc::UnboundedReceiver<Packet>>,
}

impl MockTrack {
    pub fn new(id: &str) -> (Arc<Self>, mpsc::UnboundedSender<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let track = Arc::new(Self {
            id: id.to_string(),
            packets: tokio::sync::Mutex::new(rx),
        });
        (track, tx)
    }
}

#[async_trait]
impl InboundTrack for MockTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn read_packet(&self) -> Result<Packet> {
        self.packets
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::MediaTrackError("EOF".to_string()))
    }
}

/// Data channel recording every text sent on it
pub struct MockChannel {
    label: String,
    sent: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SignalingChannel for MockChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.sent.lock().push(text);
        Ok(())
    }
}

/// One engine created by [`MockFactory`]
#[derive(Clone)]
pub struct CreatedEngine {
    pub engine: Arc<MockEngine>,
    pub events: EngineEventSender,
    pub sink: Option<Arc<MockSink>>,
}

impl CreatedEngine {
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Factory handing out [`MockEngine`]s with scripted header extensions
pub struct MockFactory {
    extensions: Vec<Vec<HeaderExtension>>,
    created: Mutex<Vec<CreatedEngine>>,
    failing_close: AtomicBool,
}

impl MockFactory {
    pub fn new(extensions: Vec<Vec<HeaderExtension>>) -> Arc<Self> {
        Arc::new(Self {
            extensions,
            created: Mutex::new(Vec::new()),
            failing_close: AtomicBool::new(false),
        })
    }

    /// Factory whose engines negotiate `EXTENSION_URI` under `id`
    pub fn with_extension_id(id: isize) -> Arc<Self> {
        Self::new(vec![vec![
            HeaderExtension::new(1, "urn:ietf:params:rtp-hdrext:sdes:mid"),
            HeaderExtension::new(id, EXTENSION_URI),
        ]])
    }

    pub fn last(&self) -> CreatedEngine {
        self.created
            .lock()
            .last()
            .cloned()
            .expect("no engine created")
    }

    /// Engines created from now on fail to close
    pub fn fail_close_on_new_engines(&self) {
        self.failing_close.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

#[async_trait]
impl EngineFactory for MockFactory {
    async fn create(&self, events: EngineEventSender, with_audio: bool) -> Result<EngineParts> {
        let engine = Arc::new(MockEngine::new(self.extensions.clone()));
        if self.failing_close.load(Ordering::SeqCst) {
            engine.fail_on_close();
        }
        let sink = with_audio.then(|| Arc::new(MockSink::new()));

        self.created.lock().push(CreatedEngine {
            engine: Arc::clone(&engine),
            events,
            sink: sink.clone(),
        });

        Ok(EngineParts {
            engine,
            audio_sink: sink.map(|s| s as Arc<dyn PacketSink>),
        })
    }
}
