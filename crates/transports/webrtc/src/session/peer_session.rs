//! Per-connection session state

use crate::media::extension::ExtensionBinding;
use crate::peer::engine::{EngineState, PeerEngine};
use crate::session::registry::SessionHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, MutexGuard};
use tracing::{debug, info};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no negotiation yet
    Idle,
    /// An offer/answer exchange is in flight
    Negotiating,
    /// Engine reported connectivity
    Connected,
    /// Torn down (terminal)
    Closed,
}

/// Playback position of the outbound stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    /// Packets handed to the engine so far
    pub packets_sent: u64,
    /// Sequence number of the last packet sent
    pub last_sequence: u16,
    /// Granule position of the last page sent
    pub last_granule: u64,
}

/// One peer session, owned by its registry entry
pub struct PeerSession {
    handle: SessionHandle,
    engine: Arc<dyn PeerEngine>,
    state: watch::Sender<SessionState>,
    engine_state: Mutex<EngineState>,
    extension: ExtensionBinding,

    /// Serializes local/remote description changes
    negotiation: tokio::sync::Mutex<()>,

    negotiator_ran: AtomicBool,
    cursor: Mutex<PlaybackCursor>,
}

impl PeerSession {
    /// Create an idle session
    pub fn new(
        handle: SessionHandle,
        engine: Arc<dyn PeerEngine>,
        extension_uri: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            handle,
            engine,
            state,
            engine_state: Mutex::new(EngineState::New),
            extension: ExtensionBinding::new(extension_uri),
            negotiation: tokio::sync::Mutex::new(()),
            negotiator_ran: AtomicBool::new(false),
            cursor: Mutex::new(PlaybackCursor::default()),
        }
    }

    /// Session handle
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Engine handle shared by the session's tasks
    pub fn engine(&self) -> &Arc<dyn PeerEngine> {
        &self.engine
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `new_state`
    ///
    /// Returns `true` if the state changed. Nothing leaves `Closed`.
    pub fn set_state(&self, new_state: SessionState) -> bool {
        let mut previous = None;
        self.state.send_if_modified(|current| {
            if *current == SessionState::Closed || *current == new_state {
                return false;
            }
            previous = Some(*current);
            *current = new_state;
            true
        });

        match previous {
            Some(old) => {
                info!("{} state transition: {:?} -> {:?}", self.handle, old, new_state);
                true
            }
            None => false,
        }
    }

    /// Watch lifecycle changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until the session is connected
    ///
    /// Returns `false` if it closed first.
    pub async fn wait_connected(&self) -> bool {
        let mut rx = self.state.subscribe();
        let connected = rx
            .wait_for(|s| matches!(s, SessionState::Connected | SessionState::Closed))
            .await
            .map(|state| *state == SessionState::Connected)
            .unwrap_or(false);
        connected
    }

    /// Last connection state reported by the engine
    pub fn engine_state(&self) -> EngineState {
        *self.engine_state.lock()
    }

    /// Record an engine connection state
    pub fn set_engine_state(&self, state: EngineState) {
        *self.engine_state.lock() = state;
    }

    /// Custom header-extension binding
    pub fn extension(&self) -> &ExtensionBinding {
        &self.extension
    }

    /// Take the per-session negotiation lock
    pub async fn lock_negotiation(&self) -> MutexGuard<'_, ()> {
        self.negotiation.lock().await
    }

    /// Claim the one extension-negotiator run of this session
    ///
    /// Returns `true` only for the first caller.
    pub fn claim_negotiator(&self) -> bool {
        !self.negotiator_ran.swap(true, Ordering::AcqRel)
    }

    /// Current playback cursor
    pub fn cursor(&self) -> PlaybackCursor {
        *self.cursor.lock()
    }

    /// Advance the playback cursor after a packet went out
    pub fn record_packet(&self, sequence: u16, granule: u64) {
        let mut cursor = self.cursor.lock();
        cursor.packets_sent += 1;
        cursor.last_sequence = sequence;
        cursor.last_granule = granule;
        if cursor.packets_sent % 500 == 0 {
            debug!(
                "{} sent {} packets (granule {})",
                self.handle, cursor.packets_sent, granule
            );
        }
    }
}
