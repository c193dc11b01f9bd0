//! Camera/microphone capture and the peer-to-peer video session.
//!
//! A [`MediaSession`] owns at most one peer connection. Everything that
//! reaches it (signals from the chat socket, callbacks from the WebRTC
//! stack) is delivered by the controller one event at a time, so the
//! session needs no locking of its own. Callback events carry the session
//! number they were produced under and are dropped once that session has
//! been stopped.

mod device;
mod error;
mod negotiation;
mod peer;
pub mod rtc;

pub use device::{
    LocalStream, MediaConstraints, MediaDevices, MediaSample, MediaTrack, NoDevices, RemoteStream,
    TrackFeed, TrackKind,
};
pub use error::MediaError;
pub use peer::{
    ConnectionState, IceState, MediaBackend, PeerEvent, PeerEventSink, PeerLink, SessionEvent,
};
pub use rtc::RtcBackend;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::events::{EventQueue, UiEvent};
use crate::protocol::{IceCandidate, SignalMessage};
use crate::transport::SignalTransport;

#[derive(Debug, Clone)]
pub struct MediaSessionState {
    pub local_stream: Option<LocalStream>,
    pub remote_stream: Option<RemoteStream>,
    pub is_initiator: bool,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub connection_state: ConnectionState,
    pub remote_video_enabled: bool,
}

impl Default for MediaSessionState {
    fn default() -> Self {
        Self {
            local_stream: None,
            remote_stream: None,
            is_initiator: false,
            video_enabled: true,
            audio_enabled: true,
            connection_state: ConnectionState::New,
            remote_video_enabled: true,
        }
    }
}

/// Comparable view of a [`MediaSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSnapshot {
    pub local_stream_id: Option<String>,
    pub remote_stream: Option<RemoteStream>,
    pub has_peer_connection: bool,
    pub is_initiator: bool,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub connection_state: ConnectionState,
    pub remote_video_enabled: bool,
    pub pending_candidates: usize,
}

pub struct MediaSession {
    backend: Arc<dyn MediaBackend>,
    config: MediaConfig,
    ui: EventQueue,
    peer_tx: mpsc::UnboundedSender<SessionEvent>,
    transport: Option<Arc<dyn SignalTransport>>,

    session: u64,
    state: MediaSessionState,
    peer: Option<Arc<dyn PeerLink>>,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    ice_restarted: bool,
}

impl MediaSession {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        config: MediaConfig,
        ui: EventQueue,
        peer_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            backend,
            config,
            ui,
            peer_tx,
            transport: None,
            session: 0,
            state: MediaSessionState::default(),
            peer: None,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            ice_restarted: false,
        }
    }

    /// Signal over `transport` from now on. A reconnected chat socket is
    /// attached the same way; the peer connection is left alone.
    pub fn attach_transport(&mut self, transport: Arc<dyn SignalTransport>) {
        self.transport = Some(transport);
    }

    pub fn detach_transport(&mut self) {
        self.transport = None;
    }

    pub fn is_active(&self) -> bool {
        self.peer.is_some() || self.state.local_stream.is_some()
    }

    pub fn is_initiator(&self) -> bool {
        self.state.is_initiator
    }

    pub fn state(&self) -> &MediaSessionState {
        &self.state
    }

    pub fn snapshot(&self) -> MediaSnapshot {
        MediaSnapshot {
            local_stream_id: self.state.local_stream.as_ref().map(|s| s.id().to_string()),
            remote_stream: self.state.remote_stream.clone(),
            has_peer_connection: self.peer.is_some(),
            is_initiator: self.state.is_initiator,
            video_enabled: self.state.video_enabled,
            audio_enabled: self.state.audio_enabled,
            connection_state: self.state.connection_state,
            remote_video_enabled: self.state.remote_video_enabled,
            pending_candidates: self.pending_candidates.len(),
        }
    }

    /// Acquire camera and microphone, open a peer connection and attach the
    /// local tracks. The initiator sends a single `video_offer`.
    ///
    /// Any previous session is stopped first. Acquisition failures are
    /// reported as [`UiEvent::MediaError`] and returned.
    pub async fn start_video(&mut self, is_initiator: bool) -> std::result::Result<(), MediaError> {
        self.stop_video().await;

        self.session += 1;
        let session = self.session;
        tracing::info!(session, is_initiator, "Starting video session");

        let constraints = MediaConstraints::from(&self.config);
        let stream = match self.backend.get_user_media(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, kind = e.name(), "Could not acquire camera/microphone");
                self.ui.push(UiEvent::MediaError(e.clone()));
                return Err(e);
            }
        };

        self.state.video_enabled = stream
            .track(TrackKind::Video)
            .map(|t| t.is_enabled())
            .unwrap_or(false);
        self.state.audio_enabled = stream
            .track(TrackKind::Audio)
            .map(|t| t.is_enabled())
            .unwrap_or(false);
        self.state.local_stream = Some(stream.clone());
        self.state.is_initiator = is_initiator;
        self.ui.push(UiEvent::LocalStreamStarted);

        let sink = PeerEventSink::new(session, self.peer_tx.clone());
        let peer = match self.backend.create_peer(&self.config.ice_servers, sink).await {
            Ok(peer) => peer,
            Err(e) => return self.abort_start(e.to_string()).await,
        };
        self.peer = Some(Arc::clone(&peer));

        if let Err(e) = peer.add_local_stream(&stream).await {
            return self.abort_start(e.to_string()).await;
        }

        if is_initiator {
            if let Err(e) = self.send_offer(false).await {
                return self.abort_start(e.to_string()).await;
            }
        }

        Ok(())
    }

    async fn abort_start(&mut self, detail: String) -> std::result::Result<(), MediaError> {
        tracing::error!(error = %detail, "Video session failed to start");
        self.teardown().await;
        let err = MediaError::StartFailed(detail);
        self.ui.push(UiEvent::MediaError(err.clone()));
        Err(err)
    }

    /// Flip the local video track and tell the partner. Returns the new
    /// state, or `None` without a video track.
    pub fn toggle_video(&mut self) -> Option<bool> {
        let track = self
            .state
            .local_stream
            .as_ref()
            .and_then(|s| s.track(TrackKind::Video))?;

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        self.state.video_enabled = enabled;

        self.signal(SignalMessage::VideoToggle { enabled });
        self.ui.push(UiEvent::LocalVideoToggled { enabled });
        Some(enabled)
    }

    /// Flip the local audio track. The partner is not told.
    pub fn toggle_audio(&mut self) -> Option<bool> {
        let track = self
            .state
            .local_stream
            .as_ref()
            .and_then(|s| s.track(TrackKind::Audio))?;

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        self.state.audio_enabled = enabled;

        self.ui.push(UiEvent::LocalAudioToggled { enabled });
        Some(enabled)
    }

    /// Stop every track, close the peer connection and reset the flags.
    /// Calling it without an active session does nothing.
    pub async fn stop_video(&mut self) {
        if !self.is_active() {
            return;
        }
        tracing::info!(session = self.session, "Stopping video session");
        self.teardown().await;
        self.ui.push(UiEvent::MediaStopped);
    }

    async fn teardown(&mut self) {
        // Late callbacks from the old connection must not match.
        self.session += 1;

        if let Some(stream) = self.state.local_stream.take() {
            stream.stop_all();
        }
        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                tracing::warn!(error = %e, "Error closing peer connection");
            }
        }

        self.state = MediaSessionState::default();
        self.remote_description_set = false;
        self.pending_candidates.clear();
        self.ice_restarted = false;
    }

    /// The chat socket came back. The initiator renegotiates with an ICE
    /// restart so the existing media can recover.
    pub async fn transport_reconnected(&mut self) {
        if self.peer.is_none() || !self.state.is_initiator {
            return;
        }
        tracing::info!(session = self.session, "Restarting ICE after signaling reconnect");
        if let Err(e) = self.send_offer(true).await {
            tracing::warn!(error = %e, "ICE restart offer failed");
        }
    }

    /// Offer again when no answer has been applied yet, for a partner
    /// that announced itself after our first offer.
    pub async fn offer_if_unanswered(&mut self) {
        if self.peer.is_none() || !self.state.is_initiator || self.remote_description_set {
            return;
        }
        if let Err(e) = self.send_offer(false).await {
            tracing::warn!(error = %e, "Repeat offer failed");
        }
    }

    async fn send_offer(&mut self, ice_restart: bool) -> Result<()> {
        let Some(peer) = self.peer.clone() else {
            return Ok(());
        };
        let offer = peer.create_offer(ice_restart).await?;
        peer.set_local_description(offer.clone()).await?;
        self.signal(SignalMessage::VideoOffer { offer });
        Ok(())
    }

    fn signal(&self, message: SignalMessage) -> bool {
        match &self.transport {
            Some(transport) => transport.send(&message),
            None => {
                tracing::warn!(kind = message.kind(), "No signaling channel, dropping message");
                false
            }
        }
    }
}
