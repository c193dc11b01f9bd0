//! Offer/answer and trickle ICE over the chat socket.

use std::sync::Arc;

use super::{MediaSession, PeerEvent, PeerLink, RemoteStream, SessionEvent};
use crate::error::Result;
use crate::events::UiEvent;
use crate::media::IceState;
use crate::protocol::{IceCandidate, SessionDescription, SignalMessage};

impl MediaSession {
    /// Apply a video signal received from the partner. Failures are logged;
    /// a broken negotiation shows up later as an ICE failure.
    pub async fn handle_signal(&mut self, message: &SignalMessage) {
        match message {
            SignalMessage::VideoOffer { offer } => {
                if let Err(e) = self.accept_offer(offer.clone()).await {
                    tracing::error!(error = %e, "Failed to answer video offer");
                }
            }
            SignalMessage::VideoAnswer { answer } => {
                if let Err(e) = self.accept_answer(answer.clone()).await {
                    tracing::error!(error = %e, "Failed to apply video answer");
                }
            }
            SignalMessage::IceCandidate { candidate } => {
                self.add_remote_candidate(candidate.clone()).await;
            }
            SignalMessage::VideoToggle { enabled } => {
                self.state.remote_video_enabled = *enabled;
                self.ui.push(UiEvent::RemoteVideoToggled { enabled: *enabled });
            }
            other => {
                tracing::debug!(kind = other.kind(), "Not a video signal");
            }
        }
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<()> {
        let Some(peer) = self.peer.clone() else {
            tracing::warn!("Video offer without a peer connection");
            return Ok(());
        };

        peer.set_remote_description(offer).await?;
        self.remote_description_set = true;
        self.flush_candidates(&peer).await;

        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        self.signal(SignalMessage::VideoAnswer { answer });
        Ok(())
    }

    async fn accept_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let Some(peer) = self.peer.clone() else {
            tracing::warn!("Video answer without a peer connection");
            return Ok(());
        };

        peer.set_remote_description(answer).await?;
        self.remote_description_set = true;
        self.flush_candidates(&peer).await;
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(peer) = self.peer.clone() else {
            tracing::debug!("ICE candidate without a peer connection, dropping");
            return;
        };

        if !self.remote_description_set {
            self.pending_candidates.push(candidate);
            return;
        }

        if let Err(e) = peer.add_ice_candidate(candidate).await {
            tracing::warn!(error = %e, "Ignoring bad ICE candidate");
        }
    }

    async fn flush_candidates(&mut self, peer: &Arc<dyn PeerLink>) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                tracing::warn!(error = %e, "Ignoring bad ICE candidate");
            }
        }
    }

    /// Apply a callback from the peer connection.
    pub async fn handle_peer_event(&mut self, event: SessionEvent) {
        if event.session != self.session || self.peer.is_none() {
            tracing::debug!(session = event.session, "Dropping event from a closed peer connection");
            return;
        }

        match event.event {
            PeerEvent::LocalCandidate(candidate) => {
                self.signal(SignalMessage::IceCandidate { candidate });
            }
            PeerEvent::IceState(IceState::Failed) => self.ice_failed().await,
            PeerEvent::IceState(state) => {
                tracing::debug!(?state, "ICE state");
            }
            PeerEvent::ConnectionState(state) => {
                self.state.connection_state = state;
                self.ui.push(UiEvent::MediaConnection(state));
            }
            PeerEvent::RemoteTrack { kind, stream_id } => {
                let remote = self.state.remote_stream.get_or_insert_with(|| RemoteStream {
                    stream_id: stream_id.clone(),
                    kinds: Vec::new(),
                });
                if !remote.kinds.contains(&kind) {
                    remote.kinds.push(kind);
                }
                self.ui.push(UiEvent::RemoteTrackAdded { kind });
            }
        }
    }

    async fn ice_failed(&mut self) {
        if self.ice_restarted {
            tracing::error!(session = self.session, "ICE failed again after restart");
            self.ui.push(UiEvent::MediaFailed);
            return;
        }

        self.ice_restarted = true;
        if !self.state.is_initiator {
            tracing::warn!("ICE failed, waiting for the initiator to restart");
            return;
        }

        tracing::warn!("ICE failed, restarting");
        if let Err(e) = self.send_offer(true).await {
            tracing::error!(error = %e, "ICE restart failed");
            self.ui.push(UiEvent::MediaFailed);
        }
    }
}
