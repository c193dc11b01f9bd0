//! Peer connection seam between [`super::MediaSession`] and a WebRTC stack.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::device::{LocalStream, MediaConstraints, TrackKind};
use super::MediaError;
use crate::error::Result;
use crate::protocol::{IceCandidate, SessionDescription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Locally gathered candidate to relay to the partner.
    LocalCandidate(IceCandidate),
    IceState(IceState),
    ConnectionState(ConnectionState),
    RemoteTrack { kind: TrackKind, stream_id: String },
}

/// A [`PeerEvent`] tagged with the media session it belongs to, so events
/// from a torn-down connection can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: u64,
    pub event: PeerEvent,
}

#[derive(Debug, Clone)]
pub struct PeerEventSink {
    session: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl PeerEventSink {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(SessionEvent {
            session: self.session,
            event,
        });
    }
}

#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn add_local_stream(&self, stream: &LocalStream) -> Result<()>;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Capture devices plus a peer connection factory.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> std::result::Result<LocalStream, MediaError>;

    async fn create_peer(&self, ice_servers: &[String], events: PeerEventSink) -> Result<Arc<dyn PeerLink>>;
}
