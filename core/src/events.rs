//! Notifications for whatever is presenting the matching flow.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::media::{ConnectionState, MediaError, TrackKind};
use crate::models::{ChatLine, QueueState};

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    // Matching
    Searching,
    QueueUpdated(QueueState),
    MatchingStopped,
    Matched { conversation_id: String },

    // Chat
    ChatConnected,
    PartnerIdentified { username: String },
    PartnerConnected { message: String },
    /// The partner is gone; the rematch control should be offered.
    PartnerLeft { message: String },
    ChatMessage(ChatLine),
    ChatLeft,
    /// A finished conversation was dropped; back at the preferences.
    RematchReady,
    /// Terminal transport failure after all reconnect attempts.
    ChatConnectionLost,

    // Follow requests
    ConnectionRequestControl { enabled: bool },
    ConnectionRequested { request_id: String },
    ConnectionAccepted,
    ConnectionRejected,
    ConnectionResponded { accepted: bool },

    // Media
    LocalStreamStarted,
    LocalVideoToggled { enabled: bool },
    LocalAudioToggled { enabled: bool },
    RemoteTrackAdded { kind: TrackKind },
    RemoteVideoToggled { enabled: bool },
    MediaConnection(ConnectionState),
    MediaStopped,
    MediaError(MediaError),
    /// The peer connection failed again after the ICE restart.
    MediaFailed,

    ReportSubmitted { with_evidence: bool },

    Notice(String),
    Error(String),
}

/// Queue of pending [`UiEvent`]s, drained by the presenter.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<UiEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: UiEvent) {
        self.inner.lock().push_back(event);
    }

    pub fn drain(&self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        let mut queue = self.inner.lock();
        while let Some(event) = queue.pop_front() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
