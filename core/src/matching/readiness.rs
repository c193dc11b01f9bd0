//! `ready` handshake on the chat socket.
//!
//! Each side announces a per-conversation token when its chat socket opens.
//! Once both tokens are known the side with the lower token creates the
//! offer, so both peers agree on the initiator without a fixed delay.

use crate::protocol::SignalMessage;

/// True when `local` should create the offer. Without the partner's token
/// the role is a coin flip.
pub fn elect_initiator(local: &str, remote: Option<&str>) -> bool {
    match remote {
        Some(remote) => local < remote,
        None => rand::random(),
    }
}

#[derive(Debug, Clone)]
pub struct ReadyGate {
    local_id: String,
    remote_id: Option<String>,
    acknowledged: Option<String>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(local_id: String) -> Self {
        Self {
            local_id,
            remote_id: None,
            acknowledged: None,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn announcement(&self) -> SignalMessage {
        SignalMessage::Ready {
            peer_id: self.local_id.clone(),
        }
    }

    /// Record the partner's `ready`. Returns true when it has not been
    /// answered yet and our own `ready` should be sent back.
    pub fn remote_ready(&mut self, peer_id: &str) -> bool {
        self.remote_id = Some(peer_id.to_string());
        if self.acknowledged.as_deref() == Some(peer_id) {
            return false;
        }
        self.acknowledged = Some(peer_id.to_string());
        true
    }

    pub fn is_initiator(&self) -> bool {
        elect_initiator(&self.local_id, self.remote_id.as_deref())
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}
