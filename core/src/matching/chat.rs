//! Chat socket handling: messages, partner presence, the video readiness
//! handshake and reconnects.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{chat_ws_path, MatchingController, MatchingState, ReadyGate, TimerEvent};
use crate::events::UiEvent;
use crate::models::{ChatLine, ChatMode, ChatSender};
use crate::protocol::SignalMessage;
use crate::transport::TransportEvent;

impl MatchingController {
    pub(super) async fn open_chat(&mut self) {
        let Some(conversation_id) = self.conversation.as_ref().map(|c| c.conversation_id.clone()) else {
            return;
        };

        self.chat_generation += 1;
        let url = self.config.ws_url(&chat_ws_path(&conversation_id));

        match self.connector.connect(&url).await {
            Ok((transport, events)) => {
                self.media.attach_transport(transport.clone());
                self.chat = Some(transport);
                self.chat_rx = Some(events);
            }
            Err(e) => {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "Could not open chat socket");
                self.schedule_reconnect().await;
            }
        }
    }

    pub(super) async fn handle_chat_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.chat_open().await,
            TransportEvent::Message(message) => self.chat_message(message).await,
            TransportEvent::Error(e) => tracing::warn!(error = %e, "Chat socket error"),
            TransportEvent::Closed => self.chat_closed().await,
        }
    }

    async fn chat_open(&mut self) {
        let reconnected = self.chat_opened;
        self.chat_opened = true;
        self.backoff.reset();

        if reconnected {
            tracing::info!("Chat socket reconnected");
            self.ui.push(UiEvent::Notice("Reconnected".to_string()));
            self.media.transport_reconnected().await;
        } else {
            self.ui.push(UiEvent::ChatConnected);
            self.ui.push(UiEvent::ConnectionRequestControl { enabled: true });
        }

        if self.preferences.chat_mode == ChatMode::Video && !self.partner_left {
            if self.ready.is_none() {
                self.ready = Some(ReadyGate::new());
            }
            self.announce_ready();
            if !self.media.is_active() {
                self.schedule_ready_grace(1);
            }
        }
    }

    async fn chat_closed(&mut self) {
        tracing::info!("Chat socket closed");
        self.chat = None;
        self.chat_rx = None;
        self.media.detach_transport();

        if self.state != MatchingState::Chat || self.partner_left {
            return;
        }
        self.schedule_reconnect().await;
    }

    async fn schedule_reconnect(&mut self) {
        match self.backoff.next_delay() {
            Some((attempt, delay)) => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling chat reconnect");
                self.schedule(
                    delay,
                    TimerEvent::Reconnect {
                        generation: self.chat_generation,
                        attempt,
                    },
                );
            }
            None => {
                tracing::error!(
                    attempts = self.backoff.attempts(),
                    "Chat socket lost, giving up"
                );
                self.media.stop_video().await;
                self.ui.push(UiEvent::ChatConnectionLost);
            }
        }
    }

    async fn chat_message(&mut self, message: SignalMessage) {
        match message {
            SignalMessage::Init {
                other_user_id,
                other_user_username,
            } => {
                if let Some(conversation) = self.conversation.as_mut() {
                    conversation.other_user_id = Some(other_user_id);
                    conversation.other_user_username = Some(other_user_username.clone());
                }
                self.ui.push(UiEvent::PartnerIdentified {
                    username: other_user_username,
                });
            }
            SignalMessage::Message {
                content,
                sender_id,
                timestamp,
            } => self.partner_message(content, sender_id, timestamp),
            SignalMessage::PartnerConnected { message } => {
                self.ui.push(UiEvent::PartnerConnected { message });
            }
            SignalMessage::PartnerLeft { message } => self.partner_gone(message).await,
            SignalMessage::ConnectionRequest { request_id } => {
                self.follow.incoming = Some(request_id.clone());
                self.ui.push(UiEvent::ConnectionRequested { request_id });
            }
            SignalMessage::ConnectionAccepted { message } => {
                self.follow.outgoing_pending = false;
                if !message.is_empty() {
                    self.ui.push(UiEvent::Notice(message));
                }
                self.ui.push(UiEvent::ConnectionAccepted);
            }
            SignalMessage::ConnectionRejected { message } => {
                self.follow.outgoing_pending = false;
                if !message.is_empty() {
                    self.ui.push(UiEvent::Notice(message));
                }
                self.ui.push(UiEvent::ConnectionRejected);
                self.ui.push(UiEvent::ConnectionRequestControl { enabled: true });
            }
            SignalMessage::Error { message } => {
                tracing::warn!(error = %message, "Server reported an error");
                self.ui.push(UiEvent::Notice(message));
            }
            SignalMessage::Ready { peer_id } => self.remote_ready(&peer_id).await,
            signal if signal.is_video_signal() => self.video_signal(signal).await,
            other => tracing::debug!(kind = other.kind(), "Ignoring chat message"),
        }
    }

    fn partner_message(&mut self, content: String, sender_id: Option<String>, timestamp: Option<String>) {
        let partner_id = self.conversation.as_ref().and_then(|c| c.other_user_id.as_deref());
        // The server echoes our own lines back; they are already shown.
        if let (Some(sender), Some(partner)) = (sender_id.as_deref(), partner_id) {
            if sender != partner {
                return;
            }
        }

        let mut line = ChatLine::new(ChatSender::Partner, &content);
        if let Some(ts) = timestamp.as_deref().and_then(parse_timestamp) {
            line.timestamp = ts;
        }
        self.transcript.push(line.clone());
        self.ui.push(UiEvent::ChatMessage(line));
    }

    async fn partner_gone(&mut self, message: String) {
        tracing::info!("Partner left the conversation");
        self.partner_left = true;
        self.ready = None;
        self.follow.reset();
        self.media.stop_video().await;
        self.ui.push(UiEvent::ConnectionRequestControl { enabled: false });
        self.ui.push(UiEvent::PartnerLeft { message });
    }

    async fn video_signal(&mut self, signal: SignalMessage) {
        if self.preferences.chat_mode != ChatMode::Video || self.partner_left {
            tracing::debug!(kind = signal.kind(), "Ignoring video signal");
            return;
        }

        // The partner already decided it is the initiator.
        if matches!(signal, SignalMessage::VideoOffer { .. }) && !self.media.is_active() {
            if self.media.start_video(false).await.is_err() {
                return;
            }
        }

        self.media.handle_signal(&signal).await;
    }

    // ========================================================================
    // Readiness handshake
    // ========================================================================

    fn announce_ready(&self) {
        let (Some(gate), Some(chat)) = (&self.ready, &self.chat) else {
            return;
        };
        chat.send(&gate.announcement());
    }

    fn schedule_ready_grace(&self, attempt: u32) {
        self.schedule(
            Duration::from_millis(self.config.matching.ready_grace_ms),
            TimerEvent::ReadyGrace {
                generation: self.chat_generation,
                attempt,
            },
        );
    }

    async fn remote_ready(&mut self, peer_id: &str) {
        if self.preferences.chat_mode != ChatMode::Video || self.partner_left {
            return;
        }

        let gate = self.ready.get_or_insert_with(ReadyGate::new);
        let reply = gate.remote_ready(peer_id);
        let initiator = gate.is_initiator();
        if reply {
            self.announce_ready();
        }

        tracing::info!(initiator, "Partner ready for video");
        if !self.media.is_active() || self.media.is_initiator() != initiator {
            // Also corrects a role picked by coin flip before the partner
            // showed up.
            let _ = self.media.start_video(initiator).await;
        } else if reply && initiator {
            self.media.offer_if_unanswered().await;
        }
    }

    pub(super) async fn ready_grace_elapsed(&mut self, attempt: u32) {
        if self.state != MatchingState::Chat || self.partner_left || self.media.is_active() {
            return;
        }
        let Some(gate) = &self.ready else {
            return;
        };
        if gate.remote_id().is_some() {
            return;
        }

        if attempt < self.config.matching.ready_retries {
            tracing::debug!(attempt, "Partner not ready yet, announcing again");
            self.announce_ready();
            self.schedule_ready_grace(attempt + 1);
            return;
        }

        let initiator = gate.is_initiator();
        tracing::warn!(initiator, "No ready from partner, starting video anyway");
        let _ = self.media.start_video(initiator).await;
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
