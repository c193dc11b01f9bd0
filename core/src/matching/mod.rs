//! Matchmaking and chat state machine.
//!
//! ```text
//! Preferences --start_matching--> Waiting --match_found--> Chat
//!      ^   \______________matched______________________/   |
//!      |                                                    |
//!      +------------- stop_matching / leave_chat / rematch -+
//! ```
//!
//! The controller owns both sockets and the [`MediaSession`]. All input
//! (socket events, peer connection callbacks, timers) is funnelled through
//! [`MatchingController::next_inbound`] and applied one event at a time by
//! [`MatchingController::handle`].

mod chat;
mod follow;
mod readiness;
mod reconnect;

pub use follow::FollowState;
pub use readiness::{elect_initiator, ReadyGate};
pub use reconnect::Backoff;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::MatchingApi;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::{EventQueue, UiEvent};
use crate::media::{MediaBackend, MediaSession, SessionEvent};
use crate::models::{
    ChatLine, ChatMode, ChatSender, Conversation, MatchingPreferences, QueueState, ReportRequest,
    ReportType, StartMatchingResponse,
};
use crate::protocol::SignalMessage;
use crate::report::{capture_evidence, FrameGrabber};
use crate::storage::PreferenceStore;
use crate::transport::{SignalConnector, SignalTransport, TransportEvent, TransportEvents};

pub const MATCHING_WS_PATH: &str = "/ws/matching/";

pub fn chat_ws_path(conversation_id: &str) -> String {
    format!("/ws/anonymous-chat/{}/", conversation_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingState {
    Preferences,
    Waiting(QueueState),
    Chat,
}

/// Everything the controller talks to.
#[derive(Clone)]
pub struct ControllerDeps {
    pub api: Arc<dyn MatchingApi>,
    pub connector: Arc<dyn SignalConnector>,
    pub media: Arc<dyn MediaBackend>,
    pub frames: Arc<dyn FrameGrabber>,
    pub store: Arc<PreferenceStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    ReadyGrace { generation: u64, attempt: u32 },
    Reconnect { generation: u64, attempt: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Matching(TransportEvent),
    Chat(TransportEvent),
    Peer(SessionEvent),
    Timer(TimerEvent),
}

pub struct MatchingController {
    config: ClientConfig,
    api: Arc<dyn MatchingApi>,
    connector: Arc<dyn SignalConnector>,
    frames: Arc<dyn FrameGrabber>,
    store: Arc<PreferenceStore>,
    ui: EventQueue,
    media: MediaSession,

    state: MatchingState,
    preferences: MatchingPreferences,
    conversation: Option<Conversation>,
    transcript: Vec<ChatLine>,
    follow: FollowState,
    partner_left: bool,
    ready: Option<ReadyGate>,

    matching: Option<Arc<dyn SignalTransport>>,
    matching_rx: Option<TransportEvents>,
    chat: Option<Arc<dyn SignalTransport>>,
    chat_rx: Option<TransportEvents>,
    /// Bumped for every chat socket; stale timers compare against it.
    chat_generation: u64,
    chat_opened: bool,
    backoff: Backoff,

    peer_rx: mpsc::UnboundedReceiver<SessionEvent>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl MatchingController {
    pub fn new(config: ClientConfig, deps: ControllerDeps) -> Self {
        let ui = EventQueue::new();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let media = MediaSession::new(deps.media, config.media.clone(), ui.clone(), peer_tx);
        let preferences = deps.store.load_preferences();
        let backoff = Backoff::new(
            Duration::from_millis(config.matching.reconnect_base_ms),
            config.matching.reconnect_max_attempts,
        );

        Self {
            config,
            api: deps.api,
            connector: deps.connector,
            frames: deps.frames,
            store: deps.store,
            ui,
            media,
            state: MatchingState::Preferences,
            preferences,
            conversation: None,
            transcript: Vec::new(),
            follow: FollowState::default(),
            partner_left: false,
            ready: None,
            matching: None,
            matching_rx: None,
            chat: None,
            chat_rx: None,
            chat_generation: 0,
            chat_opened: false,
            backoff,
            peer_rx,
            timer_tx,
            timer_rx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> MatchingState {
        self.state
    }

    pub fn preferences(&self) -> &MatchingPreferences {
        &self.preferences
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn transcript(&self) -> &[ChatLine] {
        &self.transcript
    }

    pub fn follow(&self) -> &FollowState {
        &self.follow
    }

    pub fn media(&self) -> &MediaSession {
        &self.media
    }

    /// The partner left; offer a new match.
    pub fn can_rematch(&self) -> bool {
        self.state == MatchingState::Chat && self.partner_left
    }

    pub fn is_chat_connected(&self) -> bool {
        self.chat.as_ref().map(|t| t.is_connected()).unwrap_or(false)
    }

    pub fn poll_events(&self) -> Vec<UiEvent> {
        self.ui.drain()
    }

    pub fn events(&self) -> EventQueue {
        self.ui.clone()
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Wait for the next input.
    pub async fn next_inbound(&mut self) -> Inbound {
        tokio::select! {
            Some(event) = recv_transport(&mut self.chat_rx) => Inbound::Chat(event),
            Some(event) = recv_transport(&mut self.matching_rx) => Inbound::Matching(event),
            Some(event) = self.peer_rx.recv() => Inbound::Peer(event),
            Some(event) = self.timer_rx.recv() => Inbound::Timer(event),
        }
    }

    /// Next input that is already queued, if any.
    pub fn try_next_inbound(&mut self) -> Option<Inbound> {
        if let Some(event) = self.chat_rx.as_mut().and_then(|rx| rx.try_recv().ok()) {
            return Some(Inbound::Chat(event));
        }
        if let Some(event) = self.matching_rx.as_mut().and_then(|rx| rx.try_recv().ok()) {
            return Some(Inbound::Matching(event));
        }
        if let Ok(event) = self.peer_rx.try_recv() {
            return Some(Inbound::Peer(event));
        }
        if let Ok(event) = self.timer_rx.try_recv() {
            return Some(Inbound::Timer(event));
        }
        None
    }

    /// Handle everything already queued. Returns the number of inputs
    /// processed.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(inbound) = self.try_next_inbound() {
            self.handle(inbound).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Matching(event) => self.handle_matching_event(event).await,
            Inbound::Chat(event) => self.handle_chat_event(event).await,
            Inbound::Peer(event) => self.media.handle_peer_event(event).await,
            Inbound::Timer(event) => self.handle_timer(event).await,
        }
    }

    async fn handle_matching_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => tracing::debug!("Matching socket open"),
            TransportEvent::Message(SignalMessage::QueueUpdate {
                position,
                queue_size,
            }) => {
                if let MatchingState::Waiting(_) = self.state {
                    let queue = QueueState {
                        position,
                        queue_size,
                    };
                    self.state = MatchingState::Waiting(queue);
                    self.ui.push(UiEvent::QueueUpdated(queue));
                }
            }
            TransportEvent::Message(SignalMessage::MatchFound { conversation_id }) => {
                if let MatchingState::Waiting(_) = self.state {
                    self.enter_chat(&conversation_id).await;
                } else {
                    tracing::debug!(conversation_id = %conversation_id, "Ignoring match_found outside the queue");
                }
            }
            TransportEvent::Message(other) => {
                tracing::debug!(kind = other.kind(), "Unexpected message on matching socket");
            }
            TransportEvent::Error(e) => tracing::warn!(error = %e, "Matching socket error"),
            TransportEvent::Closed => {
                tracing::info!("Matching socket closed");
                self.matching = None;
                self.matching_rx = None;
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::ReadyGrace {
                generation,
                attempt,
            } if generation == self.chat_generation => self.ready_grace_elapsed(attempt).await,
            TimerEvent::Reconnect {
                generation,
                attempt,
            } if generation == self.chat_generation => {
                if self.state == MatchingState::Chat && self.chat.is_none() {
                    tracing::info!(attempt, "Reconnecting chat socket");
                    self.open_chat().await;
                }
            }
            stale => tracing::debug!(?stale, "Dropping stale timer"),
        }
    }

    fn schedule(&self, delay: Duration, event: TimerEvent) {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    // ========================================================================
    // Preferences / queue
    // ========================================================================

    pub fn set_preferences(&mut self, preferences: MatchingPreferences) -> Result<()> {
        self.store.save_preferences(&preferences)?;
        self.preferences = preferences;
        Ok(())
    }

    /// Ask the server for a partner. Ends in `Chat` right away or in
    /// `Waiting` with the matching socket open.
    pub async fn start_matching(&mut self) -> Result<()> {
        if self.state != MatchingState::Preferences {
            return Err(Error::InvalidState("already matching".to_string()));
        }

        if let Err(e) = self.store.save_preferences(&self.preferences) {
            tracing::warn!(error = %e, "Failed to persist preferences");
        }

        tracing::info!(
            gender = self.preferences.preferred_gender.as_str(),
            country = %self.preferences.preferred_country,
            mode = self.preferences.chat_mode.as_str(),
            "Starting matching"
        );
        self.ui.push(UiEvent::Searching);

        let response = match self.api.start_matching(&self.preferences).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Start matching failed");
                self.ui.push(UiEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        match response {
            StartMatchingResponse::Matched { conversation_id } => {
                self.enter_chat(&conversation_id).await;
            }
            StartMatchingResponse::Queued {
                position,
                queue_size,
            } => {
                let queue = QueueState {
                    position,
                    queue_size,
                };
                self.state = MatchingState::Waiting(queue);
                self.ui.push(UiEvent::QueueUpdated(queue));
                self.open_matching().await;
            }
        }

        Ok(())
    }

    async fn open_matching(&mut self) {
        let url = self.config.ws_url(MATCHING_WS_PATH);
        match self.connector.connect(&url).await {
            Ok((transport, events)) => {
                self.matching = Some(transport);
                self.matching_rx = Some(events);
            }
            Err(e) => {
                // Still queued server side; the socket only speeds things up.
                tracing::error!(error = %e, "Could not open matching socket");
                self.ui.push(UiEvent::Error(e.to_string()));
            }
        }
    }

    fn close_matching(&mut self) {
        if let Some(transport) = self.matching.take() {
            transport.close();
        }
        self.matching_rx = None;
    }

    pub async fn stop_matching(&mut self) -> Result<()> {
        if !matches!(self.state, MatchingState::Waiting(_)) {
            return Err(Error::InvalidState("not in the queue".to_string()));
        }

        if let Err(e) = self.api.stop_matching().await {
            tracing::warn!(error = %e, "Stop matching request failed");
            self.ui.push(UiEvent::Error(e.to_string()));
        }

        self.close_matching();
        self.state = MatchingState::Preferences;
        self.ui.push(UiEvent::MatchingStopped);
        Ok(())
    }

    async fn enter_chat(&mut self, conversation_id: &str) {
        tracing::info!(conversation_id, "Matched");
        self.close_matching();

        self.conversation = Some(Conversation::new(conversation_id));
        self.transcript.clear();
        self.follow.reset();
        self.partner_left = false;
        self.ready = None;
        self.chat_opened = false;
        self.backoff.reset();
        self.state = MatchingState::Chat;

        self.ui.push(UiEvent::Matched {
            conversation_id: conversation_id.to_string(),
        });
        self.open_chat().await;
    }

    // ========================================================================
    // Leaving
    // ========================================================================

    pub async fn leave_chat(&mut self) -> Result<()> {
        let conversation_id = match &self.conversation {
            Some(c) => c.conversation_id.clone(),
            None => return Err(Error::NoConversation),
        };

        if let Err(e) = self.api.leave_conversation(&conversation_id).await {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "Leave request failed");
        }

        self.end_chat(true).await;
        self.ui.push(UiEvent::ChatLeft);
        Ok(())
    }

    /// Drop a conversation the partner already left and go back to
    /// `Preferences`. The chat socket is not closed from our side; the
    /// server closes it with the conversation.
    pub async fn rematch(&mut self) -> Result<()> {
        if self.state != MatchingState::Chat {
            return Err(Error::InvalidState("not in a chat".to_string()));
        }
        if !self.partner_left {
            return Err(Error::InvalidState(
                "partner is still in the chat, leave first".to_string(),
            ));
        }

        self.end_chat(false).await;
        self.ui.push(UiEvent::RematchReady);
        Ok(())
    }

    async fn end_chat(&mut self, close_socket: bool) {
        self.media.stop_video().await;
        self.media.detach_transport();
        if close_socket {
            self.close_chat();
        } else {
            self.chat = None;
            self.chat_rx = None;
        }

        // Invalidate pending reconnect and grace timers.
        self.chat_generation += 1;
        self.conversation = None;
        self.transcript.clear();
        self.follow.reset();
        self.partner_left = false;
        self.ready = None;
        self.chat_opened = false;
        self.backoff.reset();
        self.state = MatchingState::Preferences;
    }

    fn close_chat(&mut self) {
        if let Some(transport) = self.chat.take() {
            transport.close();
        }
        self.chat_rx = None;
    }

    /// Close everything, e.g. before exiting.
    pub async fn shutdown(&mut self) {
        self.media.stop_video().await;
        self.close_matching();
        self.close_chat();
        self.chat_generation += 1;
    }

    // ========================================================================
    // Chat
    // ========================================================================

    pub fn send_message(&mut self, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("empty message".to_string()));
        }

        let transport = match &self.chat {
            Some(t) if t.is_connected() => t,
            _ => {
                tracing::warn!("Chat socket not open, message not sent");
                self.ui.push(UiEvent::Error(Error::NotConnected.to_string()));
                return Err(Error::NotConnected);
            }
        };

        if !transport.send(&SignalMessage::chat(content)) {
            self.ui.push(UiEvent::Error(Error::NotConnected.to_string()));
            return Err(Error::NotConnected);
        }

        let line = ChatLine::new(ChatSender::Me, content);
        self.transcript.push(line.clone());
        self.ui.push(UiEvent::ChatMessage(line));
        Ok(())
    }

    // ========================================================================
    // Follow requests
    // ========================================================================

    pub async fn send_connection_request(&mut self) -> Result<()> {
        let conversation_id = match &self.conversation {
            Some(c) => c.conversation_id.clone(),
            None => return Err(Error::NoConversation),
        };
        if !self.follow.can_request() {
            return Err(Error::InvalidState("connection request already pending".to_string()));
        }

        self.follow.outgoing_pending = true;
        self.ui.push(UiEvent::ConnectionRequestControl { enabled: false });

        match self.api.send_connection_request(&conversation_id).await {
            Ok(notice) => {
                if !notice.message.is_empty() {
                    self.ui.push(UiEvent::Notice(notice.message));
                }
                Ok(())
            }
            Err(Error::Rejected(reason)) => {
                tracing::info!(reason = %reason, "Connection request refused");
                self.follow.outgoing_pending = false;
                self.ui.push(UiEvent::Notice(reason));
                self.ui.push(UiEvent::ConnectionRequestControl { enabled: true });
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Connection request failed");
                self.follow.outgoing_pending = false;
                self.ui.push(UiEvent::Error(e.to_string()));
                self.ui.push(UiEvent::ConnectionRequestControl { enabled: true });
                Err(e)
            }
        }
    }

    pub async fn respond_to_connection_request(&mut self, accept: bool) -> Result<()> {
        let Some(request_id) = self.follow.incoming.clone() else {
            self.ui.push(UiEvent::Notice("No pending connection request".to_string()));
            return Ok(());
        };

        match self.api.respond_connection_request(&request_id, accept).await {
            Ok(notice) => {
                self.follow.incoming = None;
                if !notice.message.is_empty() {
                    self.ui.push(UiEvent::Notice(notice.message));
                }
                self.ui.push(UiEvent::ConnectionResponded { accepted: accept });
                Ok(())
            }
            Err(Error::Rejected(reason)) => {
                self.follow.incoming = None;
                self.ui.push(UiEvent::Notice(reason));
                Ok(())
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Responding to connection request failed");
                self.ui.push(UiEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    // ========================================================================
    // Media
    // ========================================================================

    pub fn toggle_video(&mut self) -> Option<bool> {
        self.media.toggle_video()
    }

    pub fn toggle_audio(&mut self) -> Option<bool> {
        self.media.toggle_audio()
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// File a report against the current partner. During a video session a
    /// frame of their video is attached when one can be captured. Returns
    /// whether evidence was attached.
    pub async fn report(&mut self, report_type: ReportType, description: &str) -> Result<bool> {
        let conversation = self.conversation.as_ref().ok_or(Error::NoConversation)?;
        let reported_user = conversation
            .other_user_id
            .clone()
            .ok_or_else(|| Error::InvalidState("partner not identified yet".to_string()))?;
        let conversation_id = conversation.conversation_id.clone();

        let video_frame = if self.preferences.chat_mode == ChatMode::Video && self.media.is_active() {
            capture_evidence(
                self.frames.as_ref(),
                self.config.report.capture_attempts,
                Duration::from_millis(self.config.report.capture_interval_ms),
            )
            .await
        } else {
            None
        };
        let with_evidence = video_frame.is_some();

        let request = ReportRequest {
            reported_user,
            conversation: conversation_id,
            report_type,
            description: description.trim().to_string(),
            video_frame,
        };

        if let Err(e) = self.api.submit_report(request).await {
            tracing::error!(error = %e, "Report submission failed");
            self.ui.push(UiEvent::Error(e.to_string()));
            return Err(e);
        }

        tracing::info!(report_type = report_type.as_str(), with_evidence, "Report submitted");
        self.ui.push(UiEvent::ReportSubmitted { with_evidence });
        Ok(with_evidence)
    }
}

async fn recv_transport(rx: &mut Option<TransportEvents>) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
