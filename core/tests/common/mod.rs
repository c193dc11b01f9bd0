//! Test doubles for the controller's dependencies.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use lingomatch_core::api::MatchingApi;
use lingomatch_core::config::ClientConfig;
use lingomatch_core::error::{Error, Result};
use lingomatch_core::matching::{ControllerDeps, MatchingController};
use lingomatch_core::media::{
    LocalStream, MediaBackend, MediaConstraints, MediaError, MediaTrack, PeerEvent, PeerEventSink,
    PeerLink, TrackKind,
};
use lingomatch_core::models::{
    ApiNotice, ChatMode, Gender, MatchingPreferences, ReportType, StartMatchingResponse,
};
use lingomatch_core::protocol::{IceCandidate, SdpKind, SessionDescription, SignalMessage};
use lingomatch_core::report::{FrameGrabber, RgbaFrame};
use lingomatch_core::storage::PreferenceStore;
use lingomatch_core::transport::{SignalConnector, SignalTransport, TransportEvent, TransportEvents};

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Start(MatchingPreferences),
    Stop,
    Leave(String),
    ConnectionRequest(String),
    ConnectionRespond { request_id: String, accept: bool },
    Report {
        reported_user: String,
        conversation: String,
        report_type: ReportType,
        frame: Option<Vec<u8>>,
    },
}

#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<ApiCall>>,
    start_responses: Mutex<VecDeque<StartMatchingResponse>>,
    connection_request_refusal: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn respond_start(&self, response: StartMatchingResponse) {
        self.start_responses.lock().push_back(response);
    }

    pub fn refuse_connection_request(&self, reason: &str) {
        *self.connection_request_refusal.lock() = Some(reason.to_string());
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MatchingApi for FakeApi {
    async fn start_matching(&self, preferences: &MatchingPreferences) -> Result<StartMatchingResponse> {
        self.record(ApiCall::Start(preferences.clone()));
        self.start_responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Http("500 Internal Server Error".to_string()))
    }

    async fn stop_matching(&self) -> Result<()> {
        self.record(ApiCall::Stop);
        Ok(())
    }

    async fn leave_conversation(&self, conversation_id: &str) -> Result<()> {
        self.record(ApiCall::Leave(conversation_id.to_string()));
        Ok(())
    }

    async fn send_connection_request(&self, conversation_id: &str) -> Result<ApiNotice> {
        self.record(ApiCall::ConnectionRequest(conversation_id.to_string()));
        match self.connection_request_refusal.lock().take() {
            Some(reason) => Err(Error::Rejected(reason)),
            None => Ok(ApiNotice {
                message: "Connection request sent".to_string(),
            }),
        }
    }

    async fn respond_connection_request(&self, request_id: &str, accept: bool) -> Result<ApiNotice> {
        self.record(ApiCall::ConnectionRespond {
            request_id: request_id.to_string(),
            accept,
        });
        Ok(ApiNotice::default())
    }

    async fn submit_report(&self, report: lingomatch_core::models::ReportRequest) -> Result<()> {
        self.record(ApiCall::Report {
            reported_user: report.reported_user,
            conversation: report.conversation,
            report_type: report.report_type,
            frame: report.video_frame,
        });
        Ok(())
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct FakeTransport {
    pub url: String,
    sent: Mutex<Vec<SignalMessage>>,
    connected: AtomicBool,
    closed: AtomicBool,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl FakeTransport {
    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<SignalMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_of_kind(&self, kind: &str) -> Vec<SignalMessage> {
        self.sent().into_iter().filter(|m| m.kind() == kind).collect()
    }

    /// A frame from the server.
    pub fn deliver(&self, message: SignalMessage) {
        let _ = self.events.send(TransportEvent::Message(message));
    }

    /// The socket dropped underneath us.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SignalTransport for FakeTransport {
    fn send(&self, message: &SignalMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.sent.lock().push(message.clone());
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeConnector {
    transports: Mutex<Vec<Arc<FakeTransport>>>,
    failures: AtomicU32,
}

impl FakeConnector {
    /// Make the next `n` connects fail.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn transports(&self) -> Vec<Arc<FakeTransport>> {
        self.transports.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.transports.lock().len()
    }

    /// Most recent transport whose URL contains `fragment`.
    pub fn last(&self, fragment: &str) -> Option<Arc<FakeTransport>> {
        self.transports
            .lock()
            .iter()
            .rev()
            .find(|t| t.url.contains(fragment))
            .cloned()
    }

    pub fn chat(&self) -> Arc<FakeTransport> {
        self.last("/ws/anonymous-chat/").expect("no chat socket opened")
    }

    pub fn matching(&self) -> Arc<FakeTransport> {
        self.last("/ws/matching/").expect("no matching socket opened")
    }
}

#[async_trait]
impl SignalConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<(Arc<dyn SignalTransport>, TransportEvents)> {
        let failures = self.failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.failures.store(failures - 1, Ordering::SeqCst);
            return Err(Error::WebSocket("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Open);
        let transport = Arc::new(FakeTransport {
            url: url.to_string(),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            events: tx,
        });
        self.transports.lock().push(transport.clone());
        Ok((transport, rx))
    }
}

// ============================================================================
// Media
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    AddStream(usize),
    CreateOffer { ice_restart: bool },
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
    Close,
}

pub struct FakePeer {
    calls: Mutex<Vec<PeerCall>>,
    sink: PeerEventSink,
    offers: AtomicU32,
    reject_candidates: bool,
}

impl FakePeer {
    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().clone()
    }

    /// Fire a callback as the WebRTC stack would.
    pub fn emit(&self, event: PeerEvent) {
        self.sink.emit(event);
    }

    pub fn is_closed(&self) -> bool {
        self.calls.lock().contains(&PeerCall::Close)
    }
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn add_local_stream(&self, stream: &LocalStream) -> Result<()> {
        self.calls.lock().push(PeerCall::AddStream(stream.tracks().len()));
        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        self.calls.lock().push(PeerCall::CreateOffer { ice_restart });
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("v=0 offer-{}", n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.calls.lock().push(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.calls.lock().push(PeerCall::SetLocal(description.kind));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.calls.lock().push(PeerCall::SetRemote(description.kind));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.calls.lock().push(PeerCall::AddCandidate(candidate.candidate));
        if self.reject_candidates {
            return Err(Error::WebRtc("invalid candidate".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.calls.lock().push(PeerCall::Close);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBackend {
    peers: Mutex<Vec<Arc<FakePeer>>>,
    streams: Mutex<Vec<LocalStream>>,
    acquire_error: Mutex<Option<MediaError>>,
    reject_candidates: AtomicBool,
}

impl FakeBackend {
    pub fn fail_acquire(&self, error: MediaError) {
        *self.acquire_error.lock() = Some(error);
    }

    pub fn reject_candidates(&self) {
        self.reject_candidates.store(true, Ordering::SeqCst);
    }

    pub fn peers(&self) -> Vec<Arc<FakePeer>> {
        self.peers.lock().clone()
    }

    pub fn peer(&self) -> Arc<FakePeer> {
        self.peers.lock().last().cloned().expect("no peer connection created")
    }

    pub fn streams(&self) -> Vec<LocalStream> {
        self.streams.lock().clone()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn get_user_media(&self, _constraints: &MediaConstraints) -> std::result::Result<LocalStream, MediaError> {
        if let Some(e) = self.acquire_error.lock().clone() {
            return Err(e);
        }
        let (video, _) = MediaTrack::new(TrackKind::Video);
        let (audio, _) = MediaTrack::new(TrackKind::Audio);
        let stream = LocalStream::new(vec![video, audio]);
        self.streams.lock().push(stream.clone());
        Ok(stream)
    }

    async fn create_peer(&self, _ice_servers: &[String], events: PeerEventSink) -> Result<Arc<dyn PeerLink>> {
        let peer = Arc::new(FakePeer {
            calls: Mutex::new(Vec::new()),
            sink: events,
            offers: AtomicU32::new(0),
            reject_candidates: self.reject_candidates.load(Ordering::SeqCst),
        });
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Hands out queued frames; an empty queue means the capture fails.
#[derive(Default)]
pub struct FakeFrames {
    frames: Mutex<VecDeque<Option<RgbaFrame>>>,
    attempts: AtomicU32,
}

impl FakeFrames {
    pub fn push(&self, frame: Option<RgbaFrame>) {
        self.frames.lock().push_back(frame);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameGrabber for FakeFrames {
    async fn capture_frame(&self) -> Result<RgbaFrame> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.frames.lock().pop_front() {
            Some(Some(frame)) => Ok(frame),
            Some(None) => Ok(RgbaFrame {
                width: 0,
                height: 0,
                data: Vec::new(),
            }),
            None => Err(Error::InvalidState("video element not ready".to_string())),
        }
    }
}

pub fn solid_frame(width: u32, height: u32) -> RgbaFrame {
    RgbaFrame {
        width,
        height,
        data: vec![128; (width * height * 4) as usize],
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub connector: Arc<FakeConnector>,
    pub backend: Arc<FakeBackend>,
    pub frames: Arc<FakeFrames>,
    pub store: Arc<PreferenceStore>,
    pub config: ClientConfig,
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.server.host = "chat.test".to_string();
    config.server.port = 443;
    config.server.use_tls = true;
    config
}

pub fn controller(mode: ChatMode) -> (MatchingController, Harness) {
    controller_with(test_config(), mode)
}

pub fn controller_with(config: ClientConfig, mode: ChatMode) -> (MatchingController, Harness) {
    let store = Arc::new(PreferenceStore::in_memory().expect("in-memory store"));
    store
        .save_preferences(&MatchingPreferences::new(Gender::Any, "", mode))
        .expect("save preferences");

    let harness = Harness {
        api: Arc::new(FakeApi::default()),
        connector: Arc::new(FakeConnector::default()),
        backend: Arc::new(FakeBackend::default()),
        frames: Arc::new(FakeFrames::default()),
        store,
        config: config.clone(),
    };

    let controller = MatchingController::new(
        config,
        ControllerDeps {
            api: harness.api.clone(),
            connector: harness.connector.clone(),
            media: harness.backend.clone(),
            frames: harness.frames.clone(),
            store: harness.store.clone(),
        },
    );

    (controller, harness)
}

/// Match straight into conversation `conversation_id` and process the chat
/// socket's `open`.
pub async fn matched(controller: &mut MatchingController, harness: &Harness, conversation_id: &str) {
    harness.api.respond_start(StartMatchingResponse::Matched {
        conversation_id: conversation_id.to_string(),
    });
    controller.start_matching().await.expect("start matching");
    controller.process_pending().await;
}

/// Let spawned timer tasks run after time moved.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time by `ms`, then handle whatever fired.
pub async fn advance(controller: &mut MatchingController, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
    controller.process_pending().await;
}

pub fn candidate(text: &str) -> IceCandidate {
    IceCandidate {
        candidate: text.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}
