//! [`MediaBackend`] on top of webrtc-rs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::device::{LocalStream, MediaConstraints, MediaDevices, MediaTrack, TrackKind};
use super::peer::{ConnectionState, IceState, MediaBackend, PeerEvent, PeerEventSink, PeerLink};
use super::MediaError;
use crate::error::{Error, Result};
use crate::protocol::{IceCandidate, SdpKind, SessionDescription};

pub struct RtcBackend {
    api: API,
    devices: Arc<dyn MediaDevices>,
}

impl RtcBackend {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, devices })
    }
}

#[async_trait]
impl MediaBackend for RtcBackend {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> std::result::Result<LocalStream, MediaError> {
        self.devices.get_user_media(constraints).await
    }

    async fn create_peer(&self, ice_servers: &[String], events: PeerEventSink) -> Result<Arc<dyn PeerLink>> {
        let mut config = RTCConfiguration::default();
        if !ice_servers.is_empty() {
            config.ice_servers = vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }];
        }

        let pc = Arc::new(self.api.new_peer_connection(config).await?);

        let sink = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => sink.emit(PeerEvent::LocalCandidate(candidate_from_init(init))),
                        Err(e) => tracing::warn!(error = %e, "Failed to serialize ICE candidate"),
                    }
                }
            })
        }));

        let sink = events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            tracing::debug!(?state, "ICE connection state");
            if let Some(state) = ice_state(state) {
                sink.emit(PeerEvent::IceState(state));
            }
            Box::pin(async {})
        }));

        let sink = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::info!(?state, "Peer connection state");
            if let Some(state) = connection_state(state) {
                sink.emit(PeerEvent::ConnectionState(state));
            }
            Box::pin(async {})
        }));

        let tasks: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        // The stack runs track handlers one at a time, so the handler must
        // return before the next remote track can be announced.
        let sink = events;
        let track_tasks = Arc::clone(&tasks);
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => TrackKind::Audio,
                _ => TrackKind::Video,
            };
            let stream_id = track.stream_id();

            // Rendering happens elsewhere; keep the receive buffers moving.
            track_arrived(&sink, &track_tasks, kind, stream_id, async move {
                while track.read_rtp().await.is_ok() {}
            });

            Box::pin(async {})
        }));

        Ok(Arc::new(RtcPeer { pc, tasks }))
    }
}

pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    /// Sample pumps, RTCP readers and remote track drains; aborted on close.
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RtcPeer {
    async fn attach_track(&self, stream_id: &str, track: Arc<MediaTrack>) -> Result<()> {
        let capability = match track.kind() {
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
        };

        let local = Arc::new(TrackLocalStaticSample::new(
            capability,
            track.id().to_owned(),
            stream_id.to_owned(),
        ));

        let rtp_sender = self
            .pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        let mut tasks = self.tasks.lock();

        // RTCP has to be read for the interceptors to work.
        tasks.push(tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        }));

        if let Some(mut samples) = track.take_samples() {
            tasks.push(tokio::spawn(async move {
                while let Some(sample) = samples.recv().await {
                    if track.is_stopped() {
                        break;
                    }
                    if !track.is_enabled() {
                        continue;
                    }
                    let sample = Sample {
                        data: sample.data,
                        duration: sample.duration,
                        ..Default::default()
                    };
                    if let Err(e) = local.write_sample(&sample).await {
                        tracing::debug!(error = %e, "Dropped outgoing sample");
                    }
                }
            }));
        }

        Ok(())
    }
}

#[async_trait]
impl PeerLink for RtcPeer {
    async fn add_local_stream(&self, stream: &LocalStream) -> Result<()> {
        for track in stream.tracks() {
            self.attach_track(stream.id(), Arc::clone(track)).await?;
        }
        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self.pc.create_offer(options).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pc.close().await?;
        Ok(())
    }
}

/// Announce a remote track and run its `drain` in the background.
fn track_arrived<F>(
    sink: &PeerEventSink,
    tasks: &Mutex<Vec<JoinHandle<()>>>,
    kind: TrackKind,
    stream_id: String,
    drain: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    sink.emit(PeerEvent::RemoteTrack { kind, stream_id });
    tasks.lock().push(tokio::spawn(drain));
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let desc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpKind::Rollback => {
            return Err(Error::WebRtc("rollback descriptions are not supported".to_string()))
        }
    };
    Ok(desc)
}

fn candidate_from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn ice_state(state: RTCIceConnectionState) -> Option<IceState> {
    Some(match state {
        RTCIceConnectionState::New => IceState::New,
        RTCIceConnectionState::Checking => IceState::Checking,
        RTCIceConnectionState::Connected => IceState::Connected,
        RTCIceConnectionState::Completed => IceState::Completed,
        RTCIceConnectionState::Disconnected => IceState::Disconnected,
        RTCIceConnectionState::Failed => IceState::Failed,
        RTCIceConnectionState::Closed => IceState::Closed,
        _ => return None,
    })
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    Some(match state {
        RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
        _ => return None,
    })
}
