//! Local capture devices and the streams they produce

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::MediaError;
use crate::config::MediaConfig;

/// Bounds requested from the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub max_width: u32,
    pub max_height: u32,
    pub max_frame_rate: u32,
    pub audio: bool,
    pub video: bool,
}

impl From<&MediaConfig> for MediaConstraints {
    fn from(config: &MediaConfig) -> Self {
        Self {
            max_width: config.max_width,
            max_height: config.max_height,
            max_frame_rate: config.max_frame_rate,
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// One encoded frame from a capture device (VP8 for video, Opus for audio).
#[derive(Debug, Clone)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

const FEED_CAPACITY: usize = 64;

/// A local capture track. Disabling it mutes the outgoing media without
/// renegotiating; stopping it is permanent.
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    samples: Mutex<Option<mpsc::Receiver<MediaSample>>>,
}

/// Producer side of a [`MediaTrack`], held by the capture device.
#[derive(Debug, Clone)]
pub struct TrackFeed {
    sender: mpsc::Sender<MediaSample>,
    stopped: Arc<AtomicBool>,
}

impl TrackFeed {
    /// Hand a sample to the track. Returns false once the track is stopped,
    /// at which point the device should release the hardware.
    pub fn push(&self, sample: MediaSample) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        match self.sender.try_send(sample) {
            Ok(()) => true,
            // Slow consumer: drop the frame, keep capturing.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl MediaTrack {
    pub fn new(kind: TrackKind) -> (Arc<Self>, TrackFeed) {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let stopped = Arc::new(AtomicBool::new(false));

        let track = Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: stopped.clone(),
            samples: Mutex::new(Some(rx)),
        });

        (track, TrackFeed { sender: tx, stopped })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Take the sample receiver. Only the first caller gets it.
    pub fn take_samples(&self) -> Option<mpsc::Receiver<MediaSample>> {
        self.samples.lock().take()
    }
}

#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<MediaTrack>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn track(&self, kind: TrackKind) -> Option<&Arc<MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Tracks received from the partner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStream {
    pub stream_id: String,
    pub kinds: Vec<TrackKind>,
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalStream, MediaError>;
}

/// A host without capture hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevices;

#[async_trait]
impl MediaDevices for NoDevices {
    async fn get_user_media(&self, _constraints: &MediaConstraints) -> Result<LocalStream, MediaError> {
        Err(MediaError::DeviceNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_stops_with_track() {
        let (track, feed) = MediaTrack::new(TrackKind::Video);
        let sample = MediaSample {
            data: Bytes::from_static(&[0u8; 4]),
            duration: Duration::from_millis(33),
        };

        assert!(feed.push(sample.clone()));
        track.stop();
        assert!(feed.is_stopped());
        assert!(!feed.push(sample));
    }

    #[test]
    fn test_samples_taken_once() {
        let (track, _feed) = MediaTrack::new(TrackKind::Audio);
        assert!(track.take_samples().is_some());
        assert!(track.take_samples().is_none());
    }

    #[test]
    fn test_stream_lookup_and_stop() {
        let (video, _) = MediaTrack::new(TrackKind::Video);
        let (audio, _) = MediaTrack::new(TrackKind::Audio);
        let stream = LocalStream::new(vec![video, audio]);

        assert_eq!(stream.track(TrackKind::Audio).unwrap().kind(), TrackKind::Audio);
        stream.stop_all();
        assert!(stream.tracks().iter().all(|t| t.is_stopped()));
    }
}
