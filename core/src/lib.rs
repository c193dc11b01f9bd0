//! Lingomatch Core Library
//!
//! Client side of anonymous matchmaking: queueing over HTTP and WebSocket,
//! the text chat socket, and a WebRTC video session negotiated over it.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod matching;
pub mod media;
pub mod models;
pub mod protocol;
pub mod report;
pub mod storage;
pub mod transport;

use std::path::Path;
use std::sync::Arc;

pub use api::{HttpApi, MatchingApi};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{EventQueue, UiEvent};
pub use matching::{ControllerDeps, Inbound, MatchingController, MatchingState};
pub use media::{MediaBackend, MediaDevices, MediaError, MediaSession, RtcBackend};
pub use models::*;
pub use protocol::SignalMessage;
pub use report::{FrameGrabber, RgbaFrame};
pub use storage::PreferenceStore;
pub use transport::{SignalConnector, SignalTransport, WsConnector};

/// Wire a controller to the real server, the WebRTC stack and a settings
/// database under `data_dir`.
pub fn connect(
    config: ClientConfig,
    data_dir: &Path,
    devices: Arc<dyn MediaDevices>,
    frames: Arc<dyn FrameGrabber>,
) -> Result<MatchingController> {
    std::fs::create_dir_all(data_dir)?;

    let store = Arc::new(PreferenceStore::new(data_dir)?);
    let api = Arc::new(HttpApi::new(&config)?);
    let connector = Arc::new(WsConnector::new(config.server.session_cookie.as_deref()));
    let media = Arc::new(RtcBackend::new(devices)?);

    tracing::info!(server = %config.http_url(), "Client configured");

    Ok(MatchingController::new(
        config,
        ControllerDeps {
            api,
            connector,
            media,
            frames,
            store,
        },
    ))
}
