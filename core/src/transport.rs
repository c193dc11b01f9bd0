//! Signal transport: one WebSocket carrying typed JSON messages.
//!
//! The transport only parses and serializes. Reconnection is decided by the
//! owner, because the matching socket and the chat socket recover
//! differently.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::{Error, Result};
use crate::protocol::SignalMessage;

/// Something that happened on a transport, in delivery order. `Open` is
/// always first.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(SignalMessage),
    Error(String),
    Closed,
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

pub trait SignalTransport: Send + Sync {
    /// Queue `message` for sending. Returns false, after logging, when the
    /// socket is not open; nothing is buffered for later.
    fn send(&self, message: &SignalMessage) -> bool;

    fn is_connected(&self) -> bool;

    fn close(&self);
}

#[async_trait]
pub trait SignalConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(Arc<dyn SignalTransport>, TransportEvents)>;
}

// ============================================================================
// WebSocket implementation
// ============================================================================

enum Outgoing {
    Text(String),
    Close,
}

pub struct WsTransport {
    url: String,
    sender: mpsc::UnboundedSender<Outgoing>,
    connected: Arc<Mutex<bool>>,
}

impl WsTransport {
    pub async fn connect(url: &str, cookie: Option<&str>) -> Result<(Self, TransportEvents)> {
        let mut request = url.into_client_request()?;
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| Error::WebSocket(format!("invalid cookie header: {}", e)))?;
            request.headers_mut().insert("Cookie", value);
        }

        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(Mutex::new(true));

        let _ = events_tx.send(TransportEvent::Open);
        tracing::debug!(url, "WebSocket open");

        // Receive task
        let connected_clone = connected.clone();
        let url_clone = url.to_string();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(message) => {
                            if events_tx.send(TransportEvent::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(url = %url_clone, error = %e, "Dropping malformed frame");
                        }
                    },
                    Ok(WsMessage::Close(frame)) => {
                        tracing::debug!(url = %url_clone, ?frame, "WebSocket closed by peer");
                        break;
                    }
                    Err(e) => {
                        let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    _ => {}
                }
            }
            *connected_clone.lock() = false;
            let _ = events_tx.send(TransportEvent::Closed);
        });

        // Send task
        tokio::spawn(async move {
            while let Some(outgoing) = rx.recv().await {
                match outgoing {
                    Outgoing::Text(text) => {
                        if write.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                url: url.to_string(),
                sender: tx,
                connected,
            },
            events_rx,
        ))
    }
}

impl SignalTransport for WsTransport {
    fn send(&self, message: &SignalMessage) -> bool {
        if !self.is_connected() {
            tracing::error!(url = %self.url, kind = message.kind(), "WebSocket not open, message dropped");
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return false;
            }
        };

        self.sender.send(Outgoing::Text(text)).is_ok()
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn close(&self) {
        *self.connected.lock() = false;
        let _ = self.sender.send(Outgoing::Close);
    }
}

/// Opens [`WsTransport`]s, forwarding the session cookie so the server can
/// authenticate the socket.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    cookie: Option<String>,
}

impl WsConnector {
    pub fn new(session_cookie: Option<&str>) -> Self {
        Self {
            cookie: session_cookie.map(|c| format!("sessionid={}", c)),
        }
    }
}

#[async_trait]
impl SignalConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(Arc<dyn SignalTransport>, TransportEvents)> {
        let (transport, events) = WsTransport::connect(url, self.cookie.as_deref()).await?;
        Ok((Arc::new(transport), events))
    }
}
