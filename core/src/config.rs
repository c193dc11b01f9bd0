//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Public STUN servers used for every peer connection. There is no TURN
/// relay, so peers behind symmetric NATs may never connect.
pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
    pub media: MediaConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Django `sessionid` cookie of a logged-in user.
    #[serde(default)]
    pub session_cookie: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Grace window between `ready` announcements while waiting for the
    /// partner's signaling channel.
    pub ready_grace_ms: u64,
    pub ready_retries: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ice_servers: Vec<String>,
    pub max_width: u32,
    pub max_height: u32,
    pub max_frame_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub capture_attempts: u32,
    pub capture_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            matching: MatchingConfig::default(),
            media: MediaConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            use_tls: false,
            session_cookie: None,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ready_grace_ms: 1500,
            ready_retries: 3,
            reconnect_base_ms: 1000,
            reconnect_max_attempts: 5,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            max_width: 1280,
            max_height: 720,
            max_frame_rate: 30,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            capture_attempts: 3,
            capture_interval_ms: 1000,
        }
    }
}

impl ClientConfig {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let config_path = data_dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn http_url(&self) -> String {
        let scheme = if self.server.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.server.host, self.server.port)
    }

    /// WebSocket URL for `path`, which must start with `/`.
    pub fn ws_url(&self, path: &str) -> String {
        let scheme = if self.server.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.server.host, self.server.port, path)
    }
}
