//! Data models for Lingomatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ============================================================================
// Preferences
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Any,
    Male,
    Female,
    Other,
}

impl Default for Gender {
    fn default() -> Self {
        Self::Any
    }
}

impl Gender {
    pub const ALL: [Gender; 4] = [Gender::Any, Gender::Male, Gender::Female, Gender::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Any => "any",
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "any" => Ok(Gender::Any),
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(Error::InvalidInput(format!("unknown gender: {}", other))),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Text,
    Video,
}

impl Default for ChatMode {
    fn default() -> Self {
        Self::Text
    }
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Text => "text",
            ChatMode::Video => "video",
        }
    }
}

impl FromStr for ChatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ChatMode::Text),
            "video" => Ok(ChatMode::Video),
            other => Err(Error::InvalidInput(format!("unknown chat mode: {}", other))),
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user is looking for. Serialized as the start-matching body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingPreferences {
    pub preferred_gender: Gender,
    /// Country code, empty for any country.
    pub preferred_country: String,
    pub chat_mode: ChatMode,
}

impl MatchingPreferences {
    pub fn new(gender: Gender, country: &str, chat_mode: ChatMode) -> Self {
        Self {
            preferred_gender: gender,
            preferred_country: country.trim().to_ascii_uppercase(),
            chat_mode,
        }
    }
}

// ============================================================================
// Matching
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub position: u32,
    pub queue_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartMatchingResponse {
    Matched {
        #[serde(deserialize_with = "crate::protocol::string_or_number")]
        conversation_id: String,
    },
    Queued {
        position: u32,
        queue_size: u32,
    },
}

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub conversation_id: String,
    pub other_user_id: Option<String>,
    pub other_user_username: Option<String>,
}

impl Conversation {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            other_user_id: None,
            other_user_username: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSender {
    Me,
    Partner,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub sender: ChatSender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatLine {
    pub fn new(sender: ChatSender, content: &str) -> Self {
        Self {
            sender,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Inappropriate,
    Harassment,
    Spam,
    Underage,
    Other,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Inappropriate => "inappropriate",
            ReportType::Harassment => "harassment",
            ReportType::Spam => "spam",
            ReportType::Underage => "underage",
            ReportType::Other => "other",
        }
    }
}

impl FromStr for ReportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inappropriate" => Ok(ReportType::Inappropriate),
            "harassment" => Ok(ReportType::Harassment),
            "spam" => Ok(ReportType::Spam),
            "underage" => Ok(ReportType::Underage),
            "other" => Ok(ReportType::Other),
            other => Err(Error::InvalidInput(format!("unknown report type: {}", other))),
        }
    }
}

/// One outgoing report. `video_frame` is a PNG captured from the remote
/// video while the report was being filed.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub reported_user: String,
    pub conversation: String,
    pub report_type: ReportType,
    pub description: String,
    pub video_frame: Option<Vec<u8>>,
}

/// Success message returned by the connection-request endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiNotice {
    #[serde(default)]
    pub message: String,
}
