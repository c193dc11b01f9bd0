use lingomatch_core::media::ConnectionState;
use lingomatch_core::{ChatSender, MatchingPreferences, UiEvent};

/// One line of output for `event`, or `None` for events with nothing to
/// show.
pub fn describe(event: &UiEvent) -> Option<String> {
    let text = match event {
        UiEvent::Searching => "Looking for a partner...".to_string(),
        UiEvent::QueueUpdated(queue) => {
            format!("In queue: position {} of {}", queue.position, queue.queue_size)
        }
        UiEvent::MatchingStopped => "Stopped looking.".to_string(),
        UiEvent::Matched { conversation_id } => format!("Matched! (conversation {})", conversation_id),

        UiEvent::ChatConnected => "Connected to chat.".to_string(),
        UiEvent::PartnerIdentified { username } => format!("You are talking to {}", username),
        UiEvent::PartnerConnected { message } => or_default(message, "Partner connected."),
        UiEvent::PartnerLeft { message } => format!(
            "{} Type /rematch to find someone new.",
            or_default(message, "Your partner left.")
        ),
        UiEvent::ChatMessage(line) => {
            let who = match line.sender {
                ChatSender::Me => "you",
                ChatSender::Partner => "partner",
                ChatSender::System => "system",
            };
            format!("[{}] {}: {}", line.timestamp.format("%H:%M"), who, line.content)
        }
        UiEvent::ChatLeft => "You left the conversation.".to_string(),
        UiEvent::RematchReady => "Ready for a new partner. Type /start to search.".to_string(),
        UiEvent::ChatConnectionLost => "Lost connection to the chat.".to_string(),

        UiEvent::ConnectionRequestControl { .. } => return None,
        UiEvent::ConnectionRequested { .. } => {
            "Your partner wants to connect. /accept or /reject".to_string()
        }
        UiEvent::ConnectionAccepted => "Your connection request was accepted.".to_string(),
        UiEvent::ConnectionRejected => "Your connection request was declined.".to_string(),
        UiEvent::ConnectionResponded { accepted: true } => "Connection accepted.".to_string(),
        UiEvent::ConnectionResponded { accepted: false } => "Connection declined.".to_string(),

        UiEvent::LocalStreamStarted => "Camera and microphone on.".to_string(),
        UiEvent::LocalVideoToggled { enabled } => format!("Camera {}", on_off(*enabled)),
        UiEvent::LocalAudioToggled { enabled } => format!("Microphone {}", on_off(*enabled)),
        UiEvent::RemoteTrackAdded { kind } => format!("Receiving partner {:?}", kind).to_lowercase(),
        UiEvent::RemoteVideoToggled { enabled } => format!("Partner camera {}", on_off(*enabled)),
        UiEvent::MediaConnection(state) => match state {
            ConnectionState::Connected => "Video connected.".to_string(),
            ConnectionState::Disconnected => "Video interrupted, trying to recover...".to_string(),
            ConnectionState::Failed => "Video connection failed.".to_string(),
            _ => return None,
        },
        UiEvent::MediaStopped => "Video stopped.".to_string(),
        UiEvent::MediaError(e) => e.to_string(),
        UiEvent::MediaFailed => "Video could not be re-established.".to_string(),

        UiEvent::ReportSubmitted { with_evidence } => {
            if *with_evidence {
                "Report sent with a video snapshot. Thank you.".to_string()
            } else {
                "Report sent. Thank you.".to_string()
            }
        }

        UiEvent::Notice(message) => message.clone(),
        UiEvent::Error(message) => format!("Error: {}", message),
    };
    Some(text)
}

pub fn preferences(prefs: &MatchingPreferences) -> String {
    let country = if prefs.preferred_country.is_empty() {
        "any"
    } else {
        prefs.preferred_country.as_str()
    };
    format!(
        "gender: {}, country: {}, mode: {}",
        prefs.preferred_gender.as_str(),
        country,
        prefs.chat_mode.as_str()
    )
}

fn or_default(message: &str, default: &str) -> String {
    if message.is_empty() {
        default.to_string()
    } else {
        message.to_string()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
