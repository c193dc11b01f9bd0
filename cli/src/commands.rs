//! Stdin command parsing

use lingomatch_core::ReportType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Leave,
    Rematch,
    Follow,
    Accept,
    Reject,
    Video,
    Audio,
    Report {
        report_type: ReportType,
        description: String,
    },
    Prefs,
    Help,
    Quit,
    /// Anything that is not a command is a chat line.
    Say(String),
}

pub const HELP: &str = "\
/start                     find a partner
/stop                      leave the queue
/leave                     leave the conversation
/rematch                   drop a chat your partner left
/follow                    ask the partner to connect
/accept, /reject           answer a connection request
/video, /audio             toggle camera / microphone
/report <type> <reason>    report the partner (inappropriate, harassment, spam, underage, other)
/prefs                     show matching preferences
/quit                      exit
anything else is sent as a chat message";

/// Parse one input line. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    // "//text" sends "/text" literally.
    if let Some(rest) = line.strip_prefix("//") {
        return Ok(Some(Command::Say(format!("/{}", rest))));
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "leave" => Command::Leave,
        "rematch" | "next" => Command::Rematch,
        "follow" => Command::Follow,
        "accept" => Command::Accept,
        "reject" => Command::Reject,
        "video" => Command::Video,
        "audio" | "mute" => Command::Audio,
        "prefs" => Command::Prefs,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "report" => {
            let (kind, description) = match args.split_once(char::is_whitespace) {
                Some((kind, description)) => (kind, description.trim()),
                None => (args, ""),
            };
            if kind.is_empty() {
                return Err("usage: /report <type> <description>".to_string());
            }
            let report_type = kind.parse::<ReportType>().map_err(|e| e.to_string())?;
            Command::Report {
                report_type,
                description: description.to_string(),
            }
        }
        other => return Err(format!("unknown command /{} (try /help)", other)),
    };

    Ok(Some(command))
}
