//! Lingomatch terminal client
//!
//! Anonymous matching and chat from the terminal. Video sessions are
//! negotiated with the partner, but this host has no capture devices, so
//! video chats fall back to text.

mod commands;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lingomatch_core::media::NoDevices;
use lingomatch_core::report::NoFrames;
use lingomatch_core::{
    ChatMode, ClientConfig, Error, Gender, Inbound, MatchingController, MatchingPreferences,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Command;

/// Lingomatch terminal client
#[derive(Parser)]
#[command(name = "lingomatch")]
#[command(about = "Meet a random language partner from the terminal")]
struct Cli {
    /// Server host
    #[arg(long)]
    server: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Use HTTPS / WSS
    #[arg(long, conflicts_with = "no_tls")]
    tls: bool,

    /// Use plain HTTP / WS
    #[arg(long)]
    no_tls: bool,

    /// Django session cookie of a logged-in user
    #[arg(long)]
    session: Option<String>,

    /// Preferred partner gender (any, male, female, other)
    #[arg(long)]
    gender: Option<String>,

    /// Preferred partner country code
    #[arg(long)]
    country: Option<String>,

    /// Chat mode (text, video)
    #[arg(long)]
    mode: Option<String>,

    /// Data directory (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

enum Step {
    Line(Option<String>),
    Inbound(Inbound),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lingomatch=info,lingomatch_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting Lingomatch v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lingomatch")
    });
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {:?}", data_dir);

    let mut config = ClientConfig::load(&data_dir).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Unreadable config, using defaults");
        ClientConfig::default()
    });
    apply_server_overrides(&cli, &mut config);

    let mut controller =
        lingomatch_core::connect(config, &data_dir, Arc::new(NoDevices), Arc::new(NoFrames))?;

    if cli.gender.is_some() || cli.country.is_some() || cli.mode.is_some() {
        let current = controller.preferences().clone();
        let gender = match &cli.gender {
            Some(g) => g.parse::<Gender>()?,
            None => current.preferred_gender,
        };
        let mode = match &cli.mode {
            Some(m) => m.parse::<ChatMode>()?,
            None => current.chat_mode,
        };
        let country = cli.country.as_deref().unwrap_or(&current.preferred_country);
        controller.set_preferences(MatchingPreferences::new(gender, country, mode))?;
    }

    println!("Preferences: {}", render::preferences(controller.preferences()));
    println!("Type /start to find a partner, /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Line(line?),
            inbound = controller.next_inbound() => Step::Inbound(inbound),
        };

        match step {
            Step::Line(None) => break,
            Step::Line(Some(line)) => match commands::parse(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => run_command(&mut controller, command).await,
                Ok(None) => {}
                Err(message) => println!("{}", message),
            },
            Step::Inbound(inbound) => controller.handle(inbound).await,
        }

        for event in controller.poll_events() {
            if let Some(text) = render::describe(&event) {
                println!("{}", text);
            }
        }
    }

    controller.shutdown().await;
    tracing::info!("Bye");
    Ok(())
}

fn apply_server_overrides(cli: &Cli, config: &mut ClientConfig) {
    if let Some(host) = &cli.server {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.tls {
        config.server.use_tls = true;
    }
    if cli.no_tls {
        config.server.use_tls = false;
    }
    if let Some(session) = &cli.session {
        config.server.session_cookie = Some(session.clone());
    }
}

async fn run_command(controller: &mut MatchingController, command: Command) {
    let result = match command {
        Command::Start => controller.start_matching().await,
        Command::Stop => controller.stop_matching().await,
        Command::Leave => controller.leave_chat().await,
        Command::Rematch => controller.rematch().await,
        Command::Follow => controller.send_connection_request().await,
        Command::Accept => controller.respond_to_connection_request(true).await,
        Command::Reject => controller.respond_to_connection_request(false).await,
        Command::Video => {
            if controller.toggle_video().is_none() {
                println!("No active video session.");
            }
            Ok(())
        }
        Command::Audio => {
            if controller.toggle_audio().is_none() {
                println!("No active video session.");
            }
            Ok(())
        }
        Command::Report {
            report_type,
            description,
        } => controller.report(report_type, &description).await.map(|_| ()),
        Command::Prefs => {
            println!("Preferences: {}", render::preferences(controller.preferences()));
            Ok(())
        }
        Command::Help => {
            println!("{}", commands::HELP);
            Ok(())
        }
        Command::Say(text) => controller.send_message(&text),
        Command::Quit => Ok(()),
    };

    // Network failures are already reported through the event queue.
    if let Err(e @ (Error::InvalidState(_) | Error::InvalidInput(_) | Error::NoConversation)) = result {
        println!("{}", e);
    }
}
