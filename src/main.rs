use std::sync::Arc;

use clap::{Parser, Subcommand};
use pairchat::backend::{Backend, HttpBackend};
use pairchat::identity::ParticipantPool;
use pairchat::input::{self, Input};
use pairchat::platform::{ChatPlatform, PlatformEvent, StreamPlatform};
use pairchat::{Alerts, ChatApp, ChatConfig, ChatError, render};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pairchat", about = "Two-party chat client with AI-seeded conversations")]
struct Cli {
    #[arg(long, env = "CHAT_BACKEND_URL")]
    backend_url: Option<String>,

    #[arg(long, env = "STREAM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend is reachable.
    Ping,
    /// Open the interactive chat, optionally logging in right away.
    Chat { user_id: Option<String> },
}

/// Alerts printed inline, where the user is typing.
struct TerminalAlerts;

impl Alerts for TerminalAlerts {
    fn alert(&self, message: &str) {
        println!("!! {message}");
    }
}

#[tokio::main]
async fn main() -> Result<(), ChatError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ChatConfig::from_lookup(|key| match key {
        "CHAT_BACKEND_URL" => cli.backend_url.clone(),
        "STREAM_API_KEY" => cli.api_key.clone(),
        other => std::env::var(other).ok(),
    })?;

    match cli.command {
        Command::Ping => run_ping(&config).await,
        Command::Chat { user_id } => run_chat(config, user_id).await,
    }
}

async fn run_ping(config: &ChatConfig) -> Result<(), ChatError> {
    let backend = HttpBackend::new(&config.backend_url, config.request_timeout)?;
    let message = backend.health().await?;
    println!("{message}");
    Ok(())
}

async fn run_chat(config: ChatConfig, user_id: Option<String>) -> Result<(), ChatError> {
    let backend = Arc::new(HttpBackend::new(&config.backend_url, config.request_timeout)?);
    let platform = Arc::new(StreamPlatform::new(&config)?);
    let app = Arc::new(ChatApp::new(backend, platform.clone(), Arc::new(TerminalAlerts), config.pairing.clone()));
    let pool = config.pairing.pool().clone();

    print_lines(&render::render_phase(&app.phase(), &pool));
    let renderer = tokio::spawn(render_loop(app.clone(), pool.clone()));
    if let Some(user_id) = user_id {
        spawn_login(&app, user_id);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let logged_in = app.phase().identity().is_some();
        match input::parse_line(&line, logged_in) {
            Input::Login(user_id) => spawn_login(&app, user_id),
            Input::StartAiChat => {
                let app = app.clone();
                tokio::spawn(async move {
                    let _ = app.start_ai_chat().await;
                });
            }
            Input::Message(text) => {
                let app = app.clone();
                tokio::spawn(async move {
                    let _ = app.send_message(&text).await;
                });
            }
            Input::WhoAmI => match app.phase().identity() {
                Some(identity) => println!("logged in as {identity}"),
                None => println!("not logged in"),
            },
            Input::Help => println!("{}", input::HELP),
            Input::Quit => break,
            Input::Unknown(command) => println!("unknown command {command}; try /help"),
            Input::Empty => {}
        }
    }

    renderer.abort();
    platform.disconnect_user().await
}

/// Login runs in the background so input keeps flowing; failures are
/// already logged by the app.
fn spawn_login(app: &Arc<ChatApp>, user_id: String) {
    let app = app.clone();
    tokio::spawn(async move {
        let _ = app.login_as(&user_id).await;
    });
}

async fn render_loop(app: Arc<ChatApp>, pool: ParticipantPool) {
    let mut phases = app.watch_phase();
    let mut events = app.subscribe();
    loop {
        tokio::select! {
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = phases.borrow_and_update().clone();
                print_lines(&render::render_phase(&phase, &pool));
            }
            event = events.recv() => match event {
                Ok(PlatformEvent::Disconnected) => tracing::warn!("chat platform connection lost"),
                Ok(event) => {
                    if let Some(message) = app.apply_event(&event) {
                        if let Some(me) = app.phase().identity() {
                            println!("{}", render::render_message(&message, me));
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "renderer fell behind the event stream"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
