use std::sync::Arc;

use anyhow::Result;
use gemini_chat::store::GREETING;
use gemini_chat::{Config, ConversationStore, GeminiClient, GeminiGateway};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

/// Log to a file; the terminal belongs to the UI.
fn init_logging() -> Option<WorkerGuard> {
    let log_dir = Config::get_log_dir().ok()?;
    std::fs::create_dir_all(&log_dir).ok()?;

    let appender = tracing_appender::rolling::daily(&log_dir, "gemini-chat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gemini_chat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging();

    // Missing credential is fatal before the terminal is touched
    let api_key = Config::api_key()?;

    let config = Config::load()
        .unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable config file");
            Config::new()
        })
        .with_env_overrides();

    let client = GeminiClient::new(&api_key)
        .with_base_url(config.base_url())
        .with_http_client(config.http_client()?);
    let gateway = GeminiGateway::new(client).with_models(config.text_model(), config.image_model());
    info!(
        text_model = gateway.text_model(),
        image_model = gateway.image_model(),
        "starting"
    );

    let store = ConversationStore::new(Arc::new(gateway))
        .with_mode(config.mode())
        .with_greeting(GREETING);
    let mut app = App::new(store, config);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }

        app.poll_reply().await;
    }
    Ok(())
}
