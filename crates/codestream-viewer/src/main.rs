mod app;
mod config;
mod connection;
mod logging;
mod theme;
mod ui;

use anyhow::Result;
use app::{App, AppAction};
use clap::Parser;
use codestream_core::ConnectionStatus;
use connection::{ConnectionEvent, ConnectionManager};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, time::Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const CONNECTION_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config(config::Args::parse())?;
    let log_guard = logging::init_logging(&config);
    info!(
        event = "viewer_start",
        url = %config.url,
        log_file = log_guard.has_file(),
        cadence_ms = config.reveal.cadence.as_millis() as u64,
        reveal_unit = %config.reveal.snapshot_unit,
        max_attempts = config.reconnect.max_attempts
    );

    let (conn_tx, mut conn_rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
    let mut manager = ConnectionManager::new(config.url.clone(), config.reconnect, conn_tx);
    let mut app = App::new(config.session_config(), config.url.to_string());
    manager.start().await;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, &mut manager, &mut conn_rx).await;
    manager.stop().await;
    restore_terminal(&mut terminal)?;
    info!(event = "viewer_stop", files = app.session.store().len());
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    manager: &mut ConnectionManager,
    conn_rx: &mut mpsc::Receiver<ConnectionEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        let deadline = app.session.next_reveal_deadline();
        tokio::select! {
            Some(event) = conn_rx.recv() => {
                app.apply_connection_event(event);
                // apply whatever else already arrived before redrawing
                while let Ok(event) = conn_rx.try_recv() {
                    app.apply_connection_event(event);
                }
            }
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) => {
                    match app.handle_key(key) {
                        Some(AppAction::Quit) => break,
                        Some(AppAction::Reconnect) => {
                            info!(
                                event = "manual_reconnect",
                                url = %manager.url(),
                                was_running = manager.is_running()
                            );
                            manager.start().await;
                        }
                        None => {}
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => warn!(event = "terminal_event_error", error = %err),
                None => break,
            },
            _ = sleep_until(deadline) => {
                app.session.reveal_tick();
            }
        }
    }
    app.session.set_connection_status(ConnectionStatus::Stopped);
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
