use crate::connection::ConnectionEvent;
use codestream_core::{ConnectionStatus, Session, SessionConfig, TreeRow, TreeRowKind};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info};

const NORMAL_CLOSE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneMode {
    /// Revealed content with inline diff blocks.
    Content,
    /// The raw unified diff of the last event.
    Diff,
}

pub struct App {
    pub session: Session,
    pub url: String,
    pub rows: Vec<TreeRow>,
    pub cursor: usize,
    pub pane_mode: PaneMode,
    pub show_help: bool,
}

impl App {
    pub fn new(session_config: SessionConfig, url: String) -> Self {
        Self {
            session: Session::new(session_config),
            url,
            rows: Vec::new(),
            cursor: 0,
            pane_mode: PaneMode::Content,
            show_help: false,
        }
    }

    pub fn apply_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Status(status) => self.session.set_connection_status(status),
            ConnectionEvent::Open => info!(event = "source_open", url = %self.url),
            ConnectionEvent::Message(text) => {
                if let Ok(summary) = self.session.ingest_raw(&text) {
                    if summary.is_new_file {
                        self.refresh_rows();
                    }
                }
            }
            ConnectionEvent::Binary(bytes) => {
                if let Ok(summary) = self.session.ingest_bytes(&bytes) {
                    if summary.is_new_file {
                        self.refresh_rows();
                    }
                }
            }
            ConnectionEvent::Closed { code, reason } => {
                if let Some(code) = code.filter(|code| *code != NORMAL_CLOSE) {
                    self.session
                        .record_transport_error(format!("closed with code {code}: {reason}"));
                }
            }
            ConnectionEvent::Error(err) => self.session.record_transport_error(err),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(AppAction::Quit);
        }
        match key.code {
            KeyCode::Char('q') => return Some(AppAction::Quit),
            KeyCode::Char('?') => self.show_help = !self.show_help,
            KeyCode::Esc => {
                if self.show_help {
                    self.show_help = false;
                } else if self.session.view().is_pinned() {
                    self.session.select(None);
                }
            }
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::Enter => {
                if let Some(path) = self.cursor_filepath().map(str::to_string) {
                    self.session.select(Some(&path));
                }
            }
            KeyCode::Char('d') => {
                self.pane_mode = match self.pane_mode {
                    PaneMode::Content => PaneMode::Diff,
                    PaneMode::Diff => PaneMode::Content,
                };
            }
            KeyCode::Char(' ') => {
                self.session.finish_active_reveal();
            }
            KeyCode::Char('r') => {
                debug!(event = "reconnect_requested", status = %self.session.connection_status());
                return Some(AppAction::Reconnect);
            }
            _ => {}
        }
        None
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session.connection_status()
    }

    pub fn cursor_filepath(&self) -> Option<&str> {
        match &self.rows.get(self.cursor)?.kind {
            TreeRowKind::File { filepath } => Some(filepath.as_str()),
            TreeRowKind::Folder => None,
        }
    }

    fn refresh_rows(&mut self) {
        let selected = self.cursor_filepath().map(str::to_string);
        self.rows = self.session.file_tree().rows();
        if let Some(selected) = selected {
            if let Some(index) = self.rows.iter().position(|row| {
                matches!(&row.kind, TreeRowKind::File { filepath } if *filepath == selected)
            }) {
                self.cursor = index;
            }
        }
        self.cursor = self.cursor.min(self.rows.len().saturating_sub(1));
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let max = self.rows.len() as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, max) as usize;
    }
}
