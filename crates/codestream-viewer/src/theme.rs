use codestream_core::ConnectionStatus;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const CURSOR_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const ACTIVE_FILE_STYLE: Style = Style::new()
    .fg(Color::Rgb(250, 189, 47))
    .add_modifier(Modifier::BOLD);
pub const FOLDER_STYLE: Style = Style::new().fg(Color::Rgb(131, 165, 152));
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const ERROR_STYLE: Style = Style::new().fg(Color::Rgb(251, 73, 52));

pub const INSERT_STYLE: Style = Style::new()
    .fg(Color::Rgb(184, 187, 38))
    .bg(Color::Rgb(34, 44, 24));
pub const DELETE_STYLE: Style = Style::new()
    .fg(Color::Rgb(251, 73, 52))
    .bg(Color::Rgb(50, 24, 24))
    .add_modifier(Modifier::CROSSED_OUT);
pub const HUNK_STYLE: Style = Style::new().fg(Color::Rgb(131, 165, 152));
pub const ADDED_COUNT_STYLE: Style = Style::new().fg(Color::Rgb(184, 187, 38));
pub const REMOVED_COUNT_STYLE: Style = Style::new().fg(Color::Rgb(251, 73, 52));

pub mod icons {
    pub const FOLDER: &str = "v";
    pub const FILE: &str = "-";
    pub const PINNED: &str = "*";
}

pub fn status_color(status: &ConnectionStatus) -> Color {
    match status {
        ConnectionStatus::Connected => Color::Rgb(184, 187, 38),
        ConnectionStatus::Connecting { .. } | ConnectionStatus::Reconnecting { .. } => {
            Color::Rgb(250, 189, 47)
        }
        ConnectionStatus::GaveUp { .. } => Color::Rgb(251, 73, 52),
        ConnectionStatus::Idle | ConnectionStatus::Stopped => Color::Rgb(146, 131, 116),
    }
}
