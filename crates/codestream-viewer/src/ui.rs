use crate::app::{App, PaneMode};
use crate::theme::{self, icons};
use codestream_core::{parse_hunk_header, DiffSpan, SpanKind, TreeRowKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

const KEY_HINTS: &str = "j/k move  enter pin  esc unpin  d diff  space skip  r reconnect  ? help  q quit";

/// Lines ready to draw plus the line that should stay in view.
#[derive(Debug, Default)]
pub struct RenderedPane {
    pub lines: Vec<Line<'static>>,
    pub focus: usize,
}

pub fn render(f: &mut Frame, app: &App) {
    let area = f.size();
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(outer[1]);

    render_header(f, app, outer[0]);
    render_tree(f, app, body[0]);
    render_code(f, app, body[1]);
    render_footer(f, app, outer[2]);
    if app.show_help {
        render_help(f, body[1]);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let status = app.status();
    let line = Line::from(vec![
        Span::styled(" codestream ", theme::HEADER_STYLE),
        Span::styled(
            format!("[{status}]"),
            Style::default().fg(theme::status_color(&status)),
        ),
        Span::styled(format!("  {}", app.url), theme::MUTED_STYLE),
        Span::styled(
            format!("  files: {}", app.session.store().len()),
            theme::MUTED_STYLE,
        ),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_tree(f: &mut Frame, app: &App, area: Rect) {
    let active = app.session.view().active_path();
    let pinned = app.session.view().selected();
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|row| {
            let indent = "  ".repeat(row.depth);
            match &row.kind {
                TreeRowKind::Folder => ListItem::new(Line::from(Span::styled(
                    format!("{indent}{} {}/", icons::FOLDER, row.label),
                    theme::FOLDER_STYLE,
                ))),
                TreeRowKind::File { filepath } => {
                    let marker = if pinned == Some(filepath.as_str()) {
                        icons::PINNED
                    } else {
                        icons::FILE
                    };
                    let style = if active == Some(filepath.as_str()) {
                        theme::ACTIVE_FILE_STYLE
                    } else {
                        Style::default()
                    };
                    let mut spans = vec![Span::styled(
                        format!("{indent}{marker} {}", row.label),
                        style,
                    )];
                    let counts = app
                        .session
                        .store()
                        .get(filepath)
                        .map(|record| record.diff_counts())
                        .unwrap_or_default();
                    if !counts.is_empty() {
                        spans.push(Span::styled(
                            format!(" +{}", counts.additions),
                            theme::ADDED_COUNT_STYLE,
                        ));
                        spans.push(Span::styled(
                            format!(" -{}", counts.deletions),
                            theme::REMOVED_COUNT_STYLE,
                        ));
                    }
                    ListItem::new(Line::from(spans))
                }
            }
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Files"))
        .highlight_style(theme::CURSOR_STYLE);
    let mut state = ListState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.cursor));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_code(f: &mut Frame, app: &App, area: Rect) {
    let Some(view) = app.session.active_view() else {
        let block = Block::default().borders(Borders::ALL).title("Code");
        let text = vec![
            Line::from(Span::styled("Waiting for changes...", theme::MUTED_STYLE)),
            Line::from(""),
            Line::from(format!("source: {}", app.url)),
        ];
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    };

    let record = view.record;
    let mut title = format!(" {} | {} ", record.filepath, view.language);
    if view.pinned {
        title.push_str("| pinned ");
    }
    let pane = match app.pane_mode {
        PaneMode::Diff => match record.diff.as_deref() {
            Some(diff) => render_diff(diff),
            None => RenderedPane {
                lines: vec![Line::from(Span::styled(
                    "No diff for this file",
                    theme::MUTED_STYLE,
                ))],
                focus: 0,
            },
        },
        PaneMode::Content => match view.reveal {
            Some(state) => {
                if !state.is_complete() {
                    title.push_str(&format!("| {}/{} ", state.cursor(), state.total_units()));
                }
                blocks_to_lines(state.revealed_blocks())
            }
            None => blocks_to_lines(&[DiffSpan::new(SpanKind::Equal, record.current_code.clone())]),
        },
    };

    let block = Block::default().borders(Borders::ALL).title(title);
    let height = block.inner(area).height as usize;
    let offset = scroll_offset(pane.focus, pane.lines.len(), height);
    let paragraph = Paragraph::new(pane.lines)
        .block(block)
        .scroll((offset, 0));
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let line = match app.session.last_error() {
        Some(err) => Line::from(Span::styled(format!(" {err}"), theme::ERROR_STYLE)),
        None => Line::from(Span::styled(format!(" {KEY_HINTS}"), theme::MUTED_STYLE)),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let entry = |key: &'static str, text: &'static str| {
        Line::from(vec![Span::styled(key, Color::Cyan), Span::raw(text)])
    };
    let text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        entry("j / Down", "   Next row"),
        entry("k / Up", "     Previous row"),
        entry("Enter", "      Pin file (again to unpin)"),
        entry("Esc", "        Unpin, follow latest"),
        entry("d", "          Toggle diff / content"),
        entry("Space", "      Finish current reveal"),
        entry("r", "          Reconnect"),
        entry("?", "          Toggle help"),
        entry("q", "          Quit"),
    ];
    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
}

/// Turns revealed blocks into styled lines. Blocks may span several lines and
/// several blocks may share one line.
pub fn blocks_to_lines(blocks: &[DiffSpan]) -> RenderedPane {
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut change_focus = None;
    for block in blocks {
        let style = match block.kind {
            SpanKind::Equal => Style::default(),
            SpanKind::Insert => theme::INSERT_STYLE,
            SpanKind::Delete => theme::DELETE_STYLE,
        };
        let mut parts = block.text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                current.push(Span::styled(part.to_string(), style));
            }
            if parts.peek().is_some() {
                lines.push(Line::from(std::mem::take(&mut current)));
            }
        }
        if block.kind != SpanKind::Equal {
            change_focus = Some(if block.text.ends_with('\n') {
                lines.len().saturating_sub(1)
            } else {
                lines.len()
            });
        }
    }
    lines.push(Line::from(current));
    let focus = change_focus.unwrap_or(lines.len() - 1);
    RenderedPane { lines, focus }
}

/// Colours a unified diff line by line. Hunk bodies are read by the lengths in
/// their `@@` header, so a removed `-- comment` line is not taken for a file
/// header.
pub fn render_diff(diff: &str) -> RenderedPane {
    let (mut old_left, mut new_left) = (0usize, 0usize);
    let mut lines = Vec::new();
    for line in diff.lines() {
        let in_hunk = old_left > 0 || new_left > 0;
        let style = if line.starts_with('\\') {
            theme::MUTED_STYLE
        } else if in_hunk {
            match line.chars().next() {
                Some('+') => {
                    new_left = new_left.saturating_sub(1);
                    theme::ADDED_COUNT_STYLE
                }
                Some('-') => {
                    old_left = old_left.saturating_sub(1);
                    theme::REMOVED_COUNT_STYLE
                }
                _ => {
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                    Style::default()
                }
            }
        } else if line.starts_with("@@") {
            if let Ok((_, old_len, _, new_len)) = parse_hunk_header(line) {
                old_left = old_len;
                new_left = new_len;
            }
            theme::HUNK_STYLE
        } else if line.starts_with("+++") || line.starts_with("---") {
            theme::HEADER_STYLE
        } else if line.starts_with('+') {
            theme::ADDED_COUNT_STYLE
        } else if line.starts_with('-') {
            theme::REMOVED_COUNT_STYLE
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(line.to_string(), style)));
    }
    RenderedPane { lines, focus: 0 }
}

/// Smallest scroll offset that keeps `focus` on screen.
pub fn scroll_offset(focus: usize, total: usize, height: usize) -> u16 {
    if height == 0 || total <= height {
        return 0;
    }
    let offset = (focus + 1).saturating_sub(height).min(total - height);
    u16::try_from(offset).unwrap_or(u16::MAX)
}
