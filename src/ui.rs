use anyhow::Result;
use ratatui::{
    Frame, Terminal as RatatuiTerminal,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};
use std::time::{Duration, Instant};

use crate::app::{App, AppStats};
use crate::network::types::ProcessId;
use crate::stats::query::{ProcessRow, SortKey, Totals};

pub type Terminal<B> = RatatuiTerminal<B>;

const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// Set up the terminal for the TUI application
pub fn setup_terminal<B: ratatui::backend::Backend>(backend: B) -> Result<Terminal<B>> {
    let mut terminal = RatatuiTerminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    Ok(terminal)
}

/// Restore the terminal to its original state
pub fn restore_terminal<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>) -> Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// UI state for managing the interface
pub struct UIState {
    pub sort_key: SortKey,
    /// Whether the current order is flipped from the key's natural order
    pub reversed: bool,
    pub table_state: TableState,
    pub status_message: Option<(String, Instant)>,
}

impl UIState {
    pub fn new(sort_key: SortKey) -> Self {
        Self {
            sort_key,
            reversed: false,
            table_state: TableState::default(),
            status_message: None,
        }
    }

    /// Select a sort column; choosing the active one again flips the order
    pub fn select_sort(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.reversed = !self.reversed;
        } else {
            self.sort_key = key;
            self.reversed = false;
        }
    }

    /// Whether rows are currently shown highest first
    pub fn is_descending(&self) -> bool {
        self.sort_key.default_descending() != self.reversed
    }

    /// Apply the current direction to rows already sorted by `sort_key`
    pub fn order(&self, mut rows: Vec<ProcessRow>) -> Vec<ProcessRow> {
        if self.reversed {
            rows.reverse();
        }
        rows
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Drop the status message once it has been shown long enough
    pub fn expire_status(&mut self) {
        if let Some((_, time)) = &self.status_message
            && time.elapsed() >= STATUS_MESSAGE_TTL
        {
            self.status_message = None;
        }
    }

    pub fn move_selection_up(&mut self, row_count: usize) {
        if row_count == 0 {
            return;
        }
        let current = self.table_state.selected().unwrap_or(0);
        self.table_state.select(Some(current.saturating_sub(1)));
    }

    pub fn move_selection_down(&mut self, row_count: usize) {
        if row_count == 0 {
            return;
        }
        let next = self
            .table_state
            .selected()
            .map_or(0, |i| (i + 1).min(row_count - 1));
        self.table_state.select(Some(next));
    }

    /// Keep the selection inside the table when rows disappear
    pub fn ensure_valid_selection(&mut self, row_count: usize) {
        match self.table_state.selected() {
            _ if row_count == 0 => self.table_state.select(None),
            Some(i) if i >= row_count => self.table_state.select(Some(row_count - 1)),
            _ => {}
        }
    }
}

impl Default for UIState {
    fn default() -> Self {
        Self::new(SortKey::default())
    }
}

/// Draw the UI
pub fn draw(
    f: &mut Frame,
    app: &App,
    ui_state: &mut UIState,
    rows: &[ProcessRow],
    stats: &AppStats,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Summary
            Constraint::Min(0),    // Process table
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_summary(f, app, rows, chunks[0]);
    draw_process_table(f, ui_state, rows, chunks[1]);
    draw_status_bar(f, ui_state, stats, chunks[2]);
}

fn draw_summary(f: &mut Frame, app: &App, rows: &[ProcessRow], area: Rect) {
    let totals = Totals::from_rows(rows);
    let interface = app.interface_name().unwrap_or("-");

    let line = Line::from(vec![
        Span::styled("Total: ", Style::default().fg(Color::Yellow)),
        Span::raw(format_rate(totals.rate_total())),
        Span::raw(" | "),
        Span::styled("Up: ", Style::default().fg(Color::Yellow)),
        Span::raw(format!(
            "{} ({})",
            format_rate(totals.rate_up),
            format_bytes(totals.bytes_up)
        )),
        Span::raw(" | "),
        Span::styled("Down: ", Style::default().fg(Color::Yellow)),
        Span::raw(format!(
            "{} ({})",
            format_rate(totals.rate_down),
            format_bytes(totals.bytes_down)
        )),
        Span::raw(" | "),
        Span::styled("Processes: ", Style::default().fg(Color::Yellow)),
        Span::raw(totals.processes.to_string()),
    ]);

    let title = format!(
        " xnettop - {} via {} ",
        interface,
        app.detection_method()
    );
    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                title,
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(paragraph, area);
}

fn draw_process_table(f: &mut Frame, ui_state: &mut UIState, rows: &[ProcessRow], area: Rect) {
    let arrow = if ui_state.is_descending() { "↓" } else { "↑" };
    let header_label = |label: &str, key: Option<SortKey>| -> Cell<'static> {
        let text = match key {
            Some(k) if k == ui_state.sort_key => format!("{} {}", label, arrow),
            _ => label.to_string(),
        };
        Cell::from(text)
    };

    let header = Row::new(vec![
        header_label("Process", Some(SortKey::Name)),
        header_label("PID", None),
        header_label("Download", Some(SortKey::Download)),
        header_label("Upload", Some(SortKey::Upload)),
        header_label("Total", Some(SortKey::Total)),
        header_label("Total Down", None),
        header_label("Total Up", None),
    ])
    .style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
    .bottom_margin(1);

    let table_rows: Vec<Row> = rows
        .iter()
        .map(|row| {
            let style = if row.pid.is_unknown() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(row.name.clone()),
                Cell::from(format_pid(row.pid)),
                Cell::from(format_rate(row.rate_down)),
                Cell::from(format_rate(row.rate_up)),
                Cell::from(format_rate(row.rate_total())),
                Cell::from(format_bytes(row.bytes_down)),
                Cell::from(format_bytes(row.bytes_up)),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Min(20),
        Constraint::Length(8),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
    ];

    let table = Table::new(table_rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Processes "))
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(table, area, &mut ui_state.table_state);
}

fn draw_status_bar(f: &mut Frame, ui_state: &UIState, stats: &AppStats, area: Rect) {
    let (text, style) = match &ui_state.status_message {
        Some((message, _)) => (
            format!(" {}", message),
            Style::default().fg(Color::Black).bg(Color::Green),
        ),
        None => {
            let style = if stats.pipeline.dropped > 0 || stats.refresh.failures > 0 {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default().fg(Color::White).bg(Color::Blue)
            };
            (
                format!(
                    " q:quit  d/u/t/n:sort  c:clear | dropped: {}  unknown: {}  refresh failures: {}  undecodable: {}",
                    stats.pipeline.dropped,
                    stats.pipeline.unattributed,
                    stats.refresh.failures,
                    stats.capture.undecodable
                ),
                style,
            )
        }
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}

fn format_pid(pid: ProcessId) -> String {
    match pid {
        ProcessId::Unknown => "-".to_string(),
        ProcessId::Pid(pid) => pid.to_string(),
    }
}

/// Format rate to human readable form
pub fn format_rate(bytes_per_second: f64) -> String {
    const KB_PER_SEC: f64 = 1024.0;
    const MB_PER_SEC: f64 = KB_PER_SEC * 1024.0;
    const GB_PER_SEC: f64 = MB_PER_SEC * 1024.0;

    if bytes_per_second >= GB_PER_SEC {
        format!("{:.1} GB/s", bytes_per_second / GB_PER_SEC)
    } else if bytes_per_second >= MB_PER_SEC {
        format!("{:.1} MB/s", bytes_per_second / MB_PER_SEC)
    } else if bytes_per_second >= KB_PER_SEC {
        format!("{:.1} KB/s", bytes_per_second / KB_PER_SEC)
    } else {
        format!("{:.0} B/s", bytes_per_second)
    }
}

/// Format bytes to human readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
