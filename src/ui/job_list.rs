//! Job list screen rendering
//!
//! Renders the main dashboard view: a header with the credit balance and data
//! freshness, the list of the user's jobs, and a footer with key hints and the
//! state of any in-flight request.

use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{request_status, status_color, status_icon};
use crate::app::App;
use crate::data::Job;

/// Renders the job list view
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Header
            Constraint::Min(3),    // Job list
            Constraint::Length(1), // Help / status line
        ])
        .split(area);

    render_header(frame, app, chunks[0]);
    render_list(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);
}

/// Renders the header with credits and when the list was fetched
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let credits = match app.credits_state().data {
        Some(balance) => match balance.currency {
            Some(currency) => format!("{} {}", balance.balance, currency),
            None => format!("{} credits", balance.balance),
        },
        None => "-- credits".to_string(),
    };

    let mut spans = vec![
        Span::styled(
            "PIXELFLOW",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(credits, Style::default().fg(Color::Yellow)),
    ];

    if let Some(cached_at) = app.jobs_cached_at() {
        spans.push(Span::styled(
            format!("  as of {}", cached_at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let separator = "─".repeat(area.width.saturating_sub(2) as usize);
    let lines = vec![
        Line::from(spans),
        Line::from(Span::styled(separator, Style::default().fg(Color::DarkGray))),
    ];

    frame.render_widget(Paragraph::new(lines), area);
}

/// Renders the job rows, scrolled so the selection stays visible
fn render_list(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.jobs_state();

    let block = Block::default()
        .title(" Jobs ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let placeholder = match state.data {
        Some(ref jobs) if !jobs.is_empty() => {
            let items: Vec<ListItem> = jobs
                .iter()
                .enumerate()
                .map(|(index, job)| ListItem::new(job_line(job, index == app.selected_index)))
                .collect();
            let list = List::new(items)
                .block(block)
                .highlight_symbol("\u{25B8} ") // ▸
                .highlight_style(Style::default().fg(Color::Cyan));
            let mut list_state =
                ListState::default().with_selected(Some(app.selected_index.min(jobs.len() - 1)));
            frame.render_stateful_widget(list, area, &mut list_state);
            return;
        }
        Some(_) => Span::styled("  No jobs yet", Style::default().fg(Color::DarkGray)),
        None if state.loading => {
            Span::styled("  Loading jobs...", Style::default().fg(Color::Cyan))
        }
        None => Span::styled(
            "  No data. Press r to retry",
            Style::default().fg(Color::DarkGray),
        ),
    };

    frame.render_widget(Paragraph::new(Line::from(placeholder)).block(block), area);
}

/// Format: "● completed   portrait        2026-01-05 10:00   4 img"
fn job_line(job: &Job, is_selected: bool) -> Line<'static> {
    let category_style = if is_selected {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let created = job.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");

    Line::from(vec![
        Span::styled(
            format!("{} {:<11}", status_icon(job.status), job.status.label()),
            Style::default().fg(status_color(job.status)),
        ),
        Span::styled(format!("{:<16}", job.category), category_style),
        Span::styled(created.to_string(), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("  {} img", job.images.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

/// Renders the key hints, or the jobs request status while one is active
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Navigate  "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Open  "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(" Refresh  "),
        Span::styled("?", Style::default().fg(Color::Yellow)),
        Span::raw(" Help  "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" Quit"),
    ];

    if let Some(status) = request_status(&app.jobs_state()) {
        spans.push(Span::raw(" │ "));
        spans.push(status);
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}
