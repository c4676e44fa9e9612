//! Job detail screen UI
//!
//! Renders the detailed view for a single job: status, timestamps, credits
//! charged, failure reason, and the list of processed images.

use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use super::{request_status, status_color, status_icon};
use crate::app::App;
use crate::data::Job;

/// Renders the job detail screen
///
/// # Arguments
/// * `frame` - The ratatui frame to render into
/// * `app` - The application state
/// * `job_id` - The ID of the job being displayed
pub fn render(frame: &mut Frame, app: &App, job_id: &str) {
    let area = frame.area();
    let state = app.detail_state();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Details
            Constraint::Length(1), // Help / status line
        ])
        .split(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            format!(" Job {} ", job_id),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ));

    // The detail handle is shared across jobs; only show data for this one
    let lines = match state.data.as_ref().filter(|job| job.id == job_id) {
        Some(job) => build_job_lines(job),
        None if state.loading => vec![Line::from(Span::styled(
            "Loading job...",
            Style::default().fg(Color::Cyan),
        ))],
        None => vec![Line::from(Span::styled(
            "No data. Press r to retry",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, chunks[0]);

    render_footer(frame, chunks[1], request_status(&state));
}

fn build_job_lines(job: &Job) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::Gray);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Status     ", label),
            Span::styled(
                format!("{} {}", status_icon(job.status), job.status.label()),
                Style::default()
                    .fg(status_color(job.status))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Category   ", label),
            Span::raw(job.category.clone()),
        ]),
        Line::from(vec![
            Span::styled("Created    ", label),
            Span::raw(format_time(job.created_at)),
        ]),
    ];

    if let Some(updated_at) = job.updated_at {
        lines.push(Line::from(vec![
            Span::styled("Updated    ", label),
            Span::raw(format_time(updated_at)),
        ]));
    }

    lines.push(Line::from(vec![
        Span::styled("Credits    ", label),
        Span::styled(job.credits_used.to_string(), Style::default().fg(Color::Yellow)),
    ]));

    if let Some(ref error) = job.error {
        lines.push(Line::from(vec![
            Span::styled("Error      ", label),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("Images ({})", job.images.len()),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));

    if job.images.is_empty() {
        lines.push(Line::from(Span::styled(
            "  none yet",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for (index, image) in job.images.iter().enumerate() {
        lines.push(Line::from(vec![
            Span::raw(format!("  {:<24}", image.file_name(index))),
            Span::styled(image.url.clone(), Style::default().fg(Color::DarkGray)),
        ]));
    }

    lines
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn render_footer(frame: &mut Frame, area: Rect, status: Option<Span<'static>>) {
    let mut spans = vec![
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" Back  "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(" Refresh  "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" Quit"),
    ];
    if let Some(status) = status {
        spans.push(Span::raw(" │ "));
        spans.push(status);
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}
