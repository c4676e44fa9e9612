//! UI rendering module for the pixelflow dashboard
//!
//! This module contains all the rendering logic for the terminal user interface,
//! using the ratatui library for TUI components.

pub mod help_overlay;
pub mod job_detail;
pub mod job_list;

pub use help_overlay::render as render_help_overlay;
pub use job_detail::render as render_job_detail;
pub use job_list::render as render_job_list;

use ratatui::{
    style::{Color, Style},
    text::Span,
    Frame,
};

use crate::app::{App, AppState};
use crate::data::JobStatus;
use crate::request::RequestState;

/// Renders the UI based on the current application state
pub fn render(frame: &mut Frame, app: &App) {
    match &app.state {
        AppState::JobList => render_job_list(frame, app),
        AppState::JobDetail(job_id) => render_job_detail(frame, app, job_id),
    }

    if app.show_help {
        render_help_overlay(frame);
    }
}

/// Describes an in-flight or failed request for the footer
///
/// Returns `None` when the request is idle and succeeded.
pub fn request_status<T>(state: &RequestState<T>) -> Option<Span<'static>> {
    if let Some(ref error) = state.error {
        return Some(Span::styled(
            format!("✗ {}", error),
            Style::default().fg(Color::Red),
        ));
    }
    if state.is_retrying() {
        return Some(Span::styled(
            format!("retrying ({})…", state.retry_count),
            Style::default().fg(Color::Yellow),
        ));
    }
    if state.loading {
        return Some(Span::styled("loading…", Style::default().fg(Color::Cyan)));
    }
    None
}

/// Color for a job status
pub fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Pending => Color::Gray,
        JobStatus::Processing => Color::Yellow,
        JobStatus::Completed => Color::Green,
        JobStatus::Failed => Color::Red,
    }
}

/// Status icon shown before a job
pub fn status_icon(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "\u{25CB}",    // ○
        JobStatus::Processing => "\u{25D0}", // ◐
        JobStatus::Completed => "\u{25CF}",  // ●
        JobStatus::Failed => "\u{2717}",     // ✗
    }
}
